//! Shared test infrastructure for iteration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use dns_overseer::state::AddressSet;
use dns_overseer::{Overseer, OverseerConfig, OverseerError, Resolve, ResolutionState};

// --- Constants ---

pub const DOMAIN: &str = "example.com";

// --- StaticResolver ---

/// Resolver answering from a table that tests can change between iterations.
///
/// Hosts missing from the table fail to resolve.
#[derive(Clone, Default)]
pub struct StaticResolver {
    answers: Arc<Mutex<BTreeMap<String, Vec<String>>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the answer for `host` (in the given, possibly unsorted, order).
    pub fn set(&self, host: &str, addrs: &[&str]) {
        self.answers.lock().unwrap().insert(
            host.to_string(),
            addrs.iter().map(|a| a.to_string()).collect(),
        );
    }

    /// Make `host` fail to resolve.
    pub fn fail(&self, host: &str) {
        self.answers.lock().unwrap().remove(host);
    }
}

#[async_trait]
impl Resolve for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<AddressSet, OverseerError> {
        self.answers
            .lock()
            .unwrap()
            .get(host)
            .map(|addrs| addrs.iter().cloned().collect())
            .ok_or_else(|| OverseerError::ResolveTimeout {
                host: host.to_string(),
                timeout: Duration::from_secs(1),
            })
    }
}

// --- Fixture ---

/// Temporary resources/templates/output/state layout.
pub struct TestEnv {
    dir: TempDir,
    pub config: OverseerConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let root = dir.path();
        let config = OverseerConfig {
            resources_dir: root.join("resources"),
            templates_dir: root.join("templates"),
            state_file: root.join("var/state.toml"),
            interval_secs: 3600,
            reload_timeout_secs: 10,
            ..Default::default()
        };
        fs::create_dir_all(&config.resources_dir).unwrap();
        fs::create_dir_all(&config.templates_dir).unwrap();
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Destination path for an output file name.
    pub fn dest(&self, name: &str) -> PathBuf {
        self.root().join("out").join(name)
    }

    /// Marker/counter file path used by reload commands.
    pub fn marker(&self, name: &str) -> PathBuf {
        self.root().join("markers").join(name)
    }

    pub fn add_template(&self, name: &str, body: &str) {
        fs::write(self.config.templates_dir.join(name), body).unwrap();
    }

    /// Write `<id>.toml` rendering `src` into `out/<dest>`.
    pub fn add_resource(&self, id: &str, src: &str, dest: &str, hosts: &[&str], reload_cmd: &str) {
        let hosts = hosts
            .iter()
            .map(|h| format!("\"{}\"", h))
            .collect::<Vec<_>>()
            .join(", ");
        let body = format!(
            "[template]\nsrc = \"{}\"\ndest = \"{}\"\nhosts = [{}]\ndomain = \"{}\"\nmode = \"0644\"\nreload_cmd = '{}'\n",
            src,
            self.dest(dest).display(),
            hosts,
            DOMAIN,
            reload_cmd,
        );
        fs::write(self.config.resources_dir.join(format!("{}.toml", id)), body).unwrap();
    }

    pub fn remove_resource(&self, id: &str) {
        fs::remove_file(self.config.resources_dir.join(format!("{}.toml", id))).unwrap();
    }

    /// Reload command appending one line to a counter file per run.
    pub fn counting_reload(&self, name: &str) -> String {
        let marker = self.marker(name);
        format!(
            "mkdir -p {} && echo reload >> {}",
            marker.parent().unwrap().display(),
            marker.display()
        )
    }

    /// Number of times a counting reload ran.
    pub fn reload_count(&self, name: &str) -> usize {
        fs::read_to_string(self.marker(name))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    pub fn write_state(&self, entries: &[(&str, &[&str])]) {
        state(entries).save(&self.config.state_file).unwrap();
    }

    pub fn read_state(&self) -> ResolutionState {
        ResolutionState::load(&self.config.state_file).unwrap()
    }

    pub fn read_dest(&self, name: &str) -> String {
        fs::read_to_string(self.dest(name)).unwrap()
    }

    pub fn overseer(&self, resolver: &StaticResolver) -> Overseer {
        Overseer::new(self.config.clone(), Arc::new(resolver.clone()))
            .expect("failed to create overseer")
    }
}

// --- State helpers ---

pub fn state(entries: &[(&str, &[&str])]) -> ResolutionState {
    entries
        .iter()
        .map(|(host, addrs)| {
            (
                host.to_string(),
                addrs.iter().map(|a| a.to_string()).collect::<AddressSet>(),
            )
        })
        .collect()
}

/// Template listing every address of one host, one per line.
pub fn list_template(host: &str) -> String {
    format!(
        "{{% for ip in hosts[\"{}\"] %}}{{{{ ip }}}}\n{{% endfor %}}",
        host
    )
}
