//! Resource definitions and the host index built from them.
//!
//! A resource directory holds one TOML file per resource:
//!
//! ```toml
//! [template]
//! src = "haproxy.cfg.j2"
//! dest = "/etc/haproxy/haproxy.cfg"
//! hosts = ["web", "api"]
//! domain = "svc.example.com"
//! uid = 0
//! gid = 0
//! mode = "0644"
//! reload_cmd = "systemctl reload haproxy"
//! ```
//!
//! Every short host is joined with `domain` once, at load time, and the
//! resulting fully-qualified name is indexed to the resources that use it.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::OverseerError;

/// Extension a file must carry to be read as a resource definition.
pub const DEFINITION_EXTENSION: &str = "toml";

/// Stable identity of a resource: its definition file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    /// Wrap a definition file name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk shape: a single `[template]` table.
#[derive(Debug, Deserialize)]
struct DefinitionFile {
    template: ResourceDefinition,
}

/// Raw fields of a resource definition, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDefinition {
    /// Template name relative to the template root.
    pub src: String,
    /// Absolute destination path.
    pub dest: PathBuf,
    /// Short host names.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Owner to chown the destination to.
    #[serde(default)]
    pub uid: Option<u32>,
    /// Group to chown the destination to.
    #[serde(default)]
    pub gid: Option<u32>,
    /// Octal permission string, e.g. `"0644"`.
    #[serde(default)]
    pub mode: Option<String>,
    /// Shell command run after a successful render.
    #[serde(default)]
    pub reload_cmd: String,
    /// Suffix joined to every short host.
    #[serde(default)]
    pub domain: String,
}

/// A validated unit of generated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Identity used for dirty tracking and logging.
    pub id: ResourceId,
    /// Template name relative to the template root.
    pub source: String,
    /// Absolute destination path.
    pub destination: PathBuf,
    /// Short host names as declared.
    pub hosts: Vec<String>,
    /// Domain suffix as declared.
    pub domain: String,
    /// Owner uid applied to the destination.
    pub owner: Option<u32>,
    /// Group gid applied to the destination.
    pub group: Option<u32>,
    /// Permission bits applied to the destination.
    pub mode: Option<u32>,
    /// Reload command, `None` when the definition leaves it empty.
    pub reload_command: Option<String>,
    fqdns: Vec<String>,
}

impl Resource {
    /// Validate a definition and derive its fully-qualified hosts.
    pub fn from_definition(
        id: ResourceId,
        path: &Path,
        definition: ResourceDefinition,
    ) -> Result<Self, OverseerError> {
        let invalid = |reason: String| OverseerError::InvalidResource {
            path: path.to_path_buf(),
            reason,
        };

        if definition.src.trim().is_empty() {
            return Err(invalid("`src` must not be empty".to_string()));
        }
        if !definition.dest.is_absolute() {
            return Err(invalid(format!(
                "`dest` must be an absolute path, got {}",
                definition.dest.display()
            )));
        }
        if definition.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(invalid("`hosts` contains an empty name".to_string()));
        }

        let mode = definition
            .mode
            .as_deref()
            .map(parse_mode)
            .transpose()
            .map_err(invalid)?;

        let mut fqdns: Vec<String> = Vec::with_capacity(definition.hosts.len());
        for host in &definition.hosts {
            let fqdn = qualify(host, &definition.domain);
            if !fqdns.contains(&fqdn) {
                fqdns.push(fqdn);
            }
        }

        let reload_command = Some(definition.reload_cmd.trim().to_string())
            .filter(|command| !command.is_empty());

        Ok(Self {
            id,
            source: definition.src,
            destination: definition.dest,
            hosts: definition.hosts,
            domain: definition.domain,
            owner: definition.uid,
            group: definition.gid,
            mode,
            reload_command,
            fqdns,
        })
    }

    /// Fully-qualified hosts this resource depends on, in declaration order.
    pub fn fqdns(&self) -> &[String] {
        &self.fqdns
    }
}

/// Join a short host with a domain suffix.
///
/// An empty domain leaves the host as given.
pub fn qualify(host: &str, domain: &str) -> String {
    let domain = domain.trim_matches('.');
    if domain.is_empty() {
        host.to_string()
    } else {
        format!("{}.{}", host, domain)
    }
}

/// Parse an octal permission string such as `"0644"` or `"755"`.
fn parse_mode(raw: &str) -> Result<u32, String> {
    let digits = raw.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| format!("`mode` must be an octal string, got {:?}", raw))?;
    if mode > 0o7777 {
        return Err(format!("`mode` {:?} is out of range", raw));
    }
    Ok(mode)
}

/// Fully-qualified host -> resources depending on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostIndex {
    hosts: BTreeMap<String, BTreeSet<ResourceId>>,
}

impl HostIndex {
    fn insert(&mut self, fqdn: &str, id: &ResourceId) {
        self.hosts
            .entry(fqdn.to_string())
            .or_default()
            .insert(id.clone());
    }

    /// Iterate hosts with their dependent resources, ordered by host.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<ResourceId>)> {
        self.hosts.iter().map(|(h, ids)| (h.as_str(), ids))
    }

    /// Resources depending on `fqdn`.
    pub fn dependents(&self, fqdn: &str) -> Option<&BTreeSet<ResourceId>> {
        self.hosts.get(fqdn)
    }

    /// Check whether `fqdn` is indexed.
    pub fn contains(&self, fqdn: &str) -> bool {
        self.hosts.contains_key(fqdn)
    }

    /// Number of indexed hosts.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// True when no resource declares a host.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Loaded resources plus the host index derived from them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    resources: BTreeMap<ResourceId, Resource>,
    index: HostIndex,
}

impl Registry {
    /// Build a registry from already validated resources.
    pub fn from_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let mut registry = Self::default();
        for resource in resources {
            for fqdn in resource.fqdns() {
                registry.index.insert(fqdn, &resource.id);
            }
            registry.resources.insert(resource.id.clone(), resource);
        }
        registry
    }

    /// Read every `*.toml` file directly inside `dir`.
    ///
    /// Subdirectories and files with other extensions are ignored. Any file
    /// that fails to parse or validate aborts the whole load.
    pub fn load(dir: &Path) -> Result<Self, OverseerError> {
        let dir_err = |source| OverseerError::ResourceDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(dir_err)? {
            let entry = entry.map_err(dir_err)?;
            let path = entry.path();
            let is_definition =
                path.extension().and_then(|e| e.to_str()) == Some(DEFINITION_EXTENSION);
            if !is_definition || path.is_dir() {
                debug!(path = %path.display(), "skipping non-definition entry");
                continue;
            }
            paths.push(path);
        }
        paths.sort();

        let mut resources = Vec::with_capacity(paths.len());
        for path in paths {
            resources.push(load_definition(&path)?);
        }

        let registry = Self::from_resources(resources);
        if registry.resources.is_empty() {
            warn!(dir = %dir.display(), "no resource definitions found");
        }
        debug!(
            dir = %dir.display(),
            resources = registry.resources.len(),
            hosts = registry.index.len(),
            "read resource definitions"
        );
        Ok(registry)
    }

    /// Look up a resource.
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// All resources, ordered by id.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// The host index.
    pub fn index(&self) -> &HostIndex {
        &self.index
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True when no resource is registered.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn load_definition(path: &Path) -> Result<Resource, OverseerError> {
    let raw = fs::read_to_string(path)?;
    let file: DefinitionFile =
        toml::from_str(&raw).map_err(|source| OverseerError::ResourceParse {
            path: path.to_path_buf(),
            source,
        })?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| OverseerError::InvalidResource {
            path: path.to_path_buf(),
            reason: "file name is not valid UTF-8".to_string(),
        })?;

    let resource = Resource::from_definition(ResourceId::new(name), path, file.template)?;
    debug!(
        resource = %resource.id,
        source = %resource.source,
        destination = %resource.destination.display(),
        hosts = ?resource.fqdns(),
        "loaded resource"
    );
    Ok(resource)
}
