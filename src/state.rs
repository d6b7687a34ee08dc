//! Resolution state persisted between iterations.
//!
//! The state file is a TOML document mapping each fully-qualified host to the
//! addresses it resolved to on the last completed iteration:
//!
//! ```toml
//! "a.example.com" = ["10.0.0.1", "10.0.0.2"]
//! "b.example.com" = ["2001:db8::1"]
//! ```
//!
//! The older table form (`"a.example.com" = { "10.0.0.1" = true }`) is still
//! accepted on load and rewritten in list form on the next save.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::OverseerError;

/// Set of address strings; ordered and free of duplicates by construction.
pub type AddressSet = BTreeSet<String>;

/// Host -> sorted address list, as exposed to templates.
pub type AddressView = BTreeMap<String, Vec<String>>;

/// Host -> addresses observed on an iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResolutionState {
    hosts: BTreeMap<String, AddressSet>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredAddresses {
    List(AddressSet),
    Table(BTreeMap<String, bool>),
}

impl From<StoredAddresses> for AddressSet {
    fn from(stored: StoredAddresses) -> Self {
        match stored {
            StoredAddresses::List(set) => set,
            StoredAddresses::Table(table) => table
                .into_iter()
                .filter_map(|(addr, present)| present.then_some(addr))
                .collect(),
        }
    }
}

impl ResolutionState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load state from `path`.
    ///
    /// A missing file yields an empty state; any other failure is an error.
    pub fn load(path: &Path) -> Result<Self, OverseerError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let stored: BTreeMap<String, StoredAddresses> =
            toml::from_str(&raw).map_err(|source| OverseerError::StateParse {
                path: path.to_path_buf(),
                source,
            })?;

        let state = Self {
            hosts: stored
                .into_iter()
                .map(|(host, addrs)| (host, addrs.into()))
                .collect(),
        };
        debug!(path = %path.display(), hosts = state.len(), "loaded state");
        Ok(state)
    }

    /// Persist state to `path`, replacing the previous file atomically.
    ///
    /// Parent directories are created when missing. The new content is written
    /// to a temporary file next to `path` and renamed over it, so a failure
    /// at any point leaves the previous file intact.
    pub fn save(&self, path: &Path) -> Result<(), OverseerError> {
        let encoded = toml::to_string(self)?;
        write_atomic(path, encoded.as_bytes(), |_| Ok(()))?;
        debug!(path = %path.display(), hosts = self.len(), "saved state");
        Ok(())
    }

    /// Addresses recorded for `host`.
    pub fn get(&self, host: &str) -> Option<&AddressSet> {
        self.hosts.get(host)
    }

    /// Record the addresses of `host`, replacing any previous entry.
    pub fn insert(&mut self, host: impl Into<String>, addrs: AddressSet) {
        self.hosts.insert(host.into(), addrs);
    }

    /// Drop the entry for `host`.
    pub fn remove(&mut self, host: &str) -> Option<AddressSet> {
        self.hosts.remove(host)
    }

    /// Make the entry for `host` match `other`'s: copied if present there,
    /// removed otherwise.
    pub fn restore_from(&mut self, other: &ResolutionState, host: &str) {
        match other.get(host) {
            Some(addrs) => self.insert(host, addrs.clone()),
            None => {
                self.remove(host);
            }
        }
    }

    /// Iterate hosts and their addresses, ordered by host.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AddressSet)> {
        self.hosts.iter().map(|(h, a)| (h.as_str(), a))
    }

    /// Number of hosts.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// True when no host is recorded.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Every host with its addresses as a sorted list.
    pub fn address_view(&self) -> AddressView {
        self.hosts
            .iter()
            .map(|(host, addrs)| (host.clone(), addrs.iter().cloned().collect()))
            .collect()
    }
}

impl FromIterator<(String, AddressSet)> for ResolutionState {
    fn from_iter<I: IntoIterator<Item = (String, AddressSet)>>(iter: I) -> Self {
        Self {
            hosts: iter.into_iter().collect(),
        }
    }
}

/// Write `contents` to a temp file beside `path`, let `prepare` adjust it,
/// then rename it over `path`.
pub(crate) fn write_atomic<F>(path: &Path, contents: &[u8], prepare: F) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    prepare(tmp.path())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
