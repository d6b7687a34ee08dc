//! Error types for dns-overseer.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while synchronizing resources with DNS.
#[derive(Debug, Error)]
pub enum OverseerError {
    /// IO error not tied to a more specific operation.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource directory could not be opened or listed.
    #[error("cannot read resource directory {}: {source}", .path.display())]
    ResourceDir {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A resource definition file is not valid TOML or misses fields.
    #[error("malformed resource definition {}: {source}", .path.display())]
    ResourceParse {
        /// Definition file.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: toml::de::Error,
    },

    /// A resource definition parsed but carries an unusable value.
    #[error("invalid resource definition {}: {reason}", .path.display())]
    InvalidResource {
        /// Definition file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// State file exists but cannot be decoded.
    #[error("unparsable state file {}: {source}", .path.display())]
    StateParse {
        /// State file.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: toml::de::Error,
    },

    /// State could not be encoded.
    #[error("failed to serialize state: {0}")]
    StateSerialize(#[from] toml::ser::Error),

    /// DNS lookup failed.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// Fully-qualified host.
        host: String,
        /// Resolver error.
        #[source]
        source: hickory_resolver::error::ResolveError,
    },

    /// DNS lookup did not answer in time.
    #[error("resolving {host} timed out after {timeout:?}")]
    ResolveTimeout {
        /// Fully-qualified host.
        host: String,
        /// Configured bound.
        timeout: Duration,
    },

    /// Template missing, unparsable, or failing during rendering.
    #[error("template {name} failed: {source}")]
    Template {
        /// Template name relative to the template root.
        name: String,
        /// Engine error.
        #[source]
        source: minijinja::Error,
    },

    /// Destination file could not be created or replaced.
    #[error("cannot write destination {}: {source}", .path.display())]
    Destination {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Reload command could not be started.
    #[error("failed to launch reload command `{command}`: {source}")]
    ReloadLaunch {
        /// Shell command line.
        command: String,
        /// Spawn error.
        #[source]
        source: std::io::Error,
    },

    /// Reload command did not exit in time and was killed.
    #[error("reload command `{command}` timed out after {timeout:?}")]
    ReloadTimeout {
        /// Shell command line.
        command: String,
        /// Configured bound.
        timeout: Duration,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}
