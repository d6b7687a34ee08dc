//! DNS lookups behind a small trait so the detector can be driven by fixed
//! answers in tests.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;
use tracing::trace;

use crate::error::OverseerError;
use crate::state::AddressSet;

/// Resolve a fully-qualified host to its set of address strings.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Look up both A and AAAA answers for `host`.
    async fn resolve(&self, host: &str) -> Result<AddressSet, OverseerError>;
}

/// Resolver backed by hickory using the system resolver configuration.
pub struct HickoryResolver {
    inner: TokioAsyncResolver,
    timeout: Duration,
}

impl HickoryResolver {
    /// Build from `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf(timeout: Duration) -> Result<Self, OverseerError> {
        let inner = TokioAsyncResolver::tokio_from_system_conf().map_err(|e| {
            OverseerError::Config(format!("cannot read system resolver configuration: {}", e))
        })?;
        Ok(Self { inner, timeout })
    }
}

#[async_trait]
impl Resolve for HickoryResolver {
    async fn resolve(&self, host: &str) -> Result<AddressSet, OverseerError> {
        let lookup = tokio::time::timeout(self.timeout, self.inner.lookup_ip(host))
            .await
            .map_err(|_| OverseerError::ResolveTimeout {
                host: host.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| OverseerError::Resolve {
                host: host.to_string(),
                source,
            })?;

        let addrs: AddressSet = lookup.iter().map(|ip| ip.to_string()).collect();
        trace!(host, addrs = ?addrs, "resolved");
        Ok(addrs)
    }
}
