//! Change detection: diff fresh DNS answers against the previous state.

use std::collections::BTreeSet;
use tracing::{debug, error, info};

use crate::error::OverseerError;
use crate::metrics;
use crate::resolver::Resolve;
use crate::resource::{HostIndex, ResourceId};
use crate::state::{AddressSet, ResolutionState};

/// Addresses gained and lost by one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostChange {
    /// Fully-qualified host.
    pub host: String,
    /// Present now, absent before.
    pub added: AddressSet,
    /// Present before, absent now.
    pub removed: AddressSet,
}

/// A host whose lookup failed this iteration.
#[derive(Debug)]
pub struct ResolveFailure {
    /// Fully-qualified host.
    pub host: String,
    /// Why the lookup failed.
    pub error: OverseerError,
}

/// Outcome of one detection pass.
#[derive(Debug, Default)]
pub struct Detection {
    /// State for every indexed host. Hosts that failed to resolve carry
    /// their previous entry, or none if they never resolved.
    pub candidate: ResolutionState,
    /// Resources with at least one changed host, each listed once.
    pub dirty: BTreeSet<ResourceId>,
    /// Per-host diffs that caused `dirty`.
    pub changes: Vec<HostChange>,
    /// Hosts skipped because their lookup failed.
    pub failures: Vec<ResolveFailure>,
}

/// Compare two address sets. Returns `None` when they are equal.
pub fn diff(host: &str, previous: Option<&AddressSet>, current: &AddressSet) -> Option<HostChange> {
    let empty = AddressSet::new();
    let previous = previous.unwrap_or(&empty);

    let added: AddressSet = current.difference(previous).cloned().collect();
    let removed: AddressSet = previous.difference(current).cloned().collect();

    if added.is_empty() && removed.is_empty() {
        None
    } else {
        Some(HostChange {
            host: host.to_string(),
            added,
            removed,
        })
    }
}

/// Resolve every indexed host and work out which resources need rendering.
///
/// Hosts are resolved one after another in index order. A failed lookup
/// only affects its own host: the previous addresses are carried into the
/// candidate so the next iteration retries, and no resource is marked
/// dirty because of it. Hosts that are no longer indexed are dropped.
pub async fn detect(
    index: &HostIndex,
    previous: &ResolutionState,
    resolver: &dyn Resolve,
) -> Detection {
    let mut detection = Detection::default();

    for (host, dependents) in index.iter() {
        let current = match resolver.resolve(host).await {
            Ok(addrs) => addrs,
            Err(e) => {
                error!(host, error = %e, "resolution failed, keeping previous addresses");
                metrics::record_resolve(false);
                detection.candidate.restore_from(previous, host);
                detection.failures.push(ResolveFailure {
                    host: host.to_string(),
                    error: e,
                });
                continue;
            }
        };
        metrics::record_resolve(true);

        if let Some(change) = diff(host, previous.get(host), &current) {
            info!(
                host,
                added = ?change.added,
                removed = ?change.removed,
                resources = dependents.len(),
                "address set changed"
            );
            detection.dirty.extend(dependents.iter().cloned());
            detection.changes.push(change);
        } else {
            debug!(host, addrs = current.len(), "address set unchanged");
        }

        detection.candidate.insert(host, current);
    }

    detection
}
