//! Iteration pipeline and scheduling loop.
//!
//! One iteration:
//!
//! ```text
//! refresh registry ─▶ load state ─▶ detect ─▶ render ─▶ reload ─▶ save state
//! ```
//!
//! The candidate state replaces the previous one only after every dirty
//! resource has been rendered and reloaded. Hosts of resources whose render
//! or reload could not complete are rolled back to their previous entry so
//! the next iteration picks them up again.

use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::OverseerConfig;
use crate::detector::{self, Detection};
use crate::error::OverseerError;
use crate::metrics::{self, RenderResult, Timer};
use crate::reload::{ReloadOutcome, Reloader};
use crate::render::Renderer;
use crate::resolver::Resolve;
use crate::resource::{Registry, Resource, ResourceId};
use crate::state::{AddressView, ResolutionState};

/// Summary of one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Hosts in the index.
    pub hosts: usize,
    /// Hosts whose lookup failed and were left as they were.
    pub resolve_failures: Vec<String>,
    /// Resources with at least one changed host.
    pub dirty: Vec<ResourceId>,
    /// Resources rendered because their definition is new or was edited.
    pub redefined: Vec<ResourceId>,
    /// Resources whose destination was replaced.
    pub rendered: Vec<ResourceId>,
    /// Resources that could not be rendered.
    pub render_failures: Vec<ResourceId>,
    /// Resources whose reload command failed, timed out, or did not start.
    pub reload_failures: Vec<ResourceId>,
}

impl IterationReport {
    /// Number of hosts and resources that did not go through cleanly.
    pub fn failures(&self) -> usize {
        self.resolve_failures.len() + self.render_failures.len() + self.reload_failures.len()
    }
}

/// What happened to a single dirty resource.
#[derive(Debug)]
enum Pipeline {
    Reloaded(ReloadOutcome),
    RenderFailed(OverseerError),
    ReloadFailed(OverseerError),
}

/// Keeps destination files in line with DNS.
pub struct Overseer {
    config: OverseerConfig,
    registry: Registry,
    /// Definitions added or edited at runtime that still need a render.
    redefined: BTreeSet<ResourceId>,
    resolver: Arc<dyn Resolve>,
    renderer: Renderer,
    reloader: Reloader,
}

impl Overseer {
    /// Validate configuration and load the registry.
    ///
    /// Fails when the configuration is unusable, any resource definition is
    /// malformed, or the state file exists but cannot be parsed.
    pub fn new(config: OverseerConfig, resolver: Arc<dyn Resolve>) -> Result<Self, OverseerError> {
        config.validate()?;
        let registry = Registry::load(&config.resources_dir)?;
        info!(
            dir = %config.resources_dir.display(),
            resources = registry.len(),
            hosts = registry.index().len(),
            "loaded resource registry"
        );
        let state = ResolutionState::load(&config.state_file)?;
        debug!(hosts = state.len(), "state file readable");

        Ok(Self {
            renderer: Renderer::new(&config.templates_dir),
            reloader: Reloader::new(config.reload_timeout()),
            config,
            registry,
            redefined: BTreeSet::new(),
            resolver,
        })
    }

    /// Currently loaded resources.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Re-read the resource directory, keeping the last good registry on error.
    ///
    /// Definitions that are new or differ from the loaded ones are queued
    /// for rendering.
    fn refresh_registry(&mut self) {
        match Registry::load(&self.config.resources_dir) {
            Ok(registry) => {
                if registry == self.registry {
                    return;
                }
                let changed: Vec<ResourceId> = registry
                    .resources()
                    .filter(|resource| self.registry.get(&resource.id) != Some(*resource))
                    .map(|resource| resource.id.clone())
                    .collect();
                info!(
                    resources = registry.len(),
                    hosts = registry.index().len(),
                    changed = changed.len(),
                    "resource definitions changed"
                );
                self.redefined.extend(changed);
                self.redefined.retain(|id| registry.get(id).is_some());
                self.registry = registry;
            }
            Err(e) => {
                warn!(error = %e, "failed to reload resource definitions, keeping previous set");
            }
        }
    }

    /// Run one full pass: detect, render, reload, persist.
    pub async fn run_iteration(&mut self) -> Result<IterationReport, OverseerError> {
        let timer = Timer::start();

        if self.config.refresh_resources {
            self.refresh_registry();
        }

        let previous = ResolutionState::load(&self.config.state_file)?;
        let Detection {
            mut candidate,
            dirty,
            failures,
            ..
        } = detector::detect(self.registry.index(), &previous, self.resolver.as_ref()).await;

        let mut report = IterationReport {
            hosts: self.registry.index().len(),
            resolve_failures: failures.into_iter().map(|f| f.host).collect(),
            dirty: dirty.iter().cloned().collect(),
            redefined: self.redefined.difference(&dirty).cloned().collect(),
            ..Default::default()
        };

        let this = &*self;
        let view = candidate.address_view();
        let pipelines: Vec<_> = dirty
            .union(&this.redefined)
            .filter_map(|id| this.registry.get(id))
            .map(|resource| this.process(resource, &view))
            .collect();

        let results: Vec<(&Resource, Pipeline)> = futures::stream::iter(pipelines)
            .buffered(this.config.concurrency.max(1))
            .collect()
            .await;

        let mut retry = BTreeSet::new();
        for (resource, result) in results {
            let rolled_back = match result {
                Pipeline::Reloaded(outcome) => {
                    report.rendered.push(resource.id.clone());
                    if matches!(outcome, ReloadOutcome::Failed { .. }) {
                        report.reload_failures.push(resource.id.clone());
                    }
                    false
                }
                Pipeline::RenderFailed(e) => {
                    error!(resource = %resource.id, error = %e, "render failed");
                    report.render_failures.push(resource.id.clone());
                    true
                }
                Pipeline::ReloadFailed(e) => {
                    error!(resource = %resource.id, error = %e, "reload failed");
                    report.rendered.push(resource.id.clone());
                    report.reload_failures.push(resource.id.clone());
                    true
                }
            };

            if rolled_back {
                for host in resource.fqdns() {
                    candidate.restore_from(&previous, host);
                }
                retry.insert(resource.id.clone());
            }
        }

        candidate.save(&self.config.state_file)?;
        self.redefined.retain(|id| retry.contains(id));

        metrics::record_state_counts(self.registry.len(), candidate.len());
        metrics::record_iteration(report.dirty.len(), report.failures(), timer.elapsed());
        info!(
            hosts = report.hosts,
            dirty = report.dirty.len(),
            redefined = report.redefined.len(),
            rendered = report.rendered.len(),
            resolve_failures = report.resolve_failures.len(),
            render_failures = report.render_failures.len(),
            reload_failures = report.reload_failures.len(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "iteration complete"
        );

        Ok(report)
    }

    /// Render one resource, then reload it if the render succeeded.
    async fn process<'r>(
        &self,
        resource: &'r Resource,
        view: &AddressView,
    ) -> (&'r Resource, Pipeline) {
        if let Err(e) = self.renderer.render(resource, view) {
            metrics::record_render(RenderResult::Error);
            return (resource, Pipeline::RenderFailed(e));
        }
        metrics::record_render(RenderResult::Success);
        info!(
            resource = %resource.id,
            destination = %resource.destination.display(),
            "rendered resource"
        );

        match self.reloader.reload(resource).await {
            Ok(outcome) => (resource, Pipeline::Reloaded(outcome)),
            Err(e) => (resource, Pipeline::ReloadFailed(e)),
        }
    }

    /// Run iterations until `shutdown` is cancelled.
    ///
    /// The interval is measured from the end of one iteration to the start
    /// of the next. An iteration in progress always completes; cancellation
    /// is observed while waiting.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            resources_dir = %self.config.resources_dir.display(),
            templates_dir = %self.config.templates_dir.display(),
            state_file = %self.config.state_file.display(),
            interval_secs = self.config.interval_secs,
            "starting overseer"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if let Err(e) = self.run_iteration().await {
                error!(error = %e, "iteration failed, retrying next interval");
                metrics::record_iteration_error();
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }

        info!("overseer stopped");
    }
}
