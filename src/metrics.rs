//! Metrics instrumentation for dns-overseer.
//!
//! All metrics are prefixed with `overseer.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a single host lookup.
pub fn record_resolve(success: bool) {
    let result = if success { "success" } else { "error" };
    counter!("overseer.resolve.count", "result" => result).increment(1);
}

/// Render result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum RenderResult {
    /// Destination replaced.
    Success,
    /// Template or destination failure.
    Error,
}

/// Record a resource render.
pub fn record_render(result: RenderResult) {
    let result_str = match result {
        RenderResult::Success => "success",
        RenderResult::Error => "error",
    };
    counter!("overseer.render.count", "result" => result_str).increment(1);
}

/// Reload result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum ReloadResult {
    /// Command exited zero.
    Success,
    /// Command exited non-zero.
    Failed,
    /// Command could not be started.
    LaunchError,
    /// Command was killed after the timeout.
    Timeout,
}

/// Record a reload command run.
pub fn record_reload(result: ReloadResult) {
    let result_str = match result {
        ReloadResult::Success => "success",
        ReloadResult::Failed => "failed",
        ReloadResult::LaunchError => "launch_error",
        ReloadResult::Timeout => "timeout",
    };
    counter!("overseer.reload.count", "result" => result_str).increment(1);
}

/// Record a completed iteration.
pub fn record_iteration(dirty: usize, failures: usize, duration: std::time::Duration) {
    counter!("overseer.iteration.count").increment(1);
    histogram!("overseer.iteration.duration.seconds").record(duration.as_secs_f64());
    histogram!("overseer.iteration.dirty_resources").record(dirty as f64);
    if failures > 0 {
        counter!("overseer.iteration.failures.count").increment(failures as u64);
    }
}

/// Record an iteration that could not run to completion.
pub fn record_iteration_error() {
    counter!("overseer.iteration.error.count").increment(1);
}

/// Record registry and state sizes.
pub fn record_state_counts(resources: usize, hosts: usize) {
    gauge!("overseer.registry.resources.count").set(resources as f64);
    gauge!("overseer.state.hosts.count").set(hosts as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
