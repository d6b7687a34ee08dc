//! Reload commands run after a resource is rendered.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::OverseerError;
use crate::metrics::{self, ReloadResult};
use crate::resource::Resource;

/// Shell used to interpret reload commands.
const SHELL: &str = "/bin/sh";

/// How a reload went when the command could be started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// No reload command declared; nothing was spawned.
    Skipped,
    /// Command exited zero.
    Succeeded,
    /// Command ran and exited non-zero (or was killed by a signal).
    Failed {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
    },
}

/// Runs reload commands through the shell with a bounded wait.
#[derive(Debug, Clone)]
pub struct Reloader {
    timeout: Duration,
}

impl Reloader {
    /// Create a reloader that kills commands running longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run the resource's reload command, if any, and wait for it.
    ///
    /// Returns an error only when the command cannot be started or exceeds
    /// the timeout; a non-zero exit is reported as [`ReloadOutcome::Failed`].
    pub async fn reload(&self, resource: &Resource) -> Result<ReloadOutcome, OverseerError> {
        let Some(command) = resource.reload_command.as_deref() else {
            return Ok(ReloadOutcome::Skipped);
        };

        debug!(resource = %resource.id, command, "running reload command");

        let child = Command::new(SHELL)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                metrics::record_reload(ReloadResult::LaunchError);
                OverseerError::ReloadLaunch {
                    command: command.to_string(),
                    source,
                }
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| OverseerError::ReloadLaunch {
                command: command.to_string(),
                source,
            })?,
            Err(_) => {
                metrics::record_reload(ReloadResult::Timeout);
                return Err(OverseerError::ReloadTimeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            resource = %resource.id,
            stdout = %stdout.trim_end(),
            stderr = %stderr.trim_end(),
            "reload command output"
        );

        Ok(classify(resource, command, output.status))
    }
}

fn classify(resource: &Resource, command: &str, status: ExitStatus) -> ReloadOutcome {
    if status.success() {
        info!(resource = %resource.id, command, "reload command succeeded");
        metrics::record_reload(ReloadResult::Success);
        ReloadOutcome::Succeeded
    } else {
        warn!(resource = %resource.id, command, %status, "reload command failed");
        metrics::record_reload(ReloadResult::Failed);
        ReloadOutcome::Failed {
            code: status.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceDefinition, ResourceId};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn resource(reload_cmd: &str) -> Resource {
        Resource::from_definition(
            ResourceId::new("r.toml"),
            Path::new("r.toml"),
            ResourceDefinition {
                src: "t.j2".to_string(),
                dest: PathBuf::from("/tmp/r.conf"),
                hosts: vec!["a".to_string()],
                uid: None,
                gid: None,
                mode: None,
                reload_cmd: reload_cmd.to_string(),
                domain: "example.com".to_string(),
            },
        )
        .unwrap()
    }

    fn reloader() -> Reloader {
        Reloader::new(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_empty_command_spawns_nothing() {
        let outcome = reloader().reload(&resource("")).await.unwrap();
        assert_eq!(outcome, ReloadOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_zero_exit_succeeds() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("reloaded");
        let cmd = format!("touch {}", marker.display());

        let outcome = reloader().reload(&resource(&cmd)).await.unwrap();

        assert_eq!(outcome, ReloadOutcome::Succeeded);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_reported_not_raised() {
        let outcome = reloader().reload(&resource("exit 3")).await.unwrap();
        assert_eq!(outcome, ReloadOutcome::Failed { code: Some(3) });
    }

    #[tokio::test]
    async fn test_slow_command_times_out() {
        let reloader = Reloader::new(Duration::from_millis(100));
        let err = reloader.reload(&resource("sleep 5")).await.unwrap_err();
        assert!(matches!(err, OverseerError::ReloadTimeout { .. }));
    }
}
