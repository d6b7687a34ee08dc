//! dns-overseer binary entry point.

use clap::Parser;
use dns_overseer::{telemetry, Config, HickoryResolver, Overseer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Re-renders configuration templates when DNS answers change.
#[derive(Parser, Debug)]
#[command(name = "dns-overseer")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(short, long, default_value = "/etc/overseer/overseer.toml")]
    config: PathBuf,

    /// Run a single iteration and exit.
    #[arg(long)]
    once: bool,
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn watch_signals(token: CancellationToken) -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = terminate.recv() => info!("received SIGTERM"),
    }
    token.cancel();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()).required(false))
        .add_source(
            config::Environment::with_prefix("OVERSEER")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        resources_dir = %config.overseer.resources_dir.display(),
        templates_dir = %config.overseer.templates_dir.display(),
        state_file = %config.overseer.state_file.display(),
        "Starting dns-overseer"
    );

    let resolver = HickoryResolver::from_system_conf(config.overseer.resolve_timeout())?;
    let mut overseer = Overseer::new(config.overseer, Arc::new(resolver))?;

    if args.once {
        let report = overseer.run_iteration().await?;
        info!(
            dirty = report.dirty.len(),
            rendered = report.rendered.len(),
            failures = report.failures(),
            "single iteration complete"
        );
        if report.failures() > 0 {
            return Err(format!(
                "iteration finished with failures: resolve={:?} render={:?} reload={:?}",
                report.resolve_failures, report.render_failures, report.reload_failures
            )
            .into());
        }
        return Ok(());
    }

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = watch_signals(shutdown).await {
                error!("failed to install signal handlers: {}", e);
            }
        }
    });

    overseer.run(shutdown).await;

    info!("dns-overseer shutdown complete");
    Ok(())
}
