//! DNS Overseer - keeps configuration files in line with DNS.
//!
//! Operators describe resources: a template, a destination file, the hosts
//! whose addresses feed it, and an optional reload command. On a fixed
//! interval the daemon resolves every host, compares the answers with what it
//! saw last time, re-renders only the resources whose hosts changed, runs
//! their reload commands, and records the new answers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         dns-overseer                            │
//! │                                                                 │
//! │  ┌──────────────────┐    ┌──────────────────┐                   │
//! │  │ Resource files   │───▶│ Registry         │                   │
//! │  │ (*.toml)         │    │ fqdn → resources │                   │
//! │  └──────────────────┘    └────────┬─────────┘                   │
//! │                                   │                             │
//! │  ┌──────────────────┐    ┌────────▼─────────┐    ┌───────────┐  │
//! │  │ State file       │───▶│ Change detector  │◀───│ Resolver  │  │
//! │  │ (last answers)   │    │ dirty resources  │    │ (hickory) │  │
//! │  └────────▲─────────┘    └────────┬─────────┘    └───────────┘  │
//! │           │                       │                             │
//! │           │              ┌────────▼─────────┐    ┌───────────┐  │
//! │           └──────────────│ Render + reload  │───▶│ dest files│  │
//! │              save        │ (per resource)   │    │ + sh -c   │  │
//! │                          └──────────────────┘    └───────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use dns_overseer::{HickoryResolver, Overseer, OverseerConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = OverseerConfig::default();
//!     let resolver = HickoryResolver::from_system_conf(config.resolve_timeout()).unwrap();
//!
//!     let overseer = Overseer::new(config, Arc::new(resolver)).unwrap();
//!     overseer.run(CancellationToken::new()).await;
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod daemon;
pub mod detector;
pub mod error;
pub mod metrics;
pub mod reload;
pub mod render;
pub mod resolver;
pub mod resource;
pub mod state;
pub mod telemetry;

// Re-export main types
pub use config::{Config, OverseerConfig, TelemetryConfig};
pub use daemon::{IterationReport, Overseer};
pub use error::OverseerError;
pub use resolver::{HickoryResolver, Resolve};
pub use resource::{Registry, Resource, ResourceId};
pub use state::ResolutionState;
