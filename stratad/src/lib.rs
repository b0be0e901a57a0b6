//! Strata Daemon Library
//!
//! HTTP front end for the Strata event store.
//!
//! # Architecture
//!
//! ```text
//! Producers → Public API → Ingest Service ─┐
//!                                          ├→ EventStore (memory | postgres)
//! Operators → Admin API  → Replay Engine ──┘
//!                  ↑
//!          Prometheus metrics
//! ```
//!
//! # Components
//!
//! - **Daemon**: binds both listeners and handles shutdown
//! - **API**: public (`/api/v1`) and admin (`/admin`) routers
//! - **Metrics**: Prometheus registry fed by the event log hooks
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use stratad::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_memory(config).expect("Failed to build daemon");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod metrics;

// Re-exports for convenience
pub use api::{create_admin_router, create_public_router, ApiState};
pub use config::{ApiConfig, Config, Environment, IngestConfig, LogFormat, MAX_BATCH_SIZE};
pub use daemon::{Daemon, ServerAddrs};
pub use error::{DaemonError, DaemonResult};
pub use metrics::PrometheusMetrics;
