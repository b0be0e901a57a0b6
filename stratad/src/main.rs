//! Strata Daemon
//!
//! Append-only event store with HTTP ingest, stream reads and admin replay.
//!
//! # Usage
//!
//! ```bash
//! # In-memory store with default ports
//! cargo run -p stratad
//!
//! # PostgreSQL store, JSON logs
//! DATABASE_URL=postgres://localhost/strata STRATA_LOG_FORMAT=json \
//!     cargo run -p stratad --features postgres
//! ```
//!
//! # Environment Variables
//!
//! - `STRATA_ENV`: Environment (test, development, production)
//! - `STRATA_API_HOST`: Listener host (default: 0.0.0.0)
//! - `STRATA_API_PORT`: Public API port (default: 8080)
//! - `STRATA_ADMIN_PORT`: Admin API port (default: 9090)
//! - `STRATA_LOG_FORMAT`: pretty or json (default: pretty)
//! - `STRATA_MAX_BATCH_SIZE`: Largest batch ingest (default: 25)
//! - `STRATA_REPLAY_PAGE_SIZE`: Replay page size (default: 100)
//! - `DATABASE_URL`: PostgreSQL connection string (requires `--features postgres`)

use stratad::{Config, Daemon, LogFormat};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::from_default_env()
        .add_directive("stratad=info".parse()?)
        .add_directive("strata_eventlog=info".parse()?)
        .add_directive("strata_store=info".parse()?);
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        admin_port = config.api.admin_port,
        "Strata Daemon"
    );

    #[cfg(feature = "postgres")]
    if config.database_url.is_some() {
        let daemon = Daemon::connect_postgres(config).await?;
        daemon.run().await?;
        return Ok(());
    }

    #[cfg(not(feature = "postgres"))]
    if config.database_url.is_some() {
        warn!("DATABASE_URL is set but stratad was built without the postgres feature");
    }

    warn!("Using the in-memory store; events are lost on exit");
    let daemon = Daemon::new_memory(config)?;
    daemon.run().await?;

    Ok(())
}
