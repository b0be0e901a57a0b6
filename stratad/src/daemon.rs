//! Daemon: runtime orchestrator.
//!
//! The Daemon ties together:
//! - Event store (memory or PostgreSQL)
//! - Ingest service and replay engine (via the API state)
//! - Public and admin HTTP listeners
//! - Prometheus metrics
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Open the store (and migrate it, for PostgreSQL)
//! 3. Bind the public and admin listeners
//! 4. Serve until SIGINT or the shutdown token fires
//! 5. Drain in-flight requests and exit

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use strata_store::{EventStore, MemoryStore};

use crate::api::{create_admin_router, create_public_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::metrics::PrometheusMetrics;

// =============================================================================
// Daemon
// =============================================================================

/// Addresses the listeners actually bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerAddrs {
    /// Public API
    pub public: SocketAddr,
    /// Admin API
    pub admin: SocketAddr,
}

/// The Strata daemon.
pub struct Daemon<S: EventStore + 'static> {
    /// Configuration
    config: Config,
    /// Store
    store: Arc<S>,
    /// Metrics shared by every handler
    metrics: Arc<PrometheusMetrics>,
    /// Stops both listeners
    shutdown: CancellationToken,
}

impl Daemon<MemoryStore> {
    /// Create a daemon over an in-memory store (for testing/development).
    pub fn new_memory(config: Config) -> DaemonResult<Self> {
        Self::new(config, Arc::new(MemoryStore::new()))
    }
}

#[cfg(feature = "postgres")]
impl Daemon<strata_store::PgEventStore> {
    /// Connect to `config.database_url`, apply migrations and build a daemon.
    pub async fn connect_postgres(config: Config) -> DaemonResult<Self> {
        let url = config
            .database_url
            .clone()
            .ok_or_else(|| DaemonError::Config("DATABASE_URL is not set".to_string()))?;

        let store = strata_store::PgEventStore::connect(&url).await?;
        store.migrate().await?;
        info!("PostgreSQL store ready");

        Self::new(config, Arc::new(store))
    }
}

impl<S: EventStore + 'static> Daemon<S> {
    /// Create a daemon over the provided store.
    pub fn new(config: Config, store: Arc<S>) -> DaemonResult<Self> {
        Ok(Self {
            config,
            store,
            metrics: Arc::new(PrometheusMetrics::new()?),
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the listeners when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the daemon.
    ///
    /// Blocks until SIGINT or until the shutdown token is cancelled.
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting Strata daemon"
        );

        let (addrs, servers) = self.spawn_servers().await?;
        info!(public = %addrs.public, admin = %addrs.admin, "API servers started");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
            }
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested");
            }
        }

        self.shutdown.cancel();
        for server in servers {
            if let Err(e) = server.await {
                error!(error = %e, "API server task failed");
            }
        }
        info!("Shutdown complete");
        Ok(())
    }

    /// Bind both listeners and serve them in the background.
    pub async fn start_servers(&self) -> DaemonResult<ServerAddrs> {
        let (addrs, _servers) = self.spawn_servers().await?;
        Ok(addrs)
    }

    /// Bind both listeners; the handles finish once in-flight requests drain
    /// after shutdown.
    async fn spawn_servers(&self) -> DaemonResult<(ServerAddrs, Vec<JoinHandle<()>>)> {
        let state = Arc::new(ApiState::new(
            Arc::clone(&self.store),
            Arc::clone(&self.metrics),
            &self.config.ingest,
        ));

        let (public, public_task) = self
            .serve(create_public_router(Arc::clone(&state)), self.config.api.port, "public")
            .await?;
        let (admin, admin_task) = self
            .serve(create_admin_router(state), self.config.api.admin_port, "admin")
            .await?;

        Ok((ServerAddrs { public, admin }, vec![public_task, admin_task]))
    }

    async fn serve(
        &self,
        router: axum::Router,
        port: u16,
        name: &'static str,
    ) -> DaemonResult<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.api.host, port);

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind {} listener to {}: {}", name, addr, e))
        })?;

        let local_addr = listener.local_addr().map_err(|e| {
            DaemonError::Config(format!("Failed to get local address: {}", e))
        })?;

        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = server.await {
                error!(error = %e, listener = name, "API server error");
            }
        });

        Ok((local_addr, task))
    }
}

// =============================================================================
// Tests
// =============================================================================
