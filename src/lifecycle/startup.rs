//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the QUIC listener and the HTTP listener
//! - Start the metrics exporter when enabled
//! - Start background tasks (signals, accept loop)
//! - Serve HTTP until shutdown, then drain
//!
//! # Design Decisions
//! - Fail fast: a listener that cannot bind is fatal
//! - The QUIC side binds first so a worker can connect before HTTP traffic
//! - Shutdown order: stop HTTP and QUIC intake, let in-flight requests finish
//!   on the live session (bounded by the grace period), then close the
//!   endpoint and wait (bounded) for QUIC connections to drain

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use super::shutdown::Shutdown;
use super::signals::spawn_signal_handler;
use crate::config::GatewayConfig;
use crate::http::HttpServer;
use crate::net::{run_accept_loop, BindError, QuicListener, Registry, SessionListener};
use crate::observability::metrics;

/// Fatal errors while starting or running the gateway.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to start QUIC listener: {0}")]
    Quic(#[from] BindError),

    #[error("failed to bind HTTP listener on {address}: {source}")]
    HttpBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Bind everything from `config` and run until a shutdown signal.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let quic = Arc::new(QuicListener::bind(&config.quic)?);

    let tcp = TcpListener::bind(&config.http.bind_address)
        .await
        .map_err(|source| StartupError::HttpBind {
            address: config.http.bind_address.clone(),
            source,
        })?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    serve(config, quic, tcp, shutdown).await
}

/// Run the gateway on already-bound listeners until `shutdown` fires.
pub async fn serve(
    config: GatewayConfig,
    quic: Arc<QuicListener>,
    tcp: TcpListener,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    let registry = Arc::new(Registry::new());
    let grace = Duration::from_secs(config.timeouts.shutdown_grace_secs);

    let accept = tokio::spawn(run_accept_loop(
        Arc::clone(&quic),
        Arc::clone(&registry),
        shutdown.token(),
    ));

    let server = HttpServer::new(config, registry);
    let served = server.run(tcp, shutdown.token()).await;

    // The HTTP server may have stopped on its own error.
    shutdown.trigger();

    if let Err(e) = accept.await {
        tracing::error!(error = %e, "Accept loop task failed");
    }

    // In-flight requests are done or abandoned; the session can go.
    quic.close();
    if tokio::time::timeout(grace, quic.wait_idle()).await.is_err() {
        tracing::warn!(
            grace_secs = grace.as_secs(),
            "QUIC connections still open after grace period"
        );
    }

    tracing::info!("Shutdown complete");
    served.map_err(StartupError::Serve)
}
