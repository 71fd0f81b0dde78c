//! QUIC listener for backend workers.
//!
//! # Responsibilities
//! - Bind the QUIC endpoint with the gateway TLS config and transport tuning
//! - Complete handshakes and hand out ready sessions
//! - Stop intake on shutdown while established sessions keep serving
//! - Close the endpoint once in-flight work has drained
//!
//! # Design Decisions
//! - Each handshake runs in its own task; a peer that stalls mid-handshake
//!   delays nobody but itself
//! - Established sessions reach `accept` through a bounded channel

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quinn::{Endpoint, Incoming, ServerConfig, TransportConfig, VarInt};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::quic::QuicSession;
use super::session::Session;
use super::tls::{self, TlsError};
use crate::config::QuicConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The endpoint is closed; no further sessions will arrive.
    #[error("listener closed")]
    Closed,

    /// One inbound connection failed its handshake.
    #[error("handshake with {remote_addr} failed: {source}")]
    Handshake {
        remote_addr: SocketAddr,
        #[source]
        source: quinn::ConnectionError,
    },

    /// The endpoint refused an inbound connection attempt.
    #[error("failed to accept incoming connection: {0}")]
    Incoming(String),
}

/// Error type for binding the listener.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("invalid QUIC bind address {0:?}")]
    Address(String),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("invalid QUIC transport setting: {0}")]
    Transport(String),

    #[error("failed to bind QUIC endpoint: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of backend sessions consumed by the accept loop.
#[async_trait]
pub trait SessionListener: Send + Sync + 'static {
    /// Wait for the next established session.
    async fn accept(&self) -> Result<Arc<dyn Session>, AcceptError>;

    /// Refuse new sessions; pending and future `accept` calls return
    /// `Closed`. Established sessions are left running.
    fn stop_accepting(&self);

    /// Close every session and the listener itself.
    fn close(&self);

    /// Local address the listener is bound to.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// Handshakes allowed to wait for the accept loop.
const ESTABLISHED_BACKLOG: usize = 16;

type AcceptOutcome = Result<Arc<dyn Session>, AcceptError>;

/// Listener backed by a `quinn::Endpoint`.
pub struct QuicListener {
    endpoint: Endpoint,
    established: Mutex<mpsc::Receiver<AcceptOutcome>>,
    stop: CancellationToken,
}

impl QuicListener {
    /// Bind to the configured address with TLS loaded from disk.
    pub fn bind(config: &QuicConfig) -> Result<Self, BindError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| BindError::Address(config.bind_address.clone()))?;

        let crypto = tls::server_crypto(
            Path::new(&config.cert_path),
            Path::new(&config.key_path),
            &config.alpn,
        )?;

        let mut server_config = ServerConfig::with_crypto(crypto);
        server_config.transport_config(Arc::new(transport_config(config)?));

        let endpoint = Endpoint::server(server_config, addr)?;
        tracing::info!(
            address = %endpoint.local_addr()?,
            alpn = %config.alpn,
            "QUIC listener bound"
        );

        let (tx, rx) = mpsc::channel(ESTABLISHED_BACKLOG);
        let stop = CancellationToken::new();
        tokio::spawn(drive_handshakes(endpoint.clone(), tx, stop.clone()));

        Ok(Self {
            endpoint,
            established: Mutex::new(rx),
            stop,
        })
    }

    /// Wait until every connection on the endpoint has been torn down.
    pub async fn wait_idle(&self) {
        self.endpoint.wait_idle().await;
    }
}

/// Hand every incoming connection to its own handshake task.
async fn drive_handshakes(
    endpoint: Endpoint,
    established: mpsc::Sender<AcceptOutcome>,
    stop: CancellationToken,
) {
    loop {
        let incoming = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            incoming = endpoint.accept() => match incoming {
                Some(incoming) => incoming,
                None => break,
            },
        };

        let established = established.clone();
        tokio::spawn(async move {
            // After shutdown nobody receives; the connection is dropped.
            let _ = established.send(handshake(incoming).await).await;
        });
    }
    tracing::debug!("QUIC handshake driver stopped");
}

async fn handshake(incoming: Incoming) -> AcceptOutcome {
    let remote_addr = incoming.remote_address();
    let connecting = incoming
        .accept()
        .map_err(|e| AcceptError::Incoming(e.to_string()))?;
    let connection = connecting
        .await
        .map_err(|source| AcceptError::Handshake { remote_addr, source })?;
    tracing::debug!(remote_addr = %remote_addr, "QUIC handshake complete");
    Ok(Arc::new(QuicSession::new(connection)))
}

fn transport_config(config: &QuicConfig) -> Result<TransportConfig, BindError> {
    let mut transport = TransportConfig::default();
    let idle = Duration::from_secs(config.idle_timeout_secs)
        .try_into()
        .map_err(|_| BindError::Transport("idle timeout too large".to_string()))?;
    transport.max_idle_timeout(Some(idle));
    if config.keep_alive_secs > 0 {
        transport.keep_alive_interval(Some(Duration::from_secs(config.keep_alive_secs)));
    }
    Ok(transport)
}

#[async_trait]
impl SessionListener for QuicListener {
    async fn accept(&self) -> Result<Arc<dyn Session>, AcceptError> {
        let mut established = self.established.lock().await;
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Err(AcceptError::Closed),
            next = established.recv() => next.unwrap_or(Err(AcceptError::Closed)),
        }
    }

    fn stop_accepting(&self) {
        self.stop.cancel();
        self.endpoint.set_server_config(None);
    }

    fn close(&self) {
        self.stop.cancel();
        self.endpoint
            .close(VarInt::from_u32(0), b"gateway shutting down");
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }
}
