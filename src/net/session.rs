//! Backend session abstraction.
//!
//! # Responsibilities
//! - Give every accepted backend connection a unique id for tracing
//! - Describe what the gateway needs from a multiplexed transport: liveness,
//!   opening bidirectional streams, closing with a reason
//!
//! # Design Decisions
//! - A trait seam so the registry and proxy handler run against in-memory
//!   sessions in tests and QUIC in production
//! - Stream halves are boxed tokio I/O objects; the proxy never needs to
//!   know which transport produced them
//! - Ending a request cleanly and abandoning it are distinct operations on
//!   the write half

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Relaxed ordering is enough: ids only need to be unique.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a backend session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Application error code sent when a request is abandoned mid-stream.
pub const STREAM_ABORTED: u32 = 1;

/// Write side of a backend stream.
///
/// Shutting it down signals a complete request; `abort` tells the peer the
/// request was abandoned and must not be acted on.
pub trait StreamSend: AsyncWrite + Send + Unpin {
    /// Reset the stream with `code`. Data not yet delivered may be discarded.
    fn abort(&mut self, code: u32);
}

/// Write half of a backend stream.
pub type SendHalf = Box<dyn StreamSend>;

/// Read half of a backend stream.
pub type RecvHalf = Box<dyn AsyncRead + Send + Unpin>;

/// Errors raised by a session when it cannot provide a stream.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The QUIC connection failed or was closed.
    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    /// The session was already closed locally.
    #[error("session is closed")]
    Closed,
}

/// An established, multiplexed connection to one backend worker.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Identity assigned when the session was accepted.
    fn id(&self) -> SessionId;

    /// Address of the backend worker.
    fn remote_addr(&self) -> SocketAddr;

    /// False once the transport has been closed by either side.
    fn is_alive(&self) -> bool;

    /// Open a new bidirectional stream.
    async fn open_bi(&self) -> Result<(SendHalf, RecvHalf), TransportError>;

    /// Close the whole session with an application error code and reason.
    fn close(&self, code: u32, reason: &str);

    /// Resolves once the session is closed.
    async fn closed(&self);
}
