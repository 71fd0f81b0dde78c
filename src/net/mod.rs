//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Backend worker dials QUIC
//!     → tls.rs (certificate, ALPN "quic-api")
//!     → listener.rs (handshake, QuicListener)
//!     → accept.rs (accept loop)
//!     → registry.rs (install, supersede previous session)
//!
//! Proxy handler
//!     → registry.rs (get_active)
//!     → session.rs / quic.rs (open_bi)
//!     → stream.rs (BackendStream, released on drop)
//! ```
//!
//! # Design Decisions
//! - Session lifecycle belongs to the registry, stream lifecycle to the request
//! - Handlers never close a session, only their own stream
//! - Transport details stay behind the `Session` and `SessionListener` traits

pub mod accept;
pub mod listener;
pub mod quic;
pub mod registry;
pub mod session;
pub mod stream;
pub mod tls;

pub use accept::run_accept_loop;
pub use listener::{AcceptError, BindError, QuicListener, SessionListener};
pub use quic::QuicSession;
pub use registry::Registry;
pub use session::{
    RecvHalf, SendHalf, Session, SessionId, StreamSend, TransportError, STREAM_ABORTED,
};
pub use stream::{BackendStream, ReplyError, StreamGuard, StreamTracker};
