//! QUIC-backed HTTP gateway library.
//!
//! Public HTTP requests are relayed to a single backend worker that dials in
//! over QUIC. Each request travels on its own bidirectional stream as a
//! framed envelope followed by the raw body; the worker's reply is returned
//! to the client verbatim.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod security;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use net::Registry;
