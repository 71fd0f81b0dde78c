//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, routes)
//!     → request.rs (request ID)
//!     → proxy.rs (envelope, backend stream, reply)
//!     → response.rs (error mapping)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use proxy::proxy_handler;
pub use request::X_REQUEST_ID;
pub use response::ProxyError;
pub use server::{AppState, HttpServer};
