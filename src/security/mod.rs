//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits (body size, tower-http layer in http::server)
//!     → rate_limit.rs (admission gate per client IP)
//!     → Pass to proxy handler
//! Outgoing response:
//!     → headers.rs (security headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a denied request never reaches the backend
//! - The admission policy is a trait so other gates can be plugged in

pub mod headers;
pub mod rate_limit;

pub use rate_limit::{AdmissionGate, TokenBucketLimiter};
