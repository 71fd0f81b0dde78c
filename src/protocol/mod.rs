//! Backend wire protocol.
//!
//! # Data Flow
//! ```text
//! HTTP request (method, path, headers, body)
//!     → envelope.rs (build RequestEnvelope, canonical header block)
//!     → frame.rs (2-byte big-endian length prefix per control field)
//!     → raw body bytes, unframed, until write-close
//!
//! Backend reply:
//!     raw JSON bytes until the worker closes its write half
//! ```
//!
//! # Design Decisions
//! - Control frames are capped at 65535 bytes; oversized fields are rejected
//!   before a single byte reaches the stream
//! - The body bypasses framing so large uploads never need chunking
//! - The protocol is positional: method, path, headers, body

pub mod envelope;
pub mod frame;

pub use envelope::{canonical_header_key, HeaderBlock, RequestEnvelope};
pub use frame::{
    encode_frame, read_frame, read_json, write_frame, write_json, FrameError, LENGTH_PREFIX_LEN,
    MAX_FRAME_LEN,
};
