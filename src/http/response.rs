//! Proxy errors and their HTTP mapping.
//!
//! # Responsibilities
//! - Classify every failure of a proxied exchange
//! - Map it to 503 (no backend), 400 (unreadable client body), 413 (body over
//!   the size limit) or 502
//! - Keep internal error text out of client responses
//!
//! # Design Decisions
//! - Every response on the proxy route is JSON, errors included
//! - The full error is logged by the handler; clients get a short message

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use http_body_util::LengthLimitError;
use serde_json::json;
use thiserror::Error;

use crate::net::{ReplyError, TransportError};
use crate::protocol::FrameError;

/// Failure of one proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No live backend session is registered.
    #[error("no backend connected")]
    NoBackend,

    /// Opening a stream on the session failed.
    #[error("failed to open backend stream: {0}")]
    StreamOpen(#[source] TransportError),

    /// The exchange did not complete within the stream deadline.
    #[error("backend exchange timed out after {0:?}")]
    Timeout(Duration),

    /// Method, path or header frame could not be encoded or written.
    #[error("failed to send request envelope: {0}")]
    Envelope(#[source] FrameError),

    /// Reading the client body failed.
    #[error("failed to read request body: {0}")]
    RequestBody(#[source] axum::Error),

    /// The client body grew past the configured limit while streaming.
    #[error("request body exceeds the configured limit")]
    BodyTooLarge,

    /// Writing the body to the backend stream failed.
    #[error("failed to forward request body: {0}")]
    BodyForward(#[source] std::io::Error),

    /// Draining the backend reply failed.
    #[error("failed to read backend reply: {0}")]
    Reply(#[source] ReplyError),
}

impl ProxyError {
    /// Classify a failure reading the client body.
    pub fn from_body_error(err: axum::Error) -> Self {
        if is_length_limit(&err) {
            ProxyError::BodyTooLarge
        } else {
            ProxyError::RequestBody(err)
        }
    }

    /// Status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoBackend => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::RequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short message safe to show the client.
    pub fn public_message(&self) -> &'static str {
        match self {
            ProxyError::NoBackend => "no backend connected",
            ProxyError::RequestBody(_) => "invalid request body",
            ProxyError::BodyTooLarge => "request body too large",
            ProxyError::Timeout(_) => "backend timed out",
            _ => "bad gateway",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        error_response(self.status(), self.public_message())
    }
}

fn is_length_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// JSON error body with the given status.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ProxyError::NoBackend.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ProxyError::StreamOpen(TransportError::Closed).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::Timeout(Duration::from_secs(5)).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::Envelope(FrameError::PayloadTooLarge { len: 70_000 }).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::Reply(ReplyError::TooLarge { limit: 1 }).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn length_limit_is_payload_too_large() {
        use bytes::Bytes;
        use http_body_util::{BodyExt, Full, Limited};

        let err = Limited::new(Full::new(Bytes::from_static(b"abcdef")), 2)
            .collect()
            .await
            .unwrap_err();
        let classified = ProxyError::from_body_error(axum::Error::new(err));
        assert!(matches!(classified, ProxyError::BodyTooLarge));
        assert_eq!(classified.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let other = ProxyError::from_body_error(axum::Error::new(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "client went away",
        )));
        assert_eq!(other.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn response_hides_internal_detail() {
        let err = ProxyError::BodyForward(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "stream reset by peer 0x1234",
        ));
        assert!(err.to_string().contains("0x1234"));
        assert_eq!(err.public_message(), "bad gateway");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers()["content-type"],
            "application/json"
        );
    }
}
