//! The proxy handler: one HTTP request, one backend stream.
//!
//! # Data Flow
//! ```text
//! Request
//!     → registry (active session, else 503)
//!     → envelope encode (method, path, headers)
//!     → open_bi on the session
//!     → write envelope, stream body, close write half
//!     → read reply until EOF
//!     → 200 application/json with the reply verbatim
//! ```
//!
//! # Design Decisions
//! - The whole exchange runs under the stream deadline
//! - The envelope is encoded before the stream is opened, so an oversized
//!   path or header block costs no stream
//! - The body is forwarded chunk by chunk, never buffered whole
//! - Stream release is tied to `BackendStream` drop, so every exit path
//!   (error, timeout, client gone) gives the stream back
//! - Only a fully forwarded body ends in a clean write-close; any earlier
//!   exit aborts the stream so the worker discards the partial request

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::http::request::request_id_of;
use crate::http::response::ProxyError;
use crate::http::server::AppState;
use crate::net::{BackendStream, Session};
use crate::observability::metrics;
use crate::protocol::{FrameError, RequestEnvelope};

/// Forward the request over a fresh stream on the active backend session.
pub async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let request_id = request_id_of(request.headers());
    let (parts, body) = request.into_parts();
    let envelope = RequestEnvelope::from_parts(&parts);

    tracing::debug!(
        request_id = %request_id,
        client = %client_addr,
        method = %envelope.method,
        path = %envelope.path,
        "Proxying request"
    );

    let response = match state.registry.get_active() {
        None => {
            tracing::warn!(
                request_id = %request_id,
                client = %client_addr,
                method = %envelope.method,
                path = %envelope.path,
                "No backend connected"
            );
            ProxyError::NoBackend.into_response()
        }
        Some(session) => {
            let deadline = state.stream_timeout;
            let outcome =
                tokio::time::timeout(deadline, relay(&state, session.as_ref(), &envelope, body))
                    .await
                    .unwrap_or(Err(ProxyError::Timeout(deadline)));

            match outcome {
                Ok(reply) => {
                    tracing::debug!(
                        request_id = %request_id,
                        session_id = %session.id(),
                        reply_bytes = reply.len(),
                        "Backend replied"
                    );
                    (
                        StatusCode::OK,
                        [(header::CONTENT_TYPE, "application/json")],
                        reply,
                    )
                        .into_response()
                }
                Err(e) => {
                    tracing::error!(
                        request_id = %request_id,
                        client = %client_addr,
                        backend = %session.remote_addr(),
                        session_id = %session.id(),
                        method = %envelope.method,
                        path = %envelope.path,
                        error = %e,
                        "Backend exchange failed"
                    );
                    e.into_response()
                }
            }
        }
    };

    metrics::record_request(&envelope.method, response.status().as_u16(), start);
    response
}

/// Run one request/reply exchange on a new stream.
async fn relay(
    state: &AppState,
    session: &dyn Session,
    envelope: &RequestEnvelope,
    body: Body,
) -> Result<Bytes, ProxyError> {
    let control = envelope.encode().map_err(ProxyError::Envelope)?;

    let (send, recv) = session.open_bi().await.map_err(ProxyError::StreamOpen)?;
    let mut stream = BackendStream::new(send, recv, state.streams.track(session.id()));

    stream
        .writer()
        .write_all(&control)
        .await
        .map_err(|e| ProxyError::Envelope(FrameError::Write(e)))?;

    let mut chunks = body.into_data_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(ProxyError::from_body_error)?;
        stream
            .writer()
            .write_all(&chunk)
            .await
            .map_err(ProxyError::BodyForward)?;
    }

    if let Err(e) = stream.finish().await {
        tracing::warn!(
            session_id = %session.id(),
            error = %e,
            "Failed to close request half of backend stream"
        );
    }

    stream
        .read_reply(state.max_reply_bytes)
        .await
        .map_err(ProxyError::Reply)
}
