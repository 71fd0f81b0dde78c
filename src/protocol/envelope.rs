//! Request envelope: the positional frame sequence describing one HTTP request.
//!
//! # Responsibilities
//! - Capture method, path (with query) and headers from an inbound request
//! - Encode the three control frames in their fixed order
//! - Decode them again on the worker side
//!
//! # Design Decisions
//! - All control frames are encoded into one buffer before anything is
//!   written, so size and serialization failures leave the stream untouched
//! - Header names use canonical MIME casing and keys serialize sorted, which
//!   is the shape the existing workers decode
//! - `Host` is carried by the transport, not by the header block

use std::collections::BTreeMap;

use axum::http::{header, request::Parts, HeaderMap};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::frame::{encode_frame, read_frame, read_json, FrameError};

/// Header block as sent in the third frame: canonical name → values in arrival order.
pub type HeaderBlock = BTreeMap<String, Vec<String>>;

/// Control portion of one proxied request. The body follows it unframed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub method: String,
    pub path: String,
    pub headers: HeaderBlock,
}

impl RequestEnvelope {
    /// Build the envelope from the head of an HTTP request.
    pub fn from_parts(parts: &Parts) -> Self {
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();

        Self {
            method: parts.method.as_str().to_string(),
            path,
            headers: header_block(&parts.headers),
        }
    }

    /// Encode the method, path and header frames into a single buffer.
    pub fn encode(&self) -> Result<BytesMut, FrameError> {
        let headers = serde_json::to_vec(&self.headers)?;
        let mut buf = BytesMut::new();
        encode_frame(self.method.as_bytes(), &mut buf)?;
        encode_frame(self.path.as_bytes(), &mut buf)?;
        encode_frame(&headers, &mut buf)?;
        Ok(buf)
    }

    /// Write the control frames to `writer`. The caller streams the body next.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), FrameError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let buf = self.encode()?;
        writer.write_all(&buf).await.map_err(FrameError::Write)
    }

    /// Read the control frames from `reader`, leaving the body unread.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, FrameError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let method = read_text(reader, "method").await?;
        let path = read_text(reader, "path").await?;
        let headers: HeaderBlock = read_json(reader).await?;
        Ok(Self {
            method,
            path,
            headers,
        })
    }
}

async fn read_text<R>(reader: &mut R, field: &'static str) -> Result<String, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let payload = read_frame(reader).await?;
    String::from_utf8(payload.to_vec()).map_err(|_| FrameError::InvalidUtf8 { field })
}

fn header_block(headers: &HeaderMap) -> HeaderBlock {
    let mut block = HeaderBlock::new();
    for (name, value) in headers {
        if name == header::HOST {
            continue;
        }
        block
            .entry(canonical_header_key(name.as_str()))
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    block
}

/// Canonical MIME casing: first letter and every letter after `-` upper case,
/// everything else lower case (`x-request-id` → `X-Request-Id`).
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn canonical_keys() {
        assert_eq!(canonical_header_key("authorization"), "Authorization");
        assert_eq!(canonical_header_key("x-request-id"), "X-Request-Id");
        assert_eq!(canonical_header_key("CONTENT-TYPE"), "Content-Type");
        assert_eq!(canonical_header_key("dnt"), "Dnt");
    }

    #[test]
    fn envelope_keeps_query_and_drops_host() {
        let request = Request::builder()
            .method("GET")
            .uri("/api/items?x=1")
            .header("host", "gateway.local")
            .header("authorization", "Bearer t")
            .body(())
            .unwrap();

        let envelope = RequestEnvelope::from_parts(&parts(request));
        assert_eq!(envelope.method, "GET");
        assert_eq!(envelope.path, "/api/items?x=1");
        assert_eq!(envelope.headers.len(), 1);
        assert_eq!(
            envelope.headers.get("Authorization"),
            Some(&vec!["Bearer t".to_string()])
        );
    }

    #[test]
    fn repeated_headers_keep_arrival_order() {
        let request = Request::builder()
            .uri("/api")
            .header("accept", "text/html")
            .header("accept", "application/json")
            .body(())
            .unwrap();

        let envelope = RequestEnvelope::from_parts(&parts(request));
        assert_eq!(
            envelope.headers["Accept"],
            vec!["text/html".to_string(), "application/json".to_string()]
        );
    }

    #[tokio::test]
    async fn wire_layout_matches_worker_expectations() {
        let request = Request::builder()
            .method("GET")
            .uri("/api/items?x=1")
            .header("authorization", "Bearer t")
            .body(())
            .unwrap();
        let envelope = RequestEnvelope::from_parts(&parts(request));

        let mut wire = Vec::new();
        envelope.write_to(&mut wire).await.unwrap();

        let headers = br#"{"Authorization":["Bearer t"]}"#;
        let mut expected = vec![0x00, 0x03];
        expected.extend_from_slice(b"GET");
        expected.extend_from_slice(&[0x00, 0x0E]);
        expected.extend_from_slice(b"/api/items?x=1");
        expected.extend_from_slice(&(headers.len() as u16).to_be_bytes());
        expected.extend_from_slice(headers);
        assert_eq!(wire, expected);

        let mut reader = wire.as_slice();
        let decoded = RequestEnvelope::read_from(&mut reader).await.unwrap();
        assert_eq!(decoded, envelope);
    }

    #[tokio::test]
    async fn oversized_path_writes_nothing() {
        let envelope = RequestEnvelope {
            method: "GET".into(),
            path: format!("/api/{}", "a".repeat(70_000)),
            headers: HeaderBlock::new(),
        };

        let mut wire = Vec::new();
        let err = envelope.write_to(&mut wire).await.unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(wire.is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_method_is_rejected() {
        let wire = [0x00, 0x02, 0xFF, 0xFE];
        let mut reader = &wire[..];
        let err = RequestEnvelope::read_from(&mut reader).await.unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8 { field: "method" }));
    }
}
