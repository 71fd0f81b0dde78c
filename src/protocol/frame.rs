//! Length-prefixed frame codec.
//!
//! ```text
//! +----------------------+---------------------------+
//! | length (u16, BE)     | payload (length bytes)    |
//! +----------------------+---------------------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Largest payload a single frame can carry.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Errors produced by the frame codec.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload does not fit behind a 16-bit length prefix.
    #[error("frame payload of {len} bytes exceeds the {max} byte limit", max = MAX_FRAME_LEN)]
    PayloadTooLarge { len: usize },

    /// Underlying stream rejected a write.
    #[error("transport write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Underlying stream failed or ended mid-frame.
    #[error("transport read failed: {0}")]
    Read(#[source] std::io::Error),

    /// Value could not be converted to or from JSON.
    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A text field arrived with invalid UTF-8.
    #[error("{field} frame is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

/// Append one frame for `payload` to `dst`.
///
/// Nothing is appended when the payload is too large.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
    let len = u16::try_from(payload.len())
        .map_err(|_| FrameError::PayloadTooLarge { len: payload.len() })?;
    dst.reserve(LENGTH_PREFIX_LEN + payload.len());
    dst.put_u16(len);
    dst.put_slice(payload);
    Ok(())
}

/// Write a single frame.
///
/// Prefix and payload go out in one `write_all`, so a failure never leaves
/// a prefix on the stream without its payload having been attempted too.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = BytesMut::new();
    encode_frame(payload, &mut buf)?;
    writer.write_all(&buf).await.map_err(FrameError::Write)
}

/// Read exactly one frame. A short read is an error, never a partial frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    reader
        .read_exact(&mut prefix)
        .await
        .map_err(FrameError::Read)?;

    let len = usize::from(u16::from_be_bytes(prefix));
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(FrameError::Read)?;

    Ok(Bytes::from(payload))
}

/// Serialize `value` as JSON and write it as one frame.
pub async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(value)?;
    write_frame(writer, &payload).await
}

/// Read one frame and decode it as JSON.
pub async fn read_json<R, T>(reader: &mut R) -> Result<T, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
    T: DeserializeOwned,
{
    let payload = read_frame(reader).await?;
    Ok(serde_json::from_slice(&payload)?)
}
