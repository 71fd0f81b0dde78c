//! Per-request backend streams and their accounting.
//!
//! # Responsibilities
//! - Own both halves of one stream for exactly one request/reply exchange
//! - Count every stream opened and closed
//! - Release the stream on every exit path of the proxy handler
//!
//! # Design Decisions
//! - Release is structural: dropping `BackendStream` drops both halves and
//!   the guard, so no error branch needs its own cleanup
//! - A stream dropped before `finish` succeeded is aborted, never finished:
//!   the worker must not see a truncated request as a complete one

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::session::{RecvHalf, SendHalf, SessionId, STREAM_ABORTED};
use crate::observability::metrics;

/// Counts backend streams opened and released.
#[derive(Debug, Clone, Default)]
pub struct StreamTracker {
    opened: Arc<AtomicU64>,
    closed: Arc<AtomicU64>,
}

impl StreamTracker {
    /// Create a new stream tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly opened stream. Returns a guard that records the close on drop.
    pub fn track(&self, session: SessionId) -> StreamGuard {
        self.opened.fetch_add(1, Ordering::SeqCst);
        metrics::record_stream_opened();
        StreamGuard {
            closed: Arc::clone(&self.closed),
            session,
        }
    }

    /// Total streams opened so far.
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Total streams released so far.
    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    /// Streams currently held by in-flight requests.
    pub fn active(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }
}

/// Marks one stream as open for as long as it lives.
#[derive(Debug)]
pub struct StreamGuard {
    closed: Arc<AtomicU64>,
    session: SessionId,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        metrics::record_stream_closed();
        tracing::trace!(session_id = %self.session, "Backend stream released");
    }
}

/// Outcome of draining a reply.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("reading reply failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("reply exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// One bidirectional stream, exclusively owned by one request.
pub struct BackendStream {
    send: SendHalf,
    recv: RecvHalf,
    finished: bool,
    guard: StreamGuard,
}

impl BackendStream {
    pub fn new(send: SendHalf, recv: RecvHalf, guard: StreamGuard) -> Self {
        Self {
            send,
            recv,
            finished: false,
            guard,
        }
    }

    /// Write half, for the envelope and the raw body.
    pub fn writer(&mut self) -> &mut SendHalf {
        &mut self.send
    }

    /// Close the write half. The peer sees end-of-request.
    pub async fn finish(&mut self) -> std::io::Result<()> {
        self.send.shutdown().await?;
        self.finished = true;
        Ok(())
    }

    /// Whether end-of-request has been signalled.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drain the read half until the peer closes it.
    pub async fn read_reply(&mut self, limit: usize) -> Result<Bytes, ReplyError> {
        let mut reply = Vec::new();
        let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
        (&mut self.recv)
            .take(cap)
            .read_to_end(&mut reply)
            .await
            .map_err(ReplyError::Read)?;

        if reply.len() > limit {
            return Err(ReplyError::TooLarge { limit });
        }
        Ok(Bytes::from(reply))
    }
}

impl Drop for BackendStream {
    fn drop(&mut self) {
        if !self.finished {
            self.send.abort(STREAM_ABORTED);
            tracing::debug!(session_id = %self.guard.session, "Backend stream aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::session::StreamSend;
    use std::io;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncWrite, DuplexStream, WriteHalf};

    /// Duplex write half that remembers an abort code.
    struct RecordingSend {
        inner: WriteHalf<DuplexStream>,
        aborted: Arc<Mutex<Option<u32>>>,
    }

    impl AsyncWrite for RecordingSend {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    impl StreamSend for RecordingSend {
        fn abort(&mut self, code: u32) {
            *self.aborted.lock().unwrap() = Some(code);
        }
    }

    fn duplex_stream(
        tracker: &StreamTracker,
    ) -> (BackendStream, DuplexStream, Arc<Mutex<Option<u32>>>) {
        let (local, remote) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(local);
        let aborted = Arc::new(Mutex::new(None));
        let send = RecordingSend {
            inner: write,
            aborted: Arc::clone(&aborted),
        };
        let stream = BackendStream::new(
            Box::new(send),
            Box::new(read),
            tracker.track(SessionId::new()),
        );
        (stream, remote, aborted)
    }

    #[test]
    fn tracker_counts() {
        let tracker = StreamTracker::new();
        assert_eq!(tracker.active(), 0);

        let g1 = tracker.track(SessionId::new());
        let g2 = tracker.track(SessionId::new());
        assert_eq!(tracker.opened(), 2);
        assert_eq!(tracker.active(), 2);

        drop(g1);
        assert_eq!(tracker.active(), 1);
        drop(g2);
        assert_eq!(tracker.closed(), 2);
        assert_eq!(tracker.active(), 0);
    }

    #[tokio::test]
    async fn dropping_stream_releases_it() {
        let tracker = StreamTracker::new();
        let (stream, _remote, _) = duplex_stream(&tracker);
        assert_eq!(tracker.active(), 1);
        drop(stream);
        assert_eq!(tracker.active(), 0);
    }

    #[tokio::test]
    async fn unfinished_stream_is_aborted_on_drop() {
        let tracker = StreamTracker::new();
        let (mut stream, _remote, aborted) = duplex_stream(&tracker);

        stream.writer().write_all(b"{\"amount\":").await.unwrap();
        assert!(!stream.is_finished());
        drop(stream);

        assert_eq!(*aborted.lock().unwrap(), Some(STREAM_ABORTED));
    }

    #[tokio::test]
    async fn finished_stream_is_not_aborted() {
        let tracker = StreamTracker::new();
        let (mut stream, _remote, aborted) = duplex_stream(&tracker);

        stream.finish().await.unwrap();
        assert!(stream.is_finished());
        drop(stream);

        assert_eq!(*aborted.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn reply_is_read_until_peer_closes() {
        let tracker = StreamTracker::new();
        let (mut stream, mut remote, _) = duplex_stream(&tracker);

        stream.writer().write_all(b"ping").await.unwrap();
        stream.finish().await.unwrap();

        let mut request = Vec::new();
        remote.read_to_end(&mut request).await.unwrap();
        assert_eq!(request, b"ping");

        remote.write_all(br#"{"status":"ok"}"#).await.unwrap();
        remote.shutdown().await.unwrap();

        let reply = stream.read_reply(1024).await.unwrap();
        assert_eq!(&reply[..], br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn reply_over_limit_is_rejected() {
        let tracker = StreamTracker::new();
        let (mut stream, mut remote, _) = duplex_stream(&tracker);

        remote.write_all(&[b'x'; 64]).await.unwrap();
        remote.shutdown().await.unwrap();

        let err = stream.read_reply(16).await.unwrap_err();
        assert!(matches!(err, ReplyError::TooLarge { limit: 16 }));
    }
}
