//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::extract::connect_info::MockConnectInfo;
use axum::Router;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, Sink, WriteHalf,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use quic_gateway::config::GatewayConfig;
use quic_gateway::http::HttpServer;
use quic_gateway::net::{
    RecvHalf, Registry, SendHalf, Session, SessionId, StreamSend, StreamTracker, TransportError,
};
use quic_gateway::protocol::RequestEnvelope;

pub const CLIENT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 40_000);

/// Config tuned for tests: short stream deadline.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.timeouts.stream_secs = 2;
    config
}

/// Router wired to `registry`, with a fixed client address.
pub fn test_router(config: GatewayConfig, registry: Arc<Registry>) -> (Router, StreamTracker) {
    let server = HttpServer::new(config, registry);
    let streams = server.state().streams.clone();
    let router = server
        .router()
        .layer(MockConnectInfo(SocketAddr::from(CLIENT_ADDR)));
    (router, streams)
}

/// In-memory session. Every `open_bi` hands the worker end of a duplex pipe
/// to the receiver returned by `new`.
pub struct DuplexSession {
    id: SessionId,
    alive: AtomicBool,
    streams: mpsc::UnboundedSender<DuplexStream>,
    closed: CancellationToken,
    close_reason: Mutex<Option<(u32, String)>>,
    aborts: Arc<Mutex<Vec<u32>>>,
}

impl DuplexSession {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: SessionId::new(),
            alive: AtomicBool::new(true),
            streams: tx,
            closed: CancellationToken::new(),
            close_reason: Mutex::new(None),
            aborts: Arc::new(Mutex::new(Vec::new())),
        });
        (session, rx)
    }

    pub fn close_reason(&self) -> Option<(u32, String)> {
        self.close_reason.lock().unwrap().clone()
    }

    /// Codes of every stream the gateway aborted, in order.
    pub fn abort_codes(&self) -> Vec<u32> {
        self.aborts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Session for DuplexSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn remote_addr(&self) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 2], 5000))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn open_bi(&self) -> Result<(SendHalf, RecvHalf), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        let (gateway_end, worker_end) = tokio::io::duplex(64 * 1024);
        self.streams
            .send(worker_end)
            .map_err(|_| TransportError::Closed)?;
        let (recv, send) = tokio::io::split(gateway_end);
        let send = DuplexSend {
            inner: send,
            aborts: Arc::clone(&self.aborts),
        };
        Ok((Box::new(send), Box::new(recv)))
    }

    fn close(&self, code: u32, reason: &str) {
        self.alive.store(false, Ordering::SeqCst);
        *self.close_reason.lock().unwrap() = Some((code, reason.to_string()));
        self.closed.cancel();
    }

    async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

/// Session whose streams open fine but fail once the reply is read.
pub struct BrokenSession {
    id: SessionId,
}

impl BrokenSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::new(),
        })
    }
}

#[async_trait]
impl Session for BrokenSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn remote_addr(&self) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 3], 5000))
    }

    fn is_alive(&self) -> bool {
        true
    }

    async fn open_bi(&self) -> Result<(SendHalf, RecvHalf), TransportError> {
        Ok((Box::new(SinkSend(tokio::io::sink())), Box::new(ResetReader)))
    }

    fn close(&self, _code: u32, _reason: &str) {}

    async fn closed(&self) {
        std::future::pending::<()>().await;
    }
}

/// Gateway send half of a duplex stream. An abort only records its code.
struct DuplexSend {
    inner: WriteHalf<DuplexStream>,
    aborts: Arc<Mutex<Vec<u32>>>,
}

impl AsyncWrite for DuplexSend {
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

impl StreamSend for DuplexSend {
    fn abort(&mut self, code: u32) {
        self.aborts.lock().unwrap().push(code);
    }
}

struct SinkSend(Sink);

impl AsyncWrite for SinkSend {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

impl StreamSend for SinkSend {
    fn abort(&mut self, _code: u32) {}
}

/// Reader that fails like a reset stream.
struct ResetReader;

impl AsyncRead for ResetReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "stream reset by peer",
        )))
    }
}

/// Read one request (envelope and body until end-of-write) from the worker end.
pub async fn read_request(stream: &mut DuplexStream) -> (RequestEnvelope, Vec<u8>) {
    let envelope = RequestEnvelope::read_from(stream).await.unwrap();
    let mut body = Vec::new();
    stream.read_to_end(&mut body).await.unwrap();
    (envelope, body)
}

/// Send `reply` and close the worker's write half.
pub async fn reply(stream: &mut DuplexStream, reply: &[u8]) {
    stream.write_all(reply).await.unwrap();
    stream.shutdown().await.unwrap();
}

/// Answer every stream with `{"status":"ok"}`.
pub fn spawn_ok_worker(mut streams: mpsc::UnboundedReceiver<DuplexStream>) {
    tokio::spawn(async move {
        while let Some(mut stream) = streams.recv().await {
            tokio::spawn(async move {
                let _ = read_request(&mut stream).await;
                reply(&mut stream, br#"{"status":"ok"}"#).await;
            });
        }
    });
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
