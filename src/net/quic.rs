//! QUIC-backed session.

use std::net::SocketAddr;

use async_trait::async_trait;
use quinn::{Connection, SendStream, VarInt};

use super::session::{RecvHalf, SendHalf, Session, SessionId, StreamSend, TransportError};

/// A backend session carried by one `quinn::Connection`.
#[derive(Debug, Clone)]
pub struct QuicSession {
    id: SessionId,
    connection: Connection,
}

impl QuicSession {
    pub fn new(connection: Connection) -> Self {
        Self {
            id: SessionId::new(),
            connection,
        }
    }

    /// Underlying quinn connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

#[async_trait]
impl Session for QuicSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    fn is_alive(&self) -> bool {
        self.connection.close_reason().is_none()
    }

    async fn open_bi(&self) -> Result<(SendHalf, RecvHalf), TransportError> {
        let (send, recv) = self.connection.open_bi().await?;
        Ok((Box::new(send), Box::new(recv)))
    }

    fn close(&self, code: u32, reason: &str) {
        self.connection.close(VarInt::from_u32(code), reason.as_bytes());
    }

    async fn closed(&self) {
        let reason = self.connection.closed().await;
        tracing::debug!(session_id = %self.id, reason = %reason, "QUIC connection closed");
    }
}

impl StreamSend for SendStream {
    fn abort(&mut self, code: u32) {
        // Already finished or reset streams have nothing left to abort.
        let _ = SendStream::reset(self, VarInt::from_u32(code));
    }
}
