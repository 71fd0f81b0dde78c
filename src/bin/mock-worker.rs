//! Minimal backend worker for trying the gateway by hand.
//!
//! Dials the gateway over QUIC, then answers every request stream with a JSON
//! echo of what it received.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use quinn::{ClientConfig, ConnectionError, Endpoint, RecvStream, SendStream};
use serde_json::json;

use quic_gateway::net::tls;
use quic_gateway::protocol::RequestEnvelope;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "mock-worker")]
#[command(about = "Echo worker for the QUIC gateway", long_about = None)]
struct Cli {
    /// Gateway QUIC address
    #[arg(short, long, default_value = "127.0.0.1:4433")]
    gateway: SocketAddr,

    /// TLS server name to verify
    #[arg(long, default_value = "localhost")]
    server_name: String,

    /// CA (or self-signed) certificate the gateway presents
    #[arg(long, default_value = "cert.pem")]
    ca_cert: PathBuf,

    #[arg(long, default_value = "quic-api")]
    alpn: String,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_worker=info,info".into()),
        )
        .init();

    let cli = Cli::parse();

    let crypto = tls::client_crypto(&cli.ca_cert, &cli.alpn)?;
    let bind: SocketAddr = if cli.gateway.is_ipv6() {
        "[::]:0".parse()?
    } else {
        "0.0.0.0:0".parse()?
    };
    let mut endpoint = Endpoint::client(bind)?;
    endpoint.set_default_client_config(ClientConfig::new(crypto));

    let connection = endpoint.connect(cli.gateway, &cli.server_name)?.await?;
    tracing::info!(gateway = %cli.gateway, "Connected to gateway");

    loop {
        match connection.accept_bi().await {
            Ok((send, recv)) => {
                tokio::spawn(async move {
                    if let Err(e) = handle_stream(send, recv).await {
                        tracing::warn!(error = %e, "Stream failed");
                    }
                });
            }
            Err(ConnectionError::ApplicationClosed(close)) => {
                tracing::info!(
                    reason = %String::from_utf8_lossy(&close.reason),
                    "Gateway closed the connection"
                );
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    endpoint.wait_idle().await;
    Ok(())
}

async fn handle_stream(mut send: SendStream, mut recv: RecvStream) -> Result<(), BoxError> {
    let envelope = RequestEnvelope::read_from(&mut recv).await?;
    let body = recv.read_to_end(MAX_BODY_BYTES).await?;

    tracing::info!(
        method = %envelope.method,
        path = %envelope.path,
        body_bytes = body.len(),
        "Request"
    );

    let reply = serde_json::to_vec(&json!({
        "status": "ok",
        "method": envelope.method,
        "path": envelope.path,
        "headers": envelope.headers,
        "body": String::from_utf8_lossy(&body),
    }))?;

    send.write_all(&reply).await?;
    send.finish()?;
    Ok(())
}
