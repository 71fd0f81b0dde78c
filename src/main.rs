//! QUIC gateway (v1)
//!
//! Accepts public HTTP traffic and relays every request to a backend worker
//! connected over QUIC.
//!
//! # Architecture Overview
//!
//! ```text
//!     HTTP client                                        Backend worker
//!         │                                                    │
//!         ▼                                                    │ dials in (QUIC, ALPN quic-api)
//!   ┌───────────┐   ┌──────────────┐   ┌──────────────┐       ▼
//!   │   http    │──▶│    proxy     │──▶│   registry   │◀── accept loop
//!   │  server   │   │   handler    │   │ (one session)│
//!   └───────────┘   └──────┬───────┘   └──────────────┘
//!                          │ open_bi
//!                          ▼
//!                   method │ path │ headers │ body ──▶ worker
//!                   reply (JSON, until EOF)  ◀────────
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use quic_gateway::config::load_config;
use quic_gateway::lifecycle::startup;
use quic_gateway::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "quic-gateway", version, about = "HTTP to QUIC gateway")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("quic-gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&config.observability);

    tracing::info!(
        http_address = %config.http.bind_address,
        quic_address = %config.quic.bind_address,
        route_prefix = %config.http.route_prefix,
        alpn = %config.quic.alpn,
        "quic-gateway v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Gateway stopped with error");
            ExitCode::FAILURE
        }
    }
}
