//! Background accept loop keeping the registry populated.
//!
//! # State Machine
//! ```text
//! Listening → (session accepted) → install → Listening
//! Listening → (shutdown)          → stop intake → Stopped
//! ```
//!
//! # Design Decisions
//! - A failed accept is logged and the loop keeps going
//! - A failure caused by shutdown ends the loop silently
//! - Shutdown only stops intake; the registered session keeps serving
//!   in-flight requests until startup closes the listener after the drain
//! - Each installed session gets a watcher that clears the registry slot when
//!   the worker disconnects on its own

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::listener::{AcceptError, SessionListener};
use super::registry::Registry;
use super::session::Session;
use crate::observability::metrics;

/// Accept sessions until `shutdown` is cancelled.
pub async fn run_accept_loop<L>(
    listener: Arc<L>,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
) where
    L: SessionListener + ?Sized,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Accepting backend sessions");
    }

    loop {
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                listener.stop_accepting();
                break;
            }
            result = listener.accept() => result,
        };

        match result {
            Ok(session) => {
                registry.install(Arc::clone(&session));
                spawn_disconnect_watch(Arc::clone(&registry), session, shutdown.clone());
            }
            Err(_) if shutdown.is_cancelled() => break,
            Err(AcceptError::Closed) => {
                tracing::warn!("QUIC listener closed unexpectedly, accept loop exiting");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept backend session");
                metrics::record_accept_error();
            }
        }
    }

    tracing::info!("Accept loop stopped");
}

fn spawn_disconnect_watch(
    registry: Arc<Registry>,
    session: Arc<dyn Session>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = session.closed() => {
                if registry.remove_if_current(session.id()) {
                    tracing::warn!(
                        session_id = %session.id(),
                        remote_addr = %session.remote_addr(),
                        "Backend session disconnected"
                    );
                    metrics::record_backend_session("disconnected");
                }
            }
            _ = shutdown.cancelled() => {}
        }
    });
}
