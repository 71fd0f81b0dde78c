//! Single-slot registry of the active backend session.
//!
//! # Responsibilities
//! - Hand the current session to proxy handlers (shared, read-locked)
//! - Install a newly accepted session, closing the one it supersedes
//! - Forget a session that disconnected on its own
//!
//! # Design Decisions
//! - Exactly one backend is authoritative; there is no pool
//! - The lock is never held across I/O: readers clone the `Arc` and release
//! - A session that died between install and use reads as "no backend"

use std::sync::{Arc, RwLock};

use super::session::{Session, SessionId};
use crate::observability::metrics;

/// Application error code sent when a session is replaced.
pub const SUPERSEDED_CODE: u32 = 0;

/// Reason sent when a session is replaced.
pub const SUPERSEDED_REASON: &str = "superseded by new connection";

/// Holder of the one active backend session.
#[derive(Default)]
pub struct Registry {
    active: RwLock<Option<Arc<dyn Session>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session, if one is registered and still alive.
    pub fn get_active(&self) -> Option<Arc<dyn Session>> {
        let session = self
            .active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()?;
        session.is_alive().then_some(session)
    }

    /// Make `session` the active one. Any previous session is closed.
    pub fn install(&self, session: Arc<dyn Session>) {
        let mut slot = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = slot.take() {
            tracing::info!(
                session_id = %previous.id(),
                remote_addr = %previous.remote_addr(),
                replaced_by = %session.id(),
                "Superseding backend session"
            );
            previous.close(SUPERSEDED_CODE, SUPERSEDED_REASON);
            metrics::record_backend_session("superseded");
        }

        tracing::info!(
            session_id = %session.id(),
            remote_addr = %session.remote_addr(),
            "Backend session installed"
        );
        *slot = Some(session);
        metrics::record_backend_session("installed");
        metrics::set_backend_connected(true);
    }

    /// Clear the slot if it still holds the session `id`.
    ///
    /// Returns true when the slot was cleared. A superseded session never
    /// clears its successor.
    pub fn remove_if_current(&self, id: SessionId) -> bool {
        let mut slot = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if slot.as_ref().is_some_and(|s| s.id() == id) {
            *slot = None;
            metrics::set_backend_connected(false);
            true
        } else {
            false
        }
    }

    /// True when a live session is registered.
    pub fn is_connected(&self) -> bool {
        self.get_active().is_some()
    }
}
