//! Single-slot tracker for the one request a connection may have in flight.
//!
//! DESIGN
//! ======
//! The relay correlates requests and results purely by connection identity,
//! so at most one request can be outstanding. Completion is a `oneshot`
//! channel: `resolve` sends exactly once, `clear` drops the sender so the
//! caller's handle observes [`RequestError::Abandoned`] instead of a value.

use std::time::{Duration, Instant};

use envelopes::Role;
use tokio::sync::oneshot;

use crate::error::{RequestError, SendError};
use crate::state::ConnectionState;

struct PendingRequest {
    tx: oneshot::Sender<String>,
    issued_at: Instant,
}

#[derive(Default)]
pub struct PendingSlot {
    slot: Option<PendingRequest>,
}

impl PendingSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// How long the current request has been waiting, if any.
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        self.slot.as_ref().map(|p| p.issued_at.elapsed())
    }

    /// Reserve the slot for a new request.
    ///
    /// # Errors
    ///
    /// Rejects when `role` is not a requester, `state` is not registered, or a
    /// request is already pending.
    pub fn issue(&mut self, role: Role, state: ConnectionState) -> Result<PendingResponse, SendError> {
        if role != Role::Requester {
            return Err(SendError::KindNotPermitted { role, kind: envelopes::Kind::SendToApp });
        }
        if !state.is_registered() {
            return Err(SendError::NotRegistered(state));
        }
        if self.slot.is_some() {
            return Err(SendError::RequestPending);
        }

        let (tx, rx) = oneshot::channel();
        self.slot = Some(PendingRequest { tx, issued_at: Instant::now() });
        Ok(PendingResponse { rx })
    }

    /// Complete the pending request with `payload`. Returns `false` when no
    /// request was pending (a stray or duplicate result).
    pub fn resolve(&mut self, payload: String) -> bool {
        let Some(pending) = self.slot.take() else {
            return false;
        };
        if pending.tx.send(payload).is_err() {
            tracing::debug!("relay: result arrived after caller dropped its handle");
        }
        true
    }

    /// Abandon the pending request without completing it.
    pub fn clear(&mut self) -> bool {
        self.slot.take().is_some()
    }
}

/// Completion handle returned for an accepted request.
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<String>,
}

impl PendingResponse {
    /// Wait for the relayed result.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Abandoned`] when the connection dropped first.
    pub async fn recv(self) -> Result<String, RequestError> {
        self.rx.await.map_err(|_| RequestError::Abandoned)
    }
}

#[cfg(test)]
#[path = "pending_test.rs"]
mod tests;
