//! Registration handshake: `register` on open, `registered` to advance.

use std::time::Duration;

use envelopes::{Envelope, Role};
use tokio::sync::watch;

use crate::error::ConnectError;
use crate::state::ConnectionState;

/// What to do with an inbound `registered` acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Matching ack while awaiting registration: advance to `Registered`.
    Accepted,
    /// The relay acknowledged a role we did not ask for.
    RoleMismatch { expected: Role, acked: Role },
    /// Not waiting for an ack (already registered, or no open transport).
    Ignored(ConnectionState),
}

/// First envelope written on every freshly opened transport.
#[must_use]
pub fn register_envelope(role: Role) -> Envelope {
    Envelope::register(role)
}

#[must_use]
pub fn evaluate_ack(expected: Role, acked: Role, state: ConnectionState) -> AckOutcome {
    if state != ConnectionState::Open {
        return AckOutcome::Ignored(state);
    }
    if acked != expected {
        return AckOutcome::RoleMismatch { expected, acked };
    }
    AckOutcome::Accepted
}

/// Wait until `state` reports `Registered`, giving up after `timeout`.
///
/// # Errors
///
/// Returns [`ConnectError::RegistrationTimeout`] if registration does not
/// happen in time. Nothing is torn down; registration may still complete later.
pub async fn wait_for_registration(
    state: &mut watch::Receiver<ConnectionState>,
    timeout: Duration,
) -> Result<(), ConnectError> {
    match tokio::time::timeout(timeout, state.wait_for(|s| s.is_registered())).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) | Err(_) => Err(ConnectError::RegistrationTimeout(timeout)),
    }
}

#[cfg(test)]
#[path = "handshake_test.rs"]
mod tests;
