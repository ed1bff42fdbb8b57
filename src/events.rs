//! Lifecycle notifications broadcast to subscribers.

use std::time::Duration;

use envelopes::Role;

/// Events are best-effort: a slow or absent subscriber never affects the
/// connection, it only misses (or lags behind on) notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Transport established; registration pending.
    Connected,
    /// Relay acknowledged our role.
    Registered(Role),
    /// Relay sent an `error` envelope.
    ServerError(String),
    /// Transport failed to open, or reported an error while open.
    TransportError(String),
    /// An open transport went away.
    Disconnected,
    /// An unplanned close scheduled reconnect `attempt` after `delay`.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Reconnect attempts ran out; a fresh `connect` is required.
    ReconnectExhausted,
    /// A result arrived with no pending request and was dropped.
    StrayOutput,
}

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;
