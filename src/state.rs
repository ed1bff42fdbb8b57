//! Connection lifecycle state.

use std::fmt;

/// Where a client sits in the connect → register → close lifecycle.
///
/// Transitions:
/// - `Disconnected → Connecting` when `connect` starts a connection task
/// - `Connecting → Open` once the websocket handshake completes
/// - `Open → Registered` when the relay acknowledges our role
/// - `Registered → Connecting` only through the reconnect policy
/// - any → `Closing → Disconnected` on `close`, any → `Disconnected` on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Registered,
    Closing,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Registered => "registered",
            Self::Closing => "closing",
        }
    }

    /// Payload traffic is only accepted once registered.
    #[must_use]
    pub fn is_registered(self) -> bool {
        self == Self::Registered
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
