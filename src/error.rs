//! Error types surfaced by the client API.
//!
//! Local rejections (`SendError` variants other than `Write`) never touch the
//! network. Transport failures after a write has been issued show up as
//! `SendError::Write` to the caller and as close events to the connection task.

use std::time::Duration;

use envelopes::{Kind, Role};

use crate::state::ConnectionState;

/// Why an outbound envelope or request was not sent.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Payload traffic requires a registered connection.
    #[error("not registered with relay (state: {0})")]
    NotRegistered(ConnectionState),
    /// The envelope kind is reserved for the other role, or is server-bound only.
    #[error("{role} clients may not send `{kind}` envelopes")]
    KindNotPermitted { role: Role, kind: Kind },
    /// The protocol correlates by connection, so only one request may be in flight.
    #[error("a request is already pending on this connection")]
    RequestPending,
    /// The transport went away between the state check and the write.
    #[error("connection closed")]
    Closed,
    /// The websocket write itself failed.
    #[error("websocket write failed: {0}")]
    Write(Box<tokio_tungstenite::tungstenite::Error>),
}

/// Failure reported by `connect`.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// No matching `registered` acknowledgement arrived in time. The transport
    /// keeps running and may still register afterwards.
    #[error("registration not acknowledged within {0:?}")]
    RegistrationTimeout(Duration),
}

/// Failure reported by a pending request's completion handle.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    /// The connection dropped (or was closed) before a result arrived.
    #[error("request abandoned: connection closed before a result arrived")]
    Abandoned,
}
