//! Shared envelope model and JSON codec for the relay wire protocol.
//!
//! This crate owns the wire representation exchanged between a relay and its
//! two client roles. Every message is a single JSON text object tagged by its
//! `type` field; `input`/`output` payloads are opaque strings the relay never
//! inspects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Message used when a server `error` envelope carries no `message` field.
pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

/// Error returned by [`decode_envelope`] and [`Role::from_str`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text was not valid JSON or did not match any known envelope shape.
    #[error("failed to decode envelope: {0}")]
    Decode(#[from] serde_json::Error),
    /// A role name did not map to a known [`Role`] variant.
    #[error("invalid role: {0}")]
    InvalidRole(String),
}

/// Which side of the relay a connection represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Initiates work and awaits a result. Registered on the wire as `"web"`.
    #[serde(rename = "web")]
    Requester,
    /// Performs the work and returns a result. Registered on the wire as `"app"`.
    #[serde(rename = "app")]
    Worker,
}

impl Role {
    /// Wire name used in `register`/`registered` envelopes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requester => "web",
            Self::Worker => "app",
        }
    }

    /// The only payload-carrying kind this role may emit.
    #[must_use]
    pub fn outbound_kind(self) -> Kind {
        match self {
            Self::Requester => Kind::SendToApp,
            Self::Worker => Kind::SendToWeb,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" | "requester" => Ok(Self::Requester),
            "app" | "worker" => Ok(Self::Worker),
            other => Err(CodecError::InvalidRole(other.to_owned())),
        }
    }
}

/// A single message on the relay wire protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Client→server role registration.
    Register { client: Role },
    /// Server→client registration acknowledgement.
    Registered { client: Role },
    /// Requester→server: forward `input` to the worker.
    SendToApp { input: String },
    /// Server→worker: a forwarded requester `input`.
    ProcessInput { input: String },
    /// Worker→server: forward `output` to the requester.
    SendToWeb { output: String },
    /// Server→requester: a forwarded worker `output`.
    ReceiveOutput { output: String },
    /// Server→client error notice.
    Error {
        #[serde(default = "unknown_error_message")]
        message: String,
    },
}

/// Type tag of an [`Envelope`], without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Register,
    Registered,
    SendToApp,
    ProcessInput,
    SendToWeb,
    ReceiveOutput,
    Error,
}

impl Kind {
    /// Wire value of the `type` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Registered => "registered",
            Self::SendToApp => "send_to_app",
            Self::ProcessInput => "process_input",
            Self::SendToWeb => "send_to_web",
            Self::ReceiveOutput => "receive_output",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Envelope {
    /// Registration envelope for `role`.
    #[must_use]
    pub fn register(role: Role) -> Self {
        Self::Register { client: role }
    }

    /// Requester input bound for the worker.
    pub fn send_to_app(input: impl Into<String>) -> Self {
        Self::SendToApp { input: input.into() }
    }

    /// Worker output bound for the requester.
    pub fn send_to_web(output: impl Into<String>) -> Self {
        Self::SendToWeb { output: output.into() }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Register { .. } => Kind::Register,
            Self::Registered { .. } => Kind::Registered,
            Self::SendToApp { .. } => Kind::SendToApp,
            Self::ProcessInput { .. } => Kind::ProcessInput,
            Self::SendToWeb { .. } => Kind::SendToWeb,
            Self::ReceiveOutput { .. } => Kind::ReceiveOutput,
            Self::Error { .. } => Kind::Error,
        }
    }
}

/// Encode an envelope into its JSON text form.
#[must_use]
pub fn encode_envelope(envelope: &Envelope) -> String {
    // Every variant holds only strings and unit-like enums, so serialization
    // cannot fail; the fallback exists only to avoid a panic path.
    serde_json::to_string(envelope).unwrap_or_default()
}

/// Decode JSON text into an envelope.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON, an unknown `type`, or a
/// missing required field.
pub fn decode_envelope(text: &str) -> Result<Envelope, CodecError> {
    Ok(serde_json::from_str(text)?)
}

fn unknown_error_message() -> String {
    UNKNOWN_ERROR_MESSAGE.to_owned()
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
