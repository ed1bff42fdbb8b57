//! Inbound envelope routing.
//!
//! DESIGN
//! ======
//! `route` is pure: it decides what an envelope means for this client's role
//! and returns a `Route`. The connection task owns every side effect
//! (state changes, writes, completing the pending request), the same split
//! the relay itself uses between handlers and dispatch.

use envelopes::{Envelope, Kind, Role};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Registration acknowledgement for the given role.
    Ack(Role),
    /// Relay-reported error, surfaced to subscribers. Non-fatal.
    ServerError(String),
    /// Worker: run the processor on this input and reply with `send_to_web`.
    Process(String),
    /// Requester: complete the pending request with this output.
    Output(String),
    /// Not meaningful for this client; log and drop.
    Drop(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Payload meant for the other role.
    WrongRole { role: Role, kind: Kind },
    /// A client→server kind echoed back at us.
    ServerBound(Kind),
}

#[must_use]
pub fn route(role: Role, envelope: Envelope) -> Route {
    match envelope {
        Envelope::Registered { client } => Route::Ack(client),
        Envelope::Error { message } => Route::ServerError(message),
        Envelope::ProcessInput { input } if role == Role::Worker => Route::Process(input),
        Envelope::ReceiveOutput { output } if role == Role::Requester => Route::Output(output),
        env @ (Envelope::ProcessInput { .. } | Envelope::ReceiveOutput { .. }) => {
            Route::Drop(DropReason::WrongRole { role, kind: env.kind() })
        }
        env @ (Envelope::Register { .. } | Envelope::SendToApp { .. } | Envelope::SendToWeb { .. }) => {
            Route::Drop(DropReason::ServerBound(env.kind()))
        }
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
