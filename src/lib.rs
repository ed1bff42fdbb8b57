//! Client for a two-party websocket relay.
//!
//! A relay pairs one requester (`web`) with one worker (`app`). Each client
//! registers its role, then exchanges opaque payloads through the relay:
//! requesters send `send_to_app` and receive `receive_output`, workers
//! receive `process_input` and reply with `send_to_web`.
//!
//! ```text
//! requester ──send_to_app──▶ relay ──process_input──▶ worker
//! requester ◀─receive_output── relay ◀──send_to_web── worker
//! ```
//!
//! [`RelayClient`] owns the connection lifecycle: registration handshake,
//! inbound routing, the single pending-request slot and reconnect with
//! exponential backoff.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod handshake;
pub mod pending;
pub mod processor;
pub mod router;
pub mod state;
pub mod workload;

pub use backoff::ReconnectPolicy;
pub use client::RelayClient;
pub use config::{ConfigError, RelayConfig};
pub use envelopes::{Envelope, Kind, Role};
pub use error::{ConnectError, RequestError, SendError};
pub use events::ClientEvent;
pub use pending::PendingResponse;
pub use processor::{ProcessError, Processor};
pub use state::ConnectionState;
pub use workload::WorkloadResult;
