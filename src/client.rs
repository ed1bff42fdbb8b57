//! Connection manager for a single relay connection.
//!
//! DESIGN
//! ======
//! `RelayClient` owns the lifecycle state, the reconnect counter and the
//! pending-request slot; one connection task per `connect` drives the
//! transport. Caller-facing operations only read a state snapshot and write
//! through the shared sink, so they never wait on the connection task.
//!
//! - `ConnectionState` lives in a `watch` channel: one writer at a time,
//!   consistent snapshot reads, and `connect` can wait on it under a timeout.
//! - Reconnect counter and pending slot sit behind a `std::sync::Mutex` that
//!   is never held across an await.
//! - The websocket write half sits behind a `tokio::sync::Mutex` so caller
//!   writes and router writes serialize.
//! - A per-connection reader task feeds a bounded queue; the connection task
//!   handles those events strictly in arrival order.
//!
//! LIFECYCLE
//! =========
//! 1. `connect` spawns the connection task → `Connecting`
//! 2. Websocket opens → `Open`, `register` written immediately
//! 3. Matching `registered` → `Registered`, reconnect counter reset
//! 4. Unplanned close → teardown, pending request abandoned, backoff wait,
//!    back to 1 (or give up once the policy runs out)
//! 5. `close` cancels the task (including a scheduled reconnect), closes the
//!    socket, abandons any pending request → `Disconnected`

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use envelopes::{Envelope, Role, decode_envelope, encode_envelope};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::ReconnectState;
use crate::config::RelayConfig;
use crate::error::{ConnectError, SendError};
use crate::events::{ClientEvent, EVENT_CHANNEL_CAPACITY};
use crate::handshake::{self, AckOutcome};
use crate::pending::{PendingResponse, PendingSlot};
use crate::processor::{self, Processor};
use crate::router::{self, Route};
use crate::state::ConnectionState;
use crate::workload;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Inbound transport events buffered between the reader and the router.
const TRANSPORT_QUEUE_CAPACITY: usize = 64;

// =============================================================================
// SHARED STATE
// =============================================================================

struct Shared {
    config: RelayConfig,
    processor: Option<Arc<dyn Processor>>,
    state: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    events: broadcast::Sender<ClientEvent>,
}

#[derive(Default)]
struct Inner {
    reconnect: ReconnectState,
    pending: PendingSlot,
    /// Set when the reconnect policy gave up; cleared by the next `connect`.
    exhausted: bool,
    task: Option<ConnectionTask>,
}

struct ConnectionTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Inner holds plain data; a panic elsewhere cannot leave it half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "relay: state transition");
        }
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Write an envelope with no state or role checks.
    async fn write(&self, envelope: &Envelope) -> Result<(), SendError> {
        let text = encode_envelope(envelope);
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(SendError::Closed);
        };
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| SendError::Write(Box::new(e)))
    }

    /// Write a payload envelope after the registration and role checks.
    async fn send_checked(&self, envelope: Envelope) -> Result<(), SendError> {
        let state = self.state();
        if !state.is_registered() {
            return Err(SendError::NotRegistered(state));
        }
        let role = self.config.role;
        let kind = envelope.kind();
        if kind != role.outbound_kind() {
            return Err(SendError::KindNotPermitted { role, kind });
        }
        self.write(&envelope).await
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// A relay client for one role, owning at most one live connection.
///
/// Dropping the client cancels its connection task.
pub struct RelayClient {
    shared: Arc<Shared>,
}

impl RelayClient {
    /// Client without a processor. Workers built this way answer every
    /// `process_input` with an error result.
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self::build(config, None)
    }

    /// Client whose worker side runs `processor` on each relayed input.
    #[must_use]
    pub fn with_processor(config: RelayConfig, processor: impl Processor) -> Self {
        Self::build(config, Some(Arc::new(processor)))
    }

    fn build(config: RelayConfig, processor: Option<Arc<dyn Processor>>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                processor,
                state,
                inner: Mutex::new(Inner::default()),
                sink: tokio::sync::Mutex::new(None),
                events,
            }),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.shared.config.role
    }

    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Lifecycle notifications from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().reconnect.attempts()
    }

    #[must_use]
    pub fn has_pending_request(&self) -> bool {
        !self.shared.lock().pending.is_empty()
    }

    /// True once automatic reconnection has given up.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.shared.lock().exhausted
    }

    /// [`RelayClient::connect_within`] using the configured registration timeout.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::connect_within`].
    pub async fn connect(&self) -> Result<(), ConnectError> {
        self.connect_within(self.shared.config.registration_timeout).await
    }

    /// Start the connection task (unless one is already running) and wait up
    /// to `timeout` for registration.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::RegistrationTimeout`] when the relay has not
    /// acknowledged registration in time. The connection task keeps running;
    /// watch [`RelayClient::subscribe_state`] to learn when it registers.
    pub async fn connect_within(&self, timeout: Duration) -> Result<(), ConnectError> {
        let mut state = self.shared.state.subscribe();
        self.ensure_task();
        handshake::wait_for_registration(&mut state, timeout).await
    }

    fn ensure_task(&self) {
        let mut inner = self.shared.lock();
        let running = !inner.exhausted && inner.task.as_ref().is_some_and(|t| !t.handle.is_finished());
        if running {
            return;
        }

        if let Some(previous) = inner.task.take() {
            previous.cancel.cancel();
        }
        inner.reconnect.reset();
        inner.exhausted = false;

        let cancel = CancellationToken::new();
        self.shared.set_state(ConnectionState::Connecting);
        let handle = tokio::spawn(run_connection(Arc::clone(&self.shared), cancel.clone()));
        inner.task = Some(ConnectionTask { cancel, handle });
    }

    /// Send a payload envelope.
    ///
    /// A `send_to_app` occupies the pending-request slot exactly like
    /// [`RelayClient::request`]; its output is discarded on arrival.
    ///
    /// # Errors
    ///
    /// Rejected without network I/O when not registered, when `envelope`'s
    /// kind is not this role's outbound kind, or (for `send_to_app`) while a
    /// request is pending; [`SendError::Write`] when the socket write fails.
    pub async fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        match envelope {
            Envelope::SendToApp { input } => self.request(input).await.map(drop),
            other => self.shared.send_checked(other).await,
        }
    }

    /// Worker: forward `output` to the requester.
    ///
    /// # Errors
    ///
    /// Same as [`RelayClient::send`].
    pub async fn send_output(&self, output: impl Into<String>) -> Result<(), SendError> {
        self.send(Envelope::send_to_web(output)).await
    }

    /// Requester: forward `input` to the worker and return a handle that
    /// completes with the relayed output.
    ///
    /// # Errors
    ///
    /// Rejected without network I/O for a worker client, when not registered,
    /// or while another request is pending. A failed write frees the slot again.
    pub async fn request(&self, input: impl Into<String>) -> Result<PendingResponse, SendError> {
        let state = self.shared.state();
        let response = self.shared.lock().pending.issue(self.role(), state)?;

        if let Err(e) = self.shared.write(&Envelope::send_to_app(input)).await {
            self.shared.lock().pending.clear();
            return Err(e);
        }
        Ok(response)
    }

    /// Tear down the connection. Idempotent.
    ///
    /// Cancels a scheduled reconnect, closes the socket and abandons any
    /// pending request without completing it.
    pub async fn close(&self) {
        let task = self.shared.lock().task.take();
        if task.is_none() && self.shared.state() == ConnectionState::Disconnected {
            return;
        }

        self.shared.set_state(ConnectionState::Closing);
        if let Some(task) = task {
            task.cancel.cancel();
            task.handle.abort();
            let _ = task.handle.await;
        }

        let sink = self.shared.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "relay: close handshake failed");
            }
        }

        let abandoned = self.shared.lock().pending.clear();
        self.shared.set_state(ConnectionState::Disconnected);
        self.shared.emit(ClientEvent::Disconnected);
        info!(url = %self.shared.config.url, abandoned, "relay: closed");
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        if let Some(task) = self.shared.lock().task.take() {
            task.cancel.cancel();
        }
    }
}

// =============================================================================
// CONNECTION TASK
// =============================================================================

/// Open, run and re-open sessions until cancelled or the policy gives up.
async fn run_connection(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        shared.set_state(ConnectionState::Connecting);
        tokio::select! {
            () = cancel.cancelled() => return,
            () = run_session(&shared, &cancel) => {}
        }
        if cancel.is_cancelled() {
            return;
        }

        let (delay, attempt) = {
            let mut inner = shared.lock();
            let delay = inner.reconnect.next_delay(&shared.config.reconnect);
            (delay, inner.reconnect.attempts())
        };

        let Some(delay) = delay else {
            warn!(url = %shared.config.url, attempts = attempt, "relay: reconnect attempts exhausted; giving up");
            shared.lock().exhausted = true;
            shared.emit(ClientEvent::ReconnectExhausted);
            return;
        };

        info!(
            url = %shared.config.url,
            attempt,
            max = shared.config.reconnect.max_attempts,
            delay = ?delay,
            "relay: reconnect scheduled"
        );
        shared.emit(ClientEvent::ReconnectScheduled { attempt, delay });

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[derive(Debug)]
enum TransportEvent {
    Text(String),
    Error(String),
    Closed(Option<String>),
}

/// One transport instance, from open to close.
async fn run_session(shared: &Arc<Shared>, cancel: &CancellationToken) {
    let connection_id = Uuid::new_v4();
    let role = shared.config.role;
    let url = shared.config.url.as_str();

    let stream = match connect_async(url).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(%connection_id, %url, error = %e, "relay: connect failed");
            shared.emit(ClientEvent::TransportError(e.to_string()));
            shared.set_state(ConnectionState::Disconnected);
            return;
        }
    };

    let (sink, stream) = stream.split();
    *shared.sink.lock().await = Some(sink);
    shared.set_state(ConnectionState::Open);
    shared.emit(ClientEvent::Connected);
    info!(%connection_id, %url, %role, "relay: connected");

    if let Err(e) = shared.write(&handshake::register_envelope(role)).await {
        warn!(%connection_id, error = %e, "relay: register write failed");
    }

    let (tx, mut rx) = mpsc::channel(TRANSPORT_QUEUE_CAPACITY);
    let reader = tokio::spawn(read_transport(stream, tx, cancel.child_token()));

    while let Some(event) = rx.recv().await {
        match event {
            TransportEvent::Text(text) => handle_text(shared, connection_id, &text).await,
            TransportEvent::Error(message) => {
                warn!(%connection_id, error = %message, "relay: transport error");
                shared.emit(ClientEvent::TransportError(message));
            }
            TransportEvent::Closed(reason) => {
                info!(%connection_id, reason = reason.as_deref().unwrap_or(""), "relay: transport closed");
                break;
            }
        }
    }

    reader.abort();
    drop(shared.sink.lock().await.take());
    let abandoned = shared.lock().pending.clear();
    if abandoned {
        warn!(%connection_id, "relay: pending request abandoned by disconnect");
    }
    shared.set_state(ConnectionState::Disconnected);
    shared.emit(ClientEvent::Disconnected);
}

/// Pump websocket messages into the ordered event queue.
async fn read_transport(
    mut stream: SplitStream<WsStream>,
    tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return,
            next = stream.next() => next,
        };

        let event = match next {
            Some(Ok(Message::Text(text))) => TransportEvent::Text(text.to_string()),
            Some(Ok(Message::Binary(bytes))) => {
                warn!(len = bytes.len(), "relay: dropping binary frame");
                continue;
            }
            Some(Ok(Message::Close(frame))) => TransportEvent::Closed(frame.map(|f| f.reason.to_string())),
            Some(Ok(_)) => continue,
            Some(Err(e)) => TransportEvent::Error(e.to_string()),
            None => TransportEvent::Closed(None),
        };

        // Anything but text ends this transport; dropping `tx` ends the session loop.
        let terminal = !matches!(event, TransportEvent::Text(_));
        if tx.send(event).await.is_err() || terminal {
            return;
        }
    }
}

async fn handle_text(shared: &Arc<Shared>, connection_id: Uuid, text: &str) {
    let envelope = match decode_envelope(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(%connection_id, error = %e, "relay: dropping malformed envelope");
            return;
        }
    };
    debug!(%connection_id, kind = %envelope.kind(), "relay: recv envelope");

    match router::route(shared.config.role, envelope) {
        Route::Ack(acked) => on_ack(shared, connection_id, acked),
        Route::ServerError(message) => {
            warn!(%connection_id, %message, "relay: server error");
            shared.emit(ClientEvent::ServerError(message));
        }
        Route::Process(input) => {
            let output = match &shared.processor {
                Some(processor) => processor::run(Arc::clone(processor), input).await,
                None => {
                    warn!(%connection_id, "relay: no processor configured");
                    workload::error_payload(&input, "no processor configured")
                }
            };
            if let Err(e) = shared.send_checked(Envelope::send_to_web(output)).await {
                warn!(%connection_id, error = %e, "relay: failed to return output");
            }
        }
        Route::Output(output) => {
            let (waited, resolved) = {
                let mut inner = shared.lock();
                (inner.pending.age(), inner.pending.resolve(output))
            };
            if let Some(waited) = waited {
                debug!(%connection_id, ?waited, "relay: request resolved");
            }
            if !resolved {
                debug!(%connection_id, "relay: dropping output with no pending request");
                shared.emit(ClientEvent::StrayOutput);
            }
        }
        Route::Drop(reason) => debug!(%connection_id, ?reason, "relay: dropping envelope"),
    }
}

fn on_ack(shared: &Shared, connection_id: Uuid, acked: Role) {
    let role = shared.config.role;
    match handshake::evaluate_ack(role, acked, shared.state()) {
        AckOutcome::Accepted => {
            shared.lock().reconnect.reset();
            shared.set_state(ConnectionState::Registered);
            info!(%connection_id, %role, "relay: registered");
            shared.emit(ClientEvent::Registered(role));
        }
        AckOutcome::RoleMismatch { expected, acked } => {
            warn!(%connection_id, %expected, %acked, "relay: ignoring ack for another role");
        }
        AckOutcome::Ignored(state) => debug!(%connection_id, %state, "relay: ignoring unexpected ack"),
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
