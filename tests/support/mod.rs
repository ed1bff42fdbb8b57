//! In-process relay for integration tests.
//!
//! Mirrors the production relay's routing: one `web` and one `app` slot,
//! `send_to_app` forwarded as `process_input` (or an error when no worker is
//! registered), `send_to_web` forwarded as `receive_output`. Tests can also
//! push raw frames, withhold acknowledgements and drop every connection.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use relay_client::ClientEvent;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

// =============================================================================
// RELAY
// =============================================================================

#[derive(Default)]
struct Slots {
    web: Option<mpsc::UnboundedSender<Message>>,
    app: Option<mpsc::UnboundedSender<Message>>,
}

struct RelayInner {
    slots: Mutex<Slots>,
    received: Mutex<Vec<Value>>,
    accepted: AtomicUsize,
    ack: AtomicBool,
    kick: broadcast::Sender<()>,
}

pub struct TestRelay {
    addr: SocketAddr,
    inner: Arc<RelayInner>,
    accept: JoinHandle<()>,
}

impl TestRelay {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
        let addr = listener.local_addr().expect("relay addr");
        let (kick, _) = broadcast::channel(4);
        let inner = Arc::new(RelayInner {
            slots: Mutex::new(Slots::default()),
            received: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
            ack: AtomicBool::new(true),
            kick,
        });

        let accept_inner = Arc::clone(&inner);
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(Arc::clone(&accept_inner), stream));
            }
        });

        Self { addr, inner, accept }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Stop acknowledging (or resume acknowledging) registrations.
    pub fn set_ack(&self, ack: bool) {
        self.inner.ack.store(ack, Ordering::SeqCst);
    }

    /// Websocket handshakes completed so far.
    pub fn accepted(&self) -> usize {
        self.inner.accepted.load(Ordering::SeqCst)
    }

    /// Every JSON envelope clients sent, in arrival order.
    pub fn received(&self) -> Vec<Value> {
        self.inner.received.lock().expect("received lock").clone()
    }

    pub fn received_of_type(&self, kind: &str) -> Vec<Value> {
        self.received().into_iter().filter(|v| v["type"] == kind).collect()
    }

    /// Poll until at least `count` envelopes of `kind` have arrived.
    pub async fn wait_received(&self, kind: &str, count: usize) -> Vec<Value> {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                let seen = self.received_of_type(kind);
                if seen.len() >= count {
                    return seen;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for relay traffic")
    }

    /// Send a raw text frame to the client registered as `role`.
    pub fn push(&self, role: &str, text: &str) {
        let slots = self.inner.slots.lock().expect("slots lock");
        let slot = if role == "web" { &slots.web } else { &slots.app };
        slot.as_ref()
            .expect("no client registered for role")
            .send(Message::Text(text.to_owned().into()))
            .expect("client connection gone");
    }

    /// Close every open client connection; the listener keeps accepting.
    pub fn kick_all(&self) {
        let _ = self.inner.kick.send(());
    }

    /// Stop accepting and close every open client connection.
    pub fn shutdown(&self) {
        self.accept.abort();
        self.kick_all();
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn serve(inner: Arc<RelayInner>, stream: TcpStream) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    inner.accepted.fetch_add(1, Ordering::SeqCst);

    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let mut kick = inner.kick.subscribe();
    let mut role: Option<&'static str> = None;

    loop {
        tokio::select! {
            out = rx.recv() => {
                let Some(out) = out else { break };
                if sink.send(out).await.is_err() {
                    break;
                }
            }
            _ = kick.recv() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(registered) = handle(&inner, &tx, text.as_str()) {
                        role = Some(registered);
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let mut slots = inner.slots.lock().expect("slots lock");
    let slot = match role {
        Some("web") => &mut slots.web,
        Some(_) => &mut slots.app,
        None => return,
    };
    if slot.as_ref().is_some_and(|s| s.same_channel(&tx)) {
        *slot = None;
    }
}

/// Route one client frame; returns the role if it was a registration.
fn handle(inner: &RelayInner, tx: &mpsc::UnboundedSender<Message>, text: &str) -> Option<&'static str> {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    let reply = |target: &mpsc::UnboundedSender<Message>, body: Value| {
        let _ = target.send(Message::Text(body.to_string().into()));
    };

    let mut slots = inner.slots.lock().expect("slots lock");
    // Recorded after forwarding, so a test that saw the envelope also sees its effect.
    let registered = match value["type"].as_str() {
        Some("register") => {
            let role = if value["client"] == "app" { "app" } else { "web" };
            if role == "app" {
                slots.app = Some(tx.clone());
            } else {
                slots.web = Some(tx.clone());
            }
            if inner.ack.load(Ordering::SeqCst) {
                reply(tx, json!({ "type": "registered", "client": role }));
            }
            Some(role)
        }
        Some("send_to_app") => {
            match &slots.app {
                Some(app) => reply(app, json!({ "type": "process_input", "input": value["input"] })),
                None => reply(tx, json!({ "type": "error", "message": "App未连接" })),
            }
            None
        }
        Some("send_to_web") => {
            if let Some(web) = &slots.web {
                reply(web, json!({ "type": "receive_output", "output": value["output"] }));
            }
            None
        }
        _ => None,
    };
    drop(slots);
    inner.received.lock().expect("received lock").push(value);
    registered
}

// =============================================================================
// EVENTS
// =============================================================================

/// Receive events until one matches `pred`.
pub async fn wait_event<F>(events: &mut broadcast::Receiver<ClientEvent>, mut pred: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for client event")
}

/// Receive events until one matches `pred`, returning everything seen.
pub async fn collect_until<F>(events: &mut broadcast::Receiver<ClientEvent>, mut pred: F) -> Vec<ClientEvent>
where
    F: FnMut(&ClientEvent) -> bool,
{
    let mut seen = Vec::new();
    wait_event(events, |event| {
        seen.push(event.clone());
        pred(event)
    })
    .await;
    seen
}
