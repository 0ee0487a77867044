//! Common test helpers and utilities for Voxlink tests
//!
//! This crate provides:
//! - A scripted in-memory transport with a server-side handle
//! - Condition-based waiting (no hardcoded sleeps)
//! - Event collectors for protocol observers
//!
//! Waiting uses the tokio clock, so the helpers also work under
//! `#[tokio::test(start_paused = true)]`.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use voxlink_client::EventHandlers;
use voxlink_core::AudioStreamPacket;
use voxlink_transport::{
    ConnectRequest, Result as TransportResult, Transport, TransportError, TransportEvent,
    TransportReceiver, TransportSender,
};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// A server hello accepted by the client with default parameters
pub const SERVER_HELLO: &str = r#"{"type":"hello","transport":"websocket","session_id":"abc123","audio_params":{"sample_rate":24000,"frame_duration":60}}"#;

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    check().await
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || async { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

// ============================================================================
// Mock Transport - scripted connects and a server-side handle
// ============================================================================

/// How the next connect attempt ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Accept,
    /// Nothing listening
    Refuse,
    /// Upgrade answered with this HTTP status
    Reject(u16),
    /// Accepted, but the server closes before reading anything. The close
    /// is already queued when connect returns.
    AcceptThenDrop,
}

/// A message the client sent to the mock server
#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    Binary(Bytes),
    Text(String),
}

struct MockState {
    script: VecDeque<ConnectOutcome>,
    default_outcome: ConnectOutcome,
    requests: Vec<ConnectRequest>,
    servers: Vec<MockServer>,
    hello_reply: Option<String>,
}

/// In-memory transport. Clones share state, so a test keeps one clone and
/// hands another to the protocol.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    fail_sends: Arc<AtomicBool>,
}

impl MockTransport {
    /// Accepts every connect; the server never answers the hello
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                default_outcome: ConnectOutcome::Accept,
                requests: Vec::new(),
                servers: Vec::new(),
                hello_reply: None,
            })),
            fail_sends: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Accepts every connect and answers the client hello with [`SERVER_HELLO`]
    pub fn with_server_hello() -> Self {
        let transport = Self::new();
        transport.reply_to_hello(SERVER_HELLO);
        transport
    }

    /// Refuses every connect
    pub fn refusing() -> Self {
        let transport = Self::new();
        transport.state.lock().default_outcome = ConnectOutcome::Refuse;
        transport
    }

    /// Every connection is closed by the server right away
    pub fn dropping() -> Self {
        let transport = Self::new();
        transport.state.lock().default_outcome = ConnectOutcome::AcceptThenDrop;
        transport
    }

    /// Queue outcomes for the next connects; afterwards the default applies
    pub fn script(&self, outcomes: impl IntoIterator<Item = ConnectOutcome>) {
        self.state.lock().script.extend(outcomes);
    }

    /// Answer every client hello with this text
    pub fn reply_to_hello(&self, reply: impl Into<String>) {
        self.state.lock().hello_reply = Some(reply.into());
    }

    /// Make every send fail, on live and future connections
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Connect attempts seen so far, successful or not
    pub fn connect_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.state.lock().requests.clone()
    }

    pub fn last_request(&self) -> Option<ConnectRequest> {
        self.state.lock().requests.last().cloned()
    }

    /// Server side of the most recent accepted connection
    pub fn server(&self) -> Option<MockServer> {
        self.state.lock().servers.last().cloned()
    }

    pub fn server_count(&self) -> usize {
        self.state.lock().servers.len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Sender = MockSender;
    type Receiver = MockReceiver;

    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> TransportResult<(Self::Sender, Self::Receiver)> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());

        let outcome = state.script.pop_front().unwrap_or(state.default_outcome);
        match outcome {
            ConnectOutcome::Refuse => {
                return Err(TransportError::ConnectionFailed("connection refused".into()))
            }
            ConnectOutcome::Reject(status) => return Err(TransportError::Rejected(status)),
            ConnectOutcome::Accept | ConnectOutcome::AcceptThenDrop => {}
        }

        let (events, rx) = mpsc::unbounded_channel();
        let _ = events.send(TransportEvent::Connected);
        if outcome == ConnectOutcome::AcceptThenDrop {
            let _ = events.send(TransportEvent::Disconnected {
                reason: Some("server closed".to_string()),
            });
        }

        let server = MockServer {
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
        };
        state.servers.push(server.clone());

        let sender = MockSender {
            server,
            hello_reply: state.hello_reply.clone(),
            fail_sends: Arc::clone(&self.fail_sends),
        };
        Ok((sender, MockReceiver { rx }))
    }
}

/// Server-side handle of one mock connection
#[derive(Clone)]
pub struct MockServer {
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    connected: Arc<AtomicBool>,
}

impl MockServer {
    pub fn push_binary(&self, data: impl Into<Bytes>) {
        let _ = self.events.send(TransportEvent::Binary(data.into()));
    }

    pub fn push_text(&self, text: &str) {
        let _ = self.events.send(TransportEvent::Text(text.to_string()));
    }

    /// Drop the connection from the server side
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Disconnected {
            reason: Some("server closed".to_string()),
        });
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                SentMessage::Text(t) => Some(t.clone()),
                SentMessage::Binary(_) => None,
            })
            .collect()
    }

    /// Sent text messages parsed as JSON; unparsable ones are skipped
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent_texts()
            .iter()
            .filter_map(|t| serde_json::from_str(t).ok())
            .collect()
    }

    pub fn sent_binaries(&self) -> Vec<Bytes> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                SentMessage::Binary(b) => Some(b.clone()),
                SentMessage::Text(_) => None,
            })
            .collect()
    }
}

pub struct MockSender {
    server: MockServer,
    hello_reply: Option<String>,
    fail_sends: Arc<AtomicBool>,
}

fn is_client_hello(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(Value::as_str).map(|t| t == "hello"))
        .unwrap_or(false)
}

#[async_trait]
impl TransportSender for MockSender {
    async fn send(&self, data: Bytes, binary: bool) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("injected failure".into()));
        }

        if binary {
            self.server.sent.lock().push(SentMessage::Binary(data));
            return Ok(());
        }

        let text = String::from_utf8(data.to_vec())
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let reply = match &self.hello_reply {
            Some(reply) if is_client_hello(&text) => Some(reply.clone()),
            _ => None,
        };
        self.server.sent.lock().push(SentMessage::Text(text));
        if let Some(reply) = reply {
            self.server.push_text(&reply);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.server.is_connected()
    }

    async fn close(&self) -> TransportResult<()> {
        self.server.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for MockReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

// ============================================================================
// Event Collector - records every protocol observer call
// ============================================================================

#[derive(Default)]
struct Collected {
    json: Vec<Value>,
    audio: Vec<AudioStreamPacket>,
    errors: Vec<String>,
}

/// Records observer calls with thread-safe access
#[derive(Clone, Default)]
pub struct EventCollector {
    collected: Arc<Mutex<Collected>>,
    json_count: Arc<AtomicU32>,
    audio_count: Arc<AtomicU32>,
    error_count: Arc<AtomicU32>,
    opened: Arc<AtomicU32>,
    closed: Arc<AtomicU32>,
    connected: Arc<AtomicU32>,
    disconnected: Arc<AtomicU32>,
}

fn counter_handler(counter: &Arc<AtomicU32>) -> impl Fn() + Send + Sync {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register on every observer slot, replacing existing handlers
    pub fn attach(&self, events: &EventHandlers) {
        let this = self.clone();
        events.on_incoming_json(move |value| {
            this.collected.lock().json.push(value.clone());
            this.json_count.fetch_add(1, Ordering::SeqCst);
        });

        let this = self.clone();
        events.on_incoming_audio(move |packet| {
            this.collected.lock().audio.push(packet);
            this.audio_count.fetch_add(1, Ordering::SeqCst);
        });

        let this = self.clone();
        events.on_network_error(move |message| {
            this.collected.lock().errors.push(message.to_string());
            this.error_count.fetch_add(1, Ordering::SeqCst);
        });

        events.on_audio_channel_opened(counter_handler(&self.opened));
        events.on_audio_channel_closed(counter_handler(&self.closed));
        events.on_connected(counter_handler(&self.connected));
        events.on_disconnected(counter_handler(&self.disconnected));
    }

    pub fn json(&self) -> Vec<Value> {
        self.collected.lock().json.clone()
    }

    pub fn audio(&self) -> Vec<AudioStreamPacket> {
        self.collected.lock().audio.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.collected.lock().errors.clone()
    }

    pub fn json_count(&self) -> u32 {
        self.json_count.load(Ordering::SeqCst)
    }

    pub fn audio_count(&self) -> u32 {
        self.audio_count.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub fn opened_count(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn connected_count(&self) -> u32 {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn disconnected_count(&self) -> u32 {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub async fn wait_for_json(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.json_count, n, max_wait).await
    }

    pub async fn wait_for_audio(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.audio_count, n, max_wait).await
    }

    pub async fn wait_for_closed(&self, n: u32, max_wait: Duration) -> bool {
        wait_for_count(&self.closed, n, max_wait).await
    }
}
