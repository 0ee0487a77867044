//! WebSocket protocol
//!
//! Connection lifecycle:
//!
//! ```text
//! Idle -> Connecting -> HandshakeWait -> Open -> Closed
//!            |               |            |
//!            +-------------> Error <------+
//! ```
//!
//! Every open attempt gets a fresh epoch. The dispatcher task, the pending
//! handshake signal and the installed connection all carry the epoch they
//! were created for, and anything from an older epoch is ignored. Closing
//! bumps the epoch, which is how an in-flight open learns it was cancelled.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use voxlink_core::{
    authorization_value, decode_frame, encode_frame, normalize_endpoint, AudioStreamPacket,
    ClientHello, ServerHello, WireVersion, TRANSPORT_NAME,
};
use voxlink_transport::{
    ConnectRequest, Transport, TransportError, TransportEvent, TransportReceiver,
    TransportSender, WebSocketTransport,
};

use crate::builder::VoxlinkBuilder;
use crate::config::{ProtocolConfig, SettingsStore};
use crate::cooldown::ReconnectCooldown;
use crate::error::{ClientError, NetworkErrorKind, Result};
use crate::events::EventHandlers;
use crate::protocol::Protocol;
use crate::session::ProtocolSession;

/// Malformed inbound text is logged up to this many characters
const LOG_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    HandshakeWait,
    Open,
    Closed,
    Error,
}

struct Connection<S> {
    epoch: u64,
    sender: Arc<S>,
    dispatcher: JoinHandle<()>,
}

struct HandshakeWaiter {
    epoch: u64,
    done: oneshot::Sender<()>,
}

/// State reachable from both the protocol handle and the dispatcher task
struct Shared<S> {
    session: Mutex<ProtocolSession>,
    events: EventHandlers,
    state: Mutex<ConnectionState>,
    connection: Mutex<Option<Connection<S>>>,
    handshake: Mutex<Option<HandshakeWaiter>>,
    epoch: AtomicU64,
    channel_timeout: Duration,
}

impl<S: TransportSender + 'static> Shared<S> {
    fn new(wire_version: WireVersion, channel_timeout: Duration) -> Self {
        Self {
            session: Mutex::new(ProtocolSession::new(wire_version)),
            events: EventHandlers::new(),
            state: Mutex::new(ConnectionState::Idle),
            connection: Mutex::new(None),
            handshake: Mutex::new(None),
            epoch: AtomicU64::new(0),
            channel_timeout,
        }
    }

    fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!("Connection state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Transition only while `epoch` is still the live attempt
    fn set_state_for(&self, epoch: u64, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if !self.is_current(epoch) {
            return false;
        }
        if *state != next {
            debug!("Connection state {:?} -> {:?}", *state, next);
            *state = next;
        }
        true
    }

    fn sender(&self) -> Option<Arc<S>> {
        self.connection
            .lock()
            .as_ref()
            .map(|c| Arc::clone(&c.sender))
    }

    /// Store a new connection unless a close already superseded it.
    ///
    /// The dispatcher is started with the slot locked, so its first event
    /// already sees the connection installed.
    fn install<F>(&self, epoch: u64, sender: Arc<S>, start: F) -> bool
    where
        F: FnOnce() -> JoinHandle<()>,
    {
        let mut slot = self.connection.lock();
        if !self.is_current(epoch) {
            return false;
        }
        *slot = Some(Connection {
            epoch,
            sender,
            dispatcher: start(),
        });
        true
    }

    fn take_connection(&self) -> Option<Connection<S>> {
        self.connection.lock().take()
    }

    fn take_connection_for(&self, epoch: u64) -> Option<Connection<S>> {
        let mut slot = self.connection.lock();
        match slot.as_ref() {
            Some(c) if c.epoch == epoch => slot.take(),
            _ => None,
        }
    }

    fn arm_handshake(&self, epoch: u64) -> oneshot::Receiver<()> {
        let (done, waiter) = oneshot::channel();
        *self.handshake.lock() = Some(HandshakeWaiter { epoch, done });
        waiter
    }

    fn complete_handshake(&self, epoch: u64) {
        let mut slot = self.handshake.lock();
        if slot.as_ref().map(|w| w.epoch) != Some(epoch) {
            return;
        }
        if let Some(waiter) = slot.take() {
            let _ = waiter.done.send(());
        }
    }

    /// Dropping the waiter wakes the opener with a cancellation
    fn cancel_handshake(&self) {
        self.handshake.lock().take();
    }

    fn cancel_handshake_for(&self, epoch: u64) {
        let mut slot = self.handshake.lock();
        if slot.as_ref().map(|w| w.epoch) == Some(epoch) {
            slot.take();
        }
    }

    fn set_error(&self, message: &str) {
        self.session.lock().error = true;
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Closed {
                *state = ConnectionState::Error;
            }
        }
        warn!("Network error: {}", message);
        self.events.emit_network_error(message);
    }

    /// Fail the open attempt `epoch`, unless it was already superseded
    fn fail(&self, epoch: u64, kind: NetworkErrorKind) {
        if self.set_state_for(epoch, ConnectionState::Error) {
            self.set_error(&kind.to_string());
        }
    }

    fn handle_binary(&self, data: Bytes, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }
        let (version, sample_rate, frame_duration) = {
            let session = self.session.lock();
            (
                session.wire_version,
                session.params.sample_rate,
                session.params.frame_duration,
            )
        };

        match decode_frame(data, version, sample_rate, frame_duration) {
            Ok(packet) => {
                self.session.lock().touch();
                self.events.emit_incoming_audio(packet);
            }
            Err(e) => warn!("Dropping inbound audio frame: {}", e),
        }
    }

    fn handle_text(&self, text: &str, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }
        // Any text counts as liveness, even if it does not parse
        self.session.lock().touch();

        let root: Value = match serde_json::from_str(text) {
            Ok(root) => root,
            Err(e) => {
                error!("Invalid JSON message ({}): {}", e, preview(text));
                return;
            }
        };

        match root.get("type").and_then(Value::as_str) {
            Some("hello") => self.handle_server_hello(&root, epoch),
            Some(_) => self.events.emit_incoming_json(&root),
            None => error!("Message type is missing: {}", preview(text)),
        }
    }

    fn handle_server_hello(&self, root: &Value, epoch: u64) {
        match ServerHello::parse(root, TRANSPORT_NAME) {
            Ok(hello) => {
                {
                    let mut session = self.session.lock();
                    if !self.is_current(epoch) {
                        return;
                    }
                    session.params.apply(&hello);
                }
                self.complete_handshake(epoch);
            }
            Err(e) => warn!("Ignoring server hello: {}", e),
        }
    }

    fn handle_disconnect(&self, epoch: u64) {
        // Only the live connection reports; a released one was closed on purpose
        if self.take_connection_for(epoch).is_none() {
            return;
        }
        self.set_state(ConnectionState::Closed);
        info!("Websocket disconnected");
        self.events.emit_audio_channel_closed();
        self.events.emit_disconnected();
        // Wakes an open still waiting for the server hello
        self.cancel_handshake_for(epoch);
    }
}

fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}

async fn shutdown<S: TransportSender>(connection: Connection<S>) {
    connection.dispatcher.abort();
    if let Err(e) = connection.sender.close().await {
        debug!("Transport close: {}", e);
    }
}

async fn run_dispatcher<S, R>(shared: Arc<Shared<S>>, mut receiver: R, epoch: u64)
where
    S: TransportSender + 'static,
    R: TransportReceiver,
{
    while let Some(event) = receiver.recv().await {
        match event {
            TransportEvent::Connected => debug!("Transport connected"),
            TransportEvent::Binary(data) => shared.handle_binary(data, epoch),
            TransportEvent::Text(text) => shared.handle_text(&text, epoch),
            TransportEvent::Error(e) => warn!("Transport error: {}", e),
            TransportEvent::Disconnected { reason } => {
                debug!("Transport disconnected: {:?}", reason);
                break;
            }
        }
    }
    shared.handle_disconnect(epoch);
}

/// Protocol client over a message transport
pub struct WebsocketProtocol<T: Transport> {
    transport: T,
    config: ProtocolConfig,
    settings: Option<Arc<dyn SettingsStore>>,
    shared: Arc<Shared<T::Sender>>,
    cooldown: ReconnectCooldown,
    opening: tokio::sync::Mutex<()>,
}

impl<T: Transport> WebsocketProtocol<T> {
    /// Create a protocol instance. Nothing connects until the channel is opened.
    pub fn new(transport: T, config: ProtocolConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared::new(config.wire_version(), config.channel_timeout()));
        let cooldown = ReconnectCooldown::new(config.connect_attempts, config.reconnect_interval());

        Ok(Self {
            transport,
            config,
            settings: None,
            shared,
            cooldown,
            opening: tokio::sync::Mutex::new(()),
        })
    }

    /// Re-read `url`, `token` and `version` from this store at every open
    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Configuration for the next open, with the settings store applied
    fn current_config(&self) -> ProtocolConfig {
        let mut config = self.config.clone();
        if let Some(settings) = &self.settings {
            config.reload_settings(settings.as_ref());
        }
        config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Wire version used for audio frames
    pub fn wire_version(&self) -> WireVersion {
        self.shared.session.lock().wire_version
    }

    pub fn has_error(&self) -> bool {
        self.shared.session.lock().error
    }

    /// Snapshot of the session state
    pub fn session(&self) -> ProtocolSession {
        self.shared.session.lock().clone()
    }

    /// Failed connect attempts of the current open
    pub fn retry_count(&self) -> u32 {
        self.cooldown.retry_count()
    }

    /// Arm the reconnect cooldown. Returns whether a new timer started.
    ///
    /// The cooldown never reconnects by itself.
    pub fn schedule_reconnect(&self) -> bool {
        self.cooldown.schedule()
    }

    pub fn is_reconnect_scheduled(&self) -> bool {
        self.cooldown.is_armed()
    }

    /// Disarm the cooldown and stop its timer
    pub fn cancel_reconnect(&self) {
        self.cooldown.cancel();
    }

    fn connect_request(config: &ProtocolConfig, url: &str) -> ConnectRequest {
        let mut request = ConnectRequest::new(url);
        if let Some(value) = config.token.as_deref().and_then(authorization_value) {
            request.set_header("Authorization", value);
        }
        request.set_header(
            "Protocol-Version",
            config.wire_version().as_u16().to_string(),
        );
        request.set_header("Device-Id", &config.device_id);
        request.set_header("Client-Id", &config.client_id);
        request
    }

    fn client_hello(config: &ProtocolConfig) -> ClientHello {
        ClientHello::new(
            config.wire_version(),
            config.features,
            TRANSPORT_NAME,
            config.audio.clone(),
        )
    }

    async fn connect_with_retry(
        &self,
        config: &ProtocolConfig,
        url: &str,
        epoch: u64,
    ) -> Result<(T::Sender, T::Receiver)> {
        let request = Self::connect_request(config, url);
        let max = self.cooldown.max_retries();

        loop {
            if !self.shared.set_state_for(epoch, ConnectionState::Connecting) {
                return Err(ClientError::Cancelled);
            }

            match self.transport.connect(&request).await {
                Ok(pair) => {
                    info!("Connected to server");
                    return Ok(pair);
                }
                Err(e) => {
                    let attempts = self.cooldown.record_failure();
                    error!(
                        "Failed to connect to server, code={} ({}/{})",
                        e.code(),
                        attempts,
                        max
                    );
                    if attempts >= max {
                        self.shared.fail(epoch, NetworkErrorKind::ServerNotConnected);
                        return Err(ClientError::ConnectFailed { attempts });
                    }
                    tokio::time::sleep(config.retry_delay()).await;
                }
            }
        }
    }

    async fn release(&self, epoch: u64) {
        if let Some(connection) = self.shared.take_connection_for(epoch) {
            shutdown(connection).await;
        }
    }
}

impl WebsocketProtocol<WebSocketTransport> {
    pub fn builder(url: &str) -> VoxlinkBuilder {
        VoxlinkBuilder::new(url)
    }
}

#[async_trait]
impl<T: Transport> Protocol for WebsocketProtocol<T> {
    async fn start(&self) -> Result<()> {
        debug!("Websocket protocol ready");
        Ok(())
    }

    async fn open_audio_channel(&self) -> Result<()> {
        let _opening = self.opening.lock().await;

        let epoch = self.shared.next_epoch();
        self.shared.cancel_handshake();
        if let Some(previous) = self.shared.take_connection() {
            shutdown(previous).await;
        }

        let config = self.current_config();
        {
            let mut session = self.shared.session.lock();
            session.error = false;
            session.wire_version = config.wire_version();
        }
        self.cooldown.reset_retries();

        let url = match normalize_endpoint(&config.url) {
            Ok(url) => url,
            Err(e) => {
                error!("Rejected endpoint: {}", e);
                self.shared.fail(epoch, NetworkErrorKind::ServerNotFound);
                return Err(ClientError::Config(e.to_string()));
            }
        };
        let hello = Self::client_hello(&config).to_json()?;

        let (sender, receiver) = self.connect_with_retry(&config, &url, epoch).await?;
        self.shared.events.emit_connected();
        if !self.shared.set_state_for(epoch, ConnectionState::HandshakeWait) {
            let _ = sender.close().await;
            return Err(ClientError::Cancelled);
        }

        let handshake = self.shared.arm_handshake(epoch);
        let sender = Arc::new(sender);
        let shared = Arc::clone(&self.shared);
        let installed = self.shared.install(epoch, Arc::clone(&sender), move || {
            tokio::spawn(run_dispatcher(shared, receiver, epoch))
        });
        if !installed {
            let _ = sender.close().await;
            return Err(ClientError::Cancelled);
        }

        if let Err(e) = self.send_text(&hello).await {
            self.shared.cancel_handshake();
            self.release(epoch).await;
            return Err(e);
        }

        match tokio::time::timeout(config.handshake_timeout(), handshake).await {
            Ok(Ok(())) if self.shared.is_current(epoch) => {}
            Ok(Err(_)) if self.shared.is_current(epoch) => {
                info!("Server closed the connection before its hello");
                return Err(ClientError::Transport(TransportError::ConnectionClosed));
            }
            Ok(_) => {
                info!("Audio channel open cancelled");
                return Err(ClientError::Cancelled);
            }
            Err(_) => {
                error!("Failed to receive server hello");
                self.shared.cancel_handshake();
                self.release(epoch).await;
                self.shared.fail(epoch, NetworkErrorKind::ServerTimeout);
                return Err(ClientError::HandshakeTimeout);
            }
        }

        if !self.shared.set_state_for(epoch, ConnectionState::Open) {
            return Err(ClientError::Cancelled);
        }
        info!("Audio channel opened, session {}", self.session_id());
        self.shared.events.emit_audio_channel_opened();
        Ok(())
    }

    async fn close_audio_channel(&self) {
        self.shared.next_epoch();
        self.shared.cancel_handshake();
        if let Some(connection) = self.shared.take_connection() {
            shutdown(connection).await;
            info!("Audio channel closed");
        }
        self.shared.set_state(ConnectionState::Closed);
    }

    fn is_audio_channel_opened(&self) -> bool {
        let Some(sender) = self.shared.sender() else {
            return false;
        };
        sender.is_connected() && !self.has_error() && !self.is_timeout()
    }

    async fn send_audio(&self, packet: AudioStreamPacket) -> Result<()> {
        let sender = self.shared.sender().ok_or(ClientError::NotConnected)?;
        if !sender.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let frame = encode_frame(&packet, self.wire_version())?;
        sender.send(frame, true).await.map_err(|e| {
            warn!("Failed to send audio frame: {}", e);
            ClientError::SendFailed(e.to_string())
        })
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        let sender = self.shared.sender().ok_or(ClientError::NotConnected)?;

        if let Err(e) = sender
            .send(Bytes::copy_from_slice(text.as_bytes()), false)
            .await
        {
            // Bodies may carry user content, log the size only
            error!("Failed to send text ({} bytes): {}", text.len(), e);
            self.shared
                .set_error(&NetworkErrorKind::ServerError.to_string());
            return Err(ClientError::SendFailed(e.to_string()));
        }
        Ok(())
    }

    fn session_id(&self) -> String {
        self.shared.session.lock().params.session_id.clone()
    }

    fn server_sample_rate(&self) -> u32 {
        self.shared.session.lock().params.sample_rate
    }

    fn server_frame_duration(&self) -> u32 {
        self.shared.session.lock().params.frame_duration
    }

    fn is_timeout(&self) -> bool {
        let session = self.shared.session.lock();
        let timed_out = session.is_timed_out(self.shared.channel_timeout);
        if timed_out {
            warn!(
                "Channel timeout, no data for {}s",
                session.idle_for().as_secs()
            );
        }
        timed_out
    }

    fn set_error(&self, message: &str) {
        self.shared.set_error(message);
    }

    fn events(&self) -> &EventHandlers {
        &self.shared.events
    }
}

impl<T: Transport> Drop for WebsocketProtocol<T> {
    fn drop(&mut self) {
        self.shared.next_epoch();
        if let Some(connection) = self.shared.take_connection() {
            connection.dispatcher.abort();
        }
    }
}
