//! WebSocket transport implementation

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{HeaderName, HeaderValue},
        protocol::Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{
    ConnectRequest, Transport, TransportEvent, TransportReceiver, TransportSender,
};

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Queue depth for outbound messages and inbound events
    pub channel_capacity: usize,
    /// Upper bound on the TCP + TLS + upgrade exchange
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket transport
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WebSocketConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, data: Bytes, binary: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let msg = if binary {
            WsMessage::Binary(data.to_vec())
        } else {
            let text = String::from_utf8(data.to_vec())
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            WsMessage::Text(text)
        };

        self.tx
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

fn build_request(
    request: &ConnectRequest,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut http_request = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

    for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(format!("name '{}'", name)))?;
        // Never echo the value, it may be a credential
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(format!("value for '{}'", name)))?;
        http_request.headers_mut().insert(name, value);
    }

    Ok(http_request)
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(&self, request: &ConnectRequest) -> Result<(Self::Sender, Self::Receiver)> {
        let parsed =
            url::Url::parse(&request.url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        // Path and query may carry credentials, log the host only
        info!(
            "Connecting to WebSocket host {}",
            parsed.host_str().unwrap_or("<none>")
        );

        let http_request = build_request(request)?;

        let (ws_stream, response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(http_request))
                .await
                .map_err(|_| TransportError::Timeout)??;

        debug!("WebSocket connected, response: {:?}", response.status());

        // Split the WebSocket stream
        let (write, read) = ws_stream.split();

        // Create channels
        let capacity = self.config.channel_capacity;
        let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(capacity);
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(capacity);

        let connected = Arc::new(Mutex::new(true));
        let connected_write = connected.clone();
        let connected_read = connected.clone();

        // Spawn writer task
        tokio::spawn(async move {
            let mut write = write;
            while let Some(msg) = send_rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = write.send(msg).await {
                    error!("WebSocket write error: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            *connected_write.lock() = false;
        });

        // Spawn reader task
        tokio::spawn(async move {
            let mut read = read;

            let _ = event_tx.send(TransportEvent::Connected).await;

            let mut reason = None;
            while let Some(result) = read.next().await {
                match result {
                    Ok(WsMessage::Binary(data)) => {
                        let _ = event_tx.send(TransportEvent::Binary(Bytes::from(data))).await;
                    }
                    Ok(WsMessage::Text(text)) => {
                        let _ = event_tx.send(TransportEvent::Text(text)).await;
                    }
                    Ok(WsMessage::Ping(_)) => {
                        // Pong is handled automatically by tungstenite
                        debug!("Received ping");
                    }
                    Ok(WsMessage::Pong(_)) => {
                        debug!("Received pong");
                    }
                    Ok(WsMessage::Close(frame)) => {
                        reason = frame.map(|f| f.reason.to_string());
                        info!("WebSocket closed: {:?}", reason);
                        break;
                    }
                    Ok(WsMessage::Frame(_)) => {
                        // Raw frame, ignore
                    }
                    Err(e) => {
                        warn!("WebSocket read error: {}", e);
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        reason = Some(e.to_string());
                        break;
                    }
                }
            }

            *connected_read.lock() = false;
            let _ = event_tx.send(TransportEvent::Disconnected { reason }).await;
        });

        let sender = WebSocketSender {
            tx: send_tx,
            connected,
        };

        let receiver = WebSocketReceiver { rx: event_rx };

        Ok((sender, receiver))
    }
}
