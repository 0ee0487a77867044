//! Connection Lifecycle Tests (voxlink-client)
//!
//! All tests run on a paused clock, so retry pauses, the handshake wait,
//! the channel timeout and the reconnect cooldown cost no wall time.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use voxlink_client::{
    ClientError, ConnectionState, MemorySettings, Protocol, ProtocolConfig, VoxlinkBuilder,
    WebsocketProtocol,
};
use voxlink_core::WireVersion;
use voxlink_transport::TransportError;
use voxlink_test_utils::{
    init_tracing, wait_for, ConnectOutcome, EventCollector, MockTransport, DEFAULT_CHECK_INTERVAL,
    DEFAULT_TIMEOUT,
};

const URL: &str = "wss://api.example.com/voice/";

fn protocol(transport: &MockTransport) -> WebsocketProtocol<MockTransport> {
    VoxlinkBuilder::new(URL)
        .build_with(transport.clone())
        .expect("valid config")
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ============================================================================
// Endpoint Policy Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_bad_scheme_fails_without_connecting() {
    init_tracing();
    let transport = MockTransport::with_server_hello();
    let protocol = VoxlinkBuilder::new("http://api.example.com/voice/")
        .build_with(transport.clone())
        .unwrap();
    let events = EventCollector::new();
    events.attach(protocol.events());

    let result = protocol.open_audio_channel().await;

    assert!(matches!(result, Err(ClientError::Config(_))));
    assert_eq!(transport.connect_count(), 0);
    assert_eq!(protocol.connection_state(), ConnectionState::Error);
    assert_eq!(events.errors(), vec!["Server not found".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_start_does_not_connect() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);

    protocol.start().await.unwrap();

    assert_eq!(transport.connect_count(), 0);
    assert_eq!(protocol.connection_state(), ConnectionState::Idle);
    assert!(!protocol.is_audio_channel_opened());
}

#[tokio::test(start_paused = true)]
async fn test_open_from_settings() {
    let settings = MemorySettings::new()
        .with_string("websocket", "url", "ws://settings.example.com/v1/")
        .with_string("websocket", "token", "from-settings")
        .with_int("websocket", "version", 2);
    let transport = MockTransport::with_server_hello();
    let protocol =
        WebsocketProtocol::new(transport.clone(), ProtocolConfig::from_settings(&settings))
            .unwrap();

    protocol.open_audio_channel().await.unwrap();

    let request = transport.last_request().unwrap();
    assert_eq!(request.url, "wss://settings.example.com/v1/");
    assert_eq!(request.header("Authorization"), Some("Bearer from-settings"));
    assert_eq!(request.header("Protocol-Version"), Some("2"));
}

#[tokio::test(start_paused = true)]
async fn test_settings_reread_on_every_open() {
    let settings = Arc::new(
        MemorySettings::new()
            .with_string("websocket", "url", "wss://first.example.com/")
            .with_int("websocket", "version", 2),
    );
    let transport = MockTransport::with_server_hello();
    let protocol = VoxlinkBuilder::new(URL)
        .settings(settings.clone())
        .build_with(transport.clone())
        .unwrap();

    protocol.open_audio_channel().await.unwrap();
    assert_eq!(protocol.wire_version(), WireVersion::V2);

    settings.set_string("websocket", "url", "ws://second.example.com/");
    settings.set_string("websocket", "token", "rotated");
    settings.set_int("websocket", "version", 3);
    protocol.close_audio_channel().await;
    protocol.open_audio_channel().await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].url, "wss://first.example.com/");
    assert_eq!(requests[0].header("Protocol-Version"), Some("2"));
    assert_eq!(requests[0].header("Authorization"), None);
    assert_eq!(requests[1].url, "wss://second.example.com/");
    assert_eq!(requests[1].header("Protocol-Version"), Some("3"));
    assert_eq!(requests[1].header("Authorization"), Some("Bearer rotated"));

    assert_eq!(protocol.wire_version(), WireVersion::V3);
    let hello = &transport.server().unwrap().sent_json()[0];
    assert_eq!(hello["version"], 3);
    // The built configuration itself is untouched
    assert_eq!(protocol.config().url, URL);
}

// ============================================================================
// Retry Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_retries_then_fails() {
    let transport = MockTransport::refusing();
    let protocol = protocol(&transport);
    let events = EventCollector::new();
    events.attach(protocol.events());

    let start = Instant::now();
    let result = protocol.open_audio_channel().await;
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(ClientError::ConnectFailed { attempts: 3 })));
    assert_eq!(transport.connect_count(), 3);
    assert_eq!(protocol.retry_count(), 3);
    assert_eq!(protocol.connection_state(), ConnectionState::Error);
    assert!(protocol.has_error());
    assert_eq!(events.errors(), vec!["Unable to connect to server".to_string()]);
    assert_eq!(events.connected_count(), 0);
    // Two pauses between three attempts
    assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_connect_succeeds_after_retry() {
    let transport = MockTransport::with_server_hello();
    transport.script([ConnectOutcome::Refuse, ConnectOutcome::Reject(503)]);
    let protocol = protocol(&transport);

    protocol.open_audio_channel().await.expect("open failed");

    assert_eq!(transport.connect_count(), 3);
    // Failures stay counted until the next open
    assert_eq!(protocol.retry_count(), 2);
    assert!(protocol.is_audio_channel_opened());
}

#[tokio::test(start_paused = true)]
async fn test_retry_count_resets_on_next_open() {
    let transport = MockTransport::with_server_hello();
    transport.script([ConnectOutcome::Refuse; 3]);
    let protocol = protocol(&transport);

    assert!(protocol.open_audio_channel().await.is_err());
    assert_eq!(protocol.retry_count(), 3);

    protocol.open_audio_channel().await.expect("second open failed");
    assert_eq!(protocol.retry_count(), 0);
    assert!(!protocol.has_error());
    assert_eq!(protocol.connection_state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_custom_attempt_budget() {
    let transport = MockTransport::refusing();
    let protocol = VoxlinkBuilder::new(URL)
        .connect_attempts(5)
        .retry_delay(Duration::from_millis(200))
        .build_with(transport.clone())
        .unwrap();

    let result = protocol.open_audio_channel().await;
    assert!(matches!(result, Err(ClientError::ConnectFailed { attempts: 5 })));
    assert_eq!(transport.connect_count(), 5);
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout() {
    let transport = MockTransport::new();
    let protocol = protocol(&transport);
    let events = EventCollector::new();
    events.attach(protocol.events());

    let start = Instant::now();
    let result = protocol.open_audio_channel().await;

    assert!(matches!(result, Err(ClientError::HandshakeTimeout)));
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(protocol.connection_state(), ConnectionState::Error);
    assert!(!protocol.is_audio_channel_opened());
    assert_eq!(events.errors(), vec!["Server response timed out".to_string()]);
    assert_eq!(events.connected_count(), 1);
    assert_eq!(events.opened_count(), 0);
    assert!(!transport.server().unwrap().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_wrong_transport_hello_ignored() {
    let transport = MockTransport::new();
    transport.reply_to_hello(r#"{"type":"hello","transport":"mqtt","session_id":"x"}"#);
    let protocol = protocol(&transport);

    let result = protocol.open_audio_channel().await;

    assert!(matches!(result, Err(ClientError::HandshakeTimeout)));
    assert_eq!(protocol.session_id(), "");
}

#[tokio::test(start_paused = true)]
async fn test_close_during_handshake() {
    let transport = MockTransport::new();
    let protocol = Arc::new(protocol(&transport));
    let events = EventCollector::new();
    events.attach(protocol.events());

    let opener = {
        let protocol = Arc::clone(&protocol);
        tokio::spawn(async move { protocol.open_audio_channel().await })
    };

    // Wait until the hello is on the wire
    let hello_sent = wait_for(
        || {
            let transport = transport.clone();
            async move {
                transport
                    .server()
                    .map(|s| !s.sent_texts().is_empty())
                    .unwrap_or(false)
            }
        },
        DEFAULT_CHECK_INTERVAL,
        DEFAULT_TIMEOUT,
    )
    .await;
    assert!(hello_sent);
    assert_eq!(protocol.connection_state(), ConnectionState::HandshakeWait);

    protocol.close_audio_channel().await;
    let result = opener.await.unwrap();

    assert!(matches!(result, Err(ClientError::Cancelled)));
    assert_eq!(protocol.connection_state(), ConnectionState::Closed);
    assert_eq!(events.error_count(), 0);
    assert!(!transport.server().unwrap().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_late_hello_after_close_ignored() {
    let transport = MockTransport::new();
    let protocol = Arc::new(protocol(&transport));

    let opener = {
        let protocol = Arc::clone(&protocol);
        tokio::spawn(async move { protocol.open_audio_channel().await })
    };
    assert!(
        wait_for(
            || {
                let transport = transport.clone();
                async move { transport.server_count() == 1 }
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT
        )
        .await
    );

    let server = transport.server().unwrap();
    protocol.close_audio_channel().await;
    server.push_text(r#"{"type":"hello","transport":"websocket","session_id":"late"}"#);
    settle().await;

    assert!(opener.await.unwrap().is_err());
    assert_eq!(protocol.session_id(), "");
}

// ============================================================================
// Close and Disconnect Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let transport = MockTransport::new();
    let protocol = protocol(&transport);

    protocol.close_audio_channel().await;
    protocol.close_audio_channel().await;

    assert_eq!(protocol.connection_state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_close_releases_transport() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);
    let events = EventCollector::new();
    events.attach(protocol.events());
    protocol.open_audio_channel().await.unwrap();

    protocol.close_audio_channel().await;

    assert!(!transport.server().unwrap().is_connected());
    assert!(!protocol.is_audio_channel_opened());
    assert_eq!(protocol.connection_state(), ConnectionState::Closed);
    assert!(matches!(
        protocol.send_text("{}").await,
        Err(ClientError::NotConnected)
    ));
    // Closing on purpose is not reported
    assert_eq!(events.closed_count(), 0);
    assert_eq!(events.disconnected_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_server_disconnect_notifies() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);
    let events = EventCollector::new();
    events.attach(protocol.events());
    protocol.open_audio_channel().await.unwrap();

    transport.server().unwrap().disconnect();

    assert!(events.wait_for_closed(1, DEFAULT_TIMEOUT).await);
    assert_eq!(events.disconnected_count(), 1);
    assert_eq!(protocol.connection_state(), ConnectionState::Closed);
    assert!(!protocol.is_audio_channel_opened());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_handshake_ends_open() {
    let transport = MockTransport::new();
    let protocol = Arc::new(protocol(&transport));
    let events = EventCollector::new();
    events.attach(protocol.events());

    let opener = {
        let protocol = Arc::clone(&protocol);
        tokio::spawn(async move { protocol.open_audio_channel().await })
    };
    assert!(
        wait_for(
            || {
                let transport = transport.clone();
                async move {
                    transport
                        .server()
                        .map(|s| !s.sent_texts().is_empty())
                        .unwrap_or(false)
                }
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT
        )
        .await
    );

    let start = Instant::now();
    transport.server().unwrap().disconnect();
    let result = opener.await.unwrap();

    assert!(matches!(
        result,
        Err(ClientError::Transport(TransportError::ConnectionClosed))
    ));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(protocol.connection_state(), ConnectionState::Closed);
    assert_eq!(events.closed_count(), 1);
    assert_eq!(events.disconnected_count(), 1);
    assert_eq!(events.opened_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_immediate_server_close_always_reported() {
    let transport = MockTransport::dropping();
    let protocol = VoxlinkBuilder::new(URL)
        .handshake_timeout(Duration::from_secs(2))
        .build_with(transport.clone())
        .unwrap();
    let events = EventCollector::new();
    events.attach(protocol.events());

    for round in 1..=20u32 {
        let result = tokio::time::timeout(Duration::from_secs(1), protocol.open_audio_channel())
            .await
            .expect("open hung on a closed connection");
        assert!(result.is_err(), "round {}", round);

        let reported = wait_for(
            || {
                let events = events.clone();
                async move { events.disconnected_count() >= round }
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await;
        assert!(reported, "round {}", round);
        assert_eq!(events.closed_count(), round);
        assert!(!protocol.is_audio_channel_opened());
    }
    assert_eq!(events.opened_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reopen_after_disconnect() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);
    let events = EventCollector::new();
    events.attach(protocol.events());

    protocol.open_audio_channel().await.unwrap();
    transport.server().unwrap().disconnect();
    assert!(events.wait_for_closed(1, DEFAULT_TIMEOUT).await);

    protocol.open_audio_channel().await.expect("reopen failed");

    assert_eq!(transport.server_count(), 2);
    assert_eq!(events.opened_count(), 2);
    assert!(protocol.is_audio_channel_opened());
}

#[tokio::test(start_paused = true)]
async fn test_open_replaces_live_connection() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);
    let events = EventCollector::new();
    events.attach(protocol.events());

    protocol.open_audio_channel().await.unwrap();
    let first = transport.server().unwrap();
    protocol.open_audio_channel().await.unwrap();
    settle().await;

    assert!(!first.is_connected());
    assert!(transport.server().unwrap().is_connected());
    // The replaced connection's dispatcher is gone before it can report
    assert_eq!(events.closed_count(), 0);
}

// ============================================================================
// Channel Timeout Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_channel_timeout() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);
    protocol.open_audio_channel().await.unwrap();

    tokio::time::advance(Duration::from_secs(119)).await;
    assert!(!protocol.is_timeout());
    assert!(protocol.is_audio_channel_opened());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(protocol.is_timeout());
    assert!(!protocol.is_audio_channel_opened());
}

#[tokio::test(start_paused = true)]
async fn test_inbound_audio_refreshes_liveness() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);
    protocol.open_audio_channel().await.unwrap();

    tokio::time::advance(Duration::from_secs(100)).await;
    transport.server().unwrap().push_binary(vec![1u8, 2]);
    settle().await;
    tokio::time::advance(Duration::from_secs(100)).await;

    assert!(!protocol.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_text_refreshes_liveness() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);
    protocol.open_audio_channel().await.unwrap();

    tokio::time::advance(Duration::from_secs(100)).await;
    transport.server().unwrap().push_text("{ definitely not json");
    settle().await;
    tokio::time::advance(Duration::from_secs(100)).await;

    assert!(!protocol.is_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_audio_does_not_refresh_liveness() {
    let transport = MockTransport::with_server_hello();
    let protocol = VoxlinkBuilder::new(URL)
        .version(voxlink_core::WireVersion::V3)
        .build_with(transport.clone())
        .unwrap();
    protocol.open_audio_channel().await.unwrap();

    tokio::time::advance(Duration::from_secs(100)).await;
    // Shorter than the v3 header
    transport.server().unwrap().push_binary(vec![0u8, 0, 0]);
    settle().await;
    tokio::time::advance(Duration::from_secs(100)).await;

    assert!(protocol.is_timeout());
}

// ============================================================================
// Reconnect Cooldown Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_schedule_reconnect_is_idempotent() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);

    assert!(protocol.schedule_reconnect());
    assert!(!protocol.schedule_reconnect());
    assert!(protocol.is_reconnect_scheduled());

    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(!protocol.is_reconnect_scheduled());
    // The cooldown only gates; it never connects
    assert_eq!(transport.connect_count(), 0);
    assert!(protocol.schedule_reconnect());
}

#[tokio::test(start_paused = true)]
async fn test_schedule_reconnect_refused_after_spent_retries() {
    let transport = MockTransport::refusing();
    let protocol = protocol(&transport);

    assert!(protocol.open_audio_channel().await.is_err());

    assert!(!protocol.schedule_reconnect());
    assert!(!protocol.is_reconnect_scheduled());
}

#[tokio::test(start_paused = true)]
async fn test_close_keeps_cooldown_armed() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);

    assert!(protocol.schedule_reconnect());
    protocol.close_audio_channel().await;

    assert!(protocol.is_reconnect_scheduled());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_reconnect() {
    let transport = MockTransport::with_server_hello();
    let protocol = protocol(&transport);

    assert!(protocol.schedule_reconnect());
    protocol.cancel_reconnect();

    assert!(!protocol.is_reconnect_scheduled());
    assert!(protocol.schedule_reconnect());
}
