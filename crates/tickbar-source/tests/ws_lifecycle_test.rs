//! WebSocket source lifecycle integration tests.
//!
//! Tests the connection lifecycle:
//! - Connection establishment and subscription
//! - Event forwarding
//! - Disconnect/reconnect reporting
//! - Shutdown

mod integration;
use integration::common::mock_ws::{MockWsServer, Script};

use std::time::Duration;
use tickbar_core::FeedId;
use tickbar_source::{spawn_source, SourceEvent, StreamKind, WsSource, WsSourceConfig};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn event_frame(symbol: &str, ts: &str, price: &str) -> String {
    serde_json::json!({
        "symbol": symbol,
        "event": {
            "timestamp": ts,
            "open": price,
            "high": price,
            "low": price,
            "close": price,
            "volume": "1",
            "open_interest": "0"
        }
    })
    .to_string()
}

fn config(url: String) -> WsSourceConfig {
    WsSourceConfig {
        url,
        symbol: "ES".to_string(),
        stream: StreamKind::Bars,
        reconnect_base_delay_ms: 20,
        reconnect_max_delay_ms: 100,
        ..Default::default()
    }
}

/// Source connects and sends its subscription.
#[tokio::test]
async fn test_ws_source_subscribes() {
    let server = MockWsServer::start(Script::default()).await;
    let shutdown = CancellationToken::new();
    let source = WsSource::new(config(server.url()));
    let _handle = spawn_source(FeedId::PRIMARY, Box::new(source), 16, shutdown.clone());

    let subscribed = timeout(Duration::from_secs(2), async {
        loop {
            let msgs = server.received_messages().await;
            if let Some(first) = msgs.first() {
                return first.clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("subscription within timeout");

    let parsed: serde_json::Value = serde_json::from_str(&subscribed).unwrap();
    assert_eq!(parsed["method"], "subscribe");
    assert_eq!(parsed["symbol"], "ES");
    assert_eq!(parsed["stream"], "bars");

    shutdown.cancel();
    server.shutdown().await;
}

/// Events for our symbol are forwarded in order; others are dropped.
#[tokio::test]
async fn test_ws_source_forwards_events() {
    let server = MockWsServer::start(Script {
        frames: vec![
            event_frame("ES", "2024-01-02T09:30:00Z", "100"),
            event_frame("NQ", "2024-01-02T09:30:00Z", "999"),
            event_frame("ES", "2024-01-02T09:30:01Z", "101"),
        ],
        close_after: false,
    })
    .await;
    let shutdown = CancellationToken::new();
    let source = WsSource::new(config(server.url()));
    let mut handle = spawn_source(FeedId::PRIMARY, Box::new(source), 16, shutdown.clone());

    let mut closes = Vec::new();
    for _ in 0..2 {
        let item = timeout(Duration::from_secs(2), handle.rx.recv())
            .await
            .expect("event within timeout");
        match item {
            Some(SourceEvent::Event(ev)) => closes.push(ev.close.to_string()),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(closes, vec!["100", "101"]);

    shutdown.cancel();
    server.shutdown().await;
}

/// A server-side close is reported and followed by a reconnect.
#[tokio::test]
async fn test_ws_source_reports_disconnect_and_reconnect() {
    let server = MockWsServer::start(Script {
        frames: vec![event_frame("ES", "2024-01-02T09:30:00Z", "100")],
        close_after: true,
    })
    .await;
    let shutdown = CancellationToken::new();
    let source = WsSource::new(config(server.url()));
    let mut handle = spawn_source(FeedId::PRIMARY, Box::new(source), 16, shutdown.clone());

    let mut seen = Vec::new();
    let result = timeout(Duration::from_secs(3), async {
        while let Some(item) = handle.rx.recv().await {
            let done = matches!(item, SourceEvent::Reconnected);
            seen.push(item);
            if done {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "reconnect within timeout: {seen:?}");

    assert!(matches!(seen[0], SourceEvent::Event(_)));
    assert!(matches!(seen[1], SourceEvent::Disconnected(_)));
    assert_eq!(seen.last(), Some(&SourceEvent::Reconnected));
    assert!(server.connection_count().await >= 2);

    shutdown.cancel();
    server.shutdown().await;
}

/// Cancellation closes the channel.
#[tokio::test]
async fn test_ws_source_stops_on_shutdown() {
    let server = MockWsServer::start(Script::default()).await;
    let shutdown = CancellationToken::new();
    let source = WsSource::new(config(server.url()));
    let mut handle = spawn_source(FeedId::PRIMARY, Box::new(source), 16, shutdown.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let closed = timeout(Duration::from_secs(2), handle.rx.recv()).await;
    assert_eq!(closed.expect("channel closes"), None);

    server.shutdown().await;
}
