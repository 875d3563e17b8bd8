//! Live WebSocket source.
//!
//! Handles the connection lifecycle for one symbol: connect, subscribe,
//! forward RawEvents, and reconnect with exponential backoff. Every drop is
//! reported downstream as `Disconnected` and every recovery as
//! `Reconnected`, so the feed can be marked stalled in between.
//!
//! Wire format (JSON text frames):
//! - out: `{"method":"subscribe","symbol":"ES","stream":"ticks"}`
//! - in:  `{"symbol":"ES","event":{RawEvent}}`; anything else is ignored

use crate::error::{SourceError, SourceResult};
use crate::event::{forward, BoxFuture, EventSource, SourceEvent};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tickbar_core::RawEvent;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Which stream to subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Individual trade ticks.
    #[default]
    Ticks,
    /// Small real-time bars pushed by the server.
    Bars,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct WsSourceConfig {
    /// WebSocket URL.
    pub url: String,
    /// Instrument to subscribe to.
    pub symbol: String,
    pub stream: StreamKind,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
}

impl Default for WsSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            symbol: String::new(),
            stream: StreamKind::Ticks,
            max_reconnect_attempts: 0, // Infinite
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    method: &'static str,
    symbol: &'a str,
    stream: StreamKind,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    symbol: String,
    event: RawEvent,
}

/// Why a single connection ended.
enum SessionEnd {
    Shutdown,
    ConsumerGone,
    Dropped(SourceError),
}

/// Live source over one WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsSource {
    config: WsSourceConfig,
    state: Arc<RwLock<ConnectionState>>,
    reconnect_count: Arc<RwLock<u32>>,
}

impl WsSource {
    pub fn new(config: WsSourceConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            reconnect_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Shared view of the connection state.
    pub fn state_handle(&self) -> Arc<RwLock<ConnectionState>> {
        self.state.clone()
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Consecutive failed attempts since the last successful connect.
    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    async fn connect_with_retry(
        &self,
        tx: &mpsc::Sender<SourceEvent>,
        shutdown: &CancellationToken,
    ) -> SourceResult<()> {
        let mut attempt = 0u32;
        let mut connected_before = false;

        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, exiting connect loop");
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            *self.state.write() = ConnectionState::Connecting;

            let end = self
                .session(tx, shutdown, &mut connected_before, &mut attempt)
                .await;
            let reason = match end {
                SessionEnd::Shutdown | SessionEnd::ConsumerGone => {
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
                SessionEnd::Dropped(e) => {
                    error!(symbol = %self.config.symbol, ?e, "WebSocket connection error");
                    e
                }
            };

            // TransportFailure: the feed stalls until the next Reconnected.
            if !forward(tx, shutdown, SourceEvent::Disconnected(reason.to_string())).await {
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                *self.state.write() = ConnectionState::Disconnected;
                return Err(SourceError::TransportFailure(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            *self.state.write() = ConnectionState::Reconnecting;

            let delay = self.calculate_backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis(), "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shutdown.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
            }
        }
    }

    async fn session(
        &self,
        tx: &mpsc::Sender<SourceEvent>,
        shutdown: &CancellationToken,
        connected_before: &mut bool,
        attempt: &mut u32,
    ) -> SessionEnd {
        info!(url = %self.config.url, symbol = %self.config.symbol, "Connecting to WebSocket");

        let connect = tokio::select! {
            () = shutdown.cancelled() => return SessionEnd::Shutdown,
            res = connect_async(self.config.url.as_str()) => res,
        };
        let (ws_stream, _response) = match connect {
            Ok(ok) => ok,
            Err(e) => return SessionEnd::Dropped(e.into()),
        };
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        *self.reconnect_count.write() = 0;
        *attempt = 0;
        info!("WebSocket connected");

        let request = SubscribeRequest {
            method: "subscribe",
            symbol: &self.config.symbol,
            stream: self.config.stream,
        };
        let subscribe = match serde_json::to_string(&request) {
            Ok(text) => text,
            Err(e) => return SessionEnd::Dropped(e.into()),
        };
        if let Err(e) = write.send(Message::Text(subscribe)).await {
            return SessionEnd::Dropped(e.into());
        }
        debug!(symbol = %self.config.symbol, stream = ?self.config.stream, "Subscription sent");

        if *connected_before && !forward(tx, shutdown, SourceEvent::Reconnected).await {
            return SessionEnd::ConsumerGone;
        }
        *connected_before = true;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return SessionEnd::Shutdown;
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = self.parse_text(&text) {
                                if !forward(tx, shutdown, SourceEvent::Event(event)).await {
                                    return SessionEnd::ConsumerGone;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return SessionEnd::Dropped(e.into());
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            let closed = SourceError::ConnectionClosed { code, reason };
                            return SessionEnd::Dropped(closed);
                        }
                        Some(Err(e)) => {
                            error!(?e, "WebSocket read error");
                            return SessionEnd::Dropped(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return SessionEnd::Dropped(SourceError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Extract an event for our symbol; acks and foreign symbols are skipped.
    fn parse_text(&self, text: &str) -> Option<RawEvent> {
        match serde_json::from_str::<EventMessage>(text) {
            Ok(msg) if msg.symbol == self.config.symbol => Some(msg.event),
            Ok(msg) => {
                debug!(symbol = %msg.symbol, "Ignoring event for other symbol");
                None
            }
            Err(_) => {
                debug!(%text, "Ignoring non-event message");
                None
            }
        }
    }

    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        // base * 2^(attempt-1), capped
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(max))
    }
}

impl EventSource for WsSource {
    fn name(&self) -> &str {
        &self.config.symbol
    }

    fn is_live(&self) -> bool {
        true
    }

    fn run(
        self: Box<Self>,
        tx: mpsc::Sender<SourceEvent>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, SourceResult<()>> {
        Box::pin(async move { self.connect_with_retry(&tx, &shutdown).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(symbol: &str) -> WsSource {
        WsSource::new(WsSourceConfig {
            url: "ws://127.0.0.1:1".to_string(),
            symbol: symbol.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_default_config() {
        let config = WsSourceConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0); // Infinite
        assert_eq!(config.stream, StreamKind::Ticks);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let ws = WsSource::new(WsSourceConfig {
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 1000,
            ..Default::default()
        });
        assert_eq!(ws.calculate_backoff_delay(1), Duration::from_millis(100));
        assert_eq!(ws.calculate_backoff_delay(2), Duration::from_millis(200));
        assert_eq!(ws.calculate_backoff_delay(4), Duration::from_millis(800));
        assert_eq!(ws.calculate_backoff_delay(9), Duration::from_millis(1000));
    }

    #[test]
    fn test_parse_text_filters_symbol() {
        let ws = source("ES");
        let ours = r#"{"symbol":"ES","event":{"timestamp":"2024-01-02T09:30:00Z","open":"1","high":"1","low":"1","close":"1","volume":"3"}}"#;
        let other = r#"{"symbol":"NQ","event":{"timestamp":"2024-01-02T09:30:00Z","open":"1","high":"1","low":"1","close":"1"}}"#;
        let ack = r#"{"ack":"subscribe","symbol":"ES"}"#;

        assert!(ws.parse_text(ours).is_some());
        assert!(ws.parse_text(other).is_none());
        assert!(ws.parse_text(ack).is_none());
    }

    #[test]
    fn test_subscribe_request_shape() {
        let req = SubscribeRequest {
            method: "subscribe",
            symbol: "ES",
            stream: StreamKind::Bars,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["method"], "subscribe");
        assert_eq!(json["stream"], "bars");
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(source("ES").state(), ConnectionState::Disconnected);
    }
}
