//! In-process market data server for the live source tests.
//!
//! Speaks the same JSON protocol as a real gateway: it waits for a
//! `subscribe` request, acknowledges it, pushes the scripted frames and
//! can then hang up to force a reconnect.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

/// What the server does once a client subscribes.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Text frames pushed in order.
    pub frames: Vec<String>,
    /// Hang up after the last frame.
    pub close_after: bool,
}

#[derive(Default)]
struct Recorded {
    requests: Mutex<Vec<String>>,
    connections: AtomicU32,
}

pub struct MockWsServer {
    addr: SocketAddr,
    stop: CancellationToken,
    recorded: Arc<Recorded>,
}

impl MockWsServer {
    /// Bind an ephemeral local port and start accepting.
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stop = CancellationToken::new();
        let recorded = Arc::new(Recorded::default());

        let accept_stop = stop.clone();
        let accept_recorded = recorded.clone();
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    () = accept_stop.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => continue,
                    },
                };
                accept_recorded.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(
                    stream,
                    script.clone(),
                    accept_recorded.clone(),
                    accept_stop.clone(),
                ));
            }
        });

        Self {
            addr,
            stop,
            recorded,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connections accepted so far, reconnects included.
    pub async fn connection_count(&self) -> u32 {
        self.recorded.connections.load(Ordering::SeqCst)
    }

    /// Every text frame received from clients, in arrival order.
    pub async fn received_messages(&self) -> Vec<String> {
        self.recorded.requests.lock().clone()
    }

    /// Stop accepting and drop open sockets.
    pub async fn shutdown(self) {
        self.stop.cancel();
    }
}

fn is_subscribe(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("method")?.as_str()? != "subscribe" {
        return None;
    }
    Some(value.get("symbol")?.as_str()?.to_string())
}

async fn serve(stream: TcpStream, script: Script, recorded: Arc<Recorded>, stop: CancellationToken) {
    let Ok(socket) = accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = socket.split();

    loop {
        let frame = tokio::select! {
            () = stop.cancelled() => return,
            frame = read.next() => frame,
        };
        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Ping(payload))) => {
                let _ = write.send(Message::Pong(payload)).await;
                continue;
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => continue,
        };
        recorded.requests.lock().push(text.clone());

        let Some(symbol) = is_subscribe(&text) else {
            continue;
        };
        let ack = serde_json::json!({ "ack": "subscribe", "symbol": symbol });
        let _ = write.send(Message::Text(ack.to_string())).await;
        for frame in &script.frames {
            let _ = write.send(Message::Text(frame.clone())).await;
        }
        if script.close_after {
            let _ = write.send(Message::Close(None)).await;
            return;
        }
    }
}
