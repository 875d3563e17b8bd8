//! Source abstraction and task spawning.
//!
//! A source owns the producing side of a bounded channel. Closing the
//! channel without sending [`SourceEvent::EndOfStream`] means the source
//! died; consumers treat that as a transport failure, not as the end of
//! data.

use crate::error::SourceResult;
use std::future::Future;
use std::pin::Pin;
use tickbar_core::{FeedId, RawEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Item delivered on a feed's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// One market update.
    Event(RawEvent),
    /// Transport dropped; the feed is stalled until `Reconnected`.
    Disconnected(String),
    /// Transport restored.
    Reconnected,
    /// Historical data exhausted. Live sources never send this.
    EndOfStream,
}

/// Producer of RawEvents for exactly one feed.
pub trait EventSource: Send + 'static {
    /// Identifier shown in logs and output.
    fn name(&self) -> &str;

    /// Live sources deliver data as it happens and may be quiet for a
    /// while; historical sources can always produce their next item.
    fn is_live(&self) -> bool {
        false
    }

    /// Run until exhausted or cancelled, pushing into `tx`.
    fn run(
        self: Box<Self>,
        tx: mpsc::Sender<SourceEvent>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, SourceResult<()>>;
}

/// Consumer side of a spawned source.
#[derive(Debug)]
pub struct SourceHandle {
    pub feed: FeedId,
    pub name: String,
    pub live: bool,
    pub rx: mpsc::Receiver<SourceEvent>,
    pub task: JoinHandle<()>,
}

/// Spawn `source` as a task feeding a channel of `buffer` slots.
///
/// The bounded channel is the per-feed arrival-order buffer: a slow
/// consumer applies backpressure instead of dropping events.
pub fn spawn_source(
    feed: FeedId,
    source: Box<dyn EventSource>,
    buffer: usize,
    shutdown: CancellationToken,
) -> SourceHandle {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let name = source.name().to_string();
    let live = source.is_live();
    info!(feed = %feed, source = %name, buffer, live, "Spawning event source");

    let task_name = name.clone();
    let task = tokio::spawn(async move {
        match source.run(tx, shutdown).await {
            Ok(()) => debug!(feed = %feed, source = %task_name, "Event source finished"),
            Err(e) => error!(feed = %feed, source = %task_name, ?e, "Event source failed"),
        }
    });

    SourceHandle {
        feed,
        name,
        live,
        rx,
        task,
    }
}

/// Send helper that gives up quietly when the consumer is gone.
///
/// Returns `false` when the run should stop.
pub(crate) async fn forward(
    tx: &mpsc::Sender<SourceEvent>,
    shutdown: &CancellationToken,
    event: SourceEvent,
) -> bool {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => false,
        sent = tx.send(event) => sent.is_ok(),
    }
}
