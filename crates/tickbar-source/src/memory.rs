//! Scripted in-memory source.

use crate::error::SourceResult;
use crate::event::{forward, BoxFuture, EventSource, SourceEvent};
use std::time::Duration;
use tickbar_core::RawEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Replays a fixed script of source events.
///
/// Historical scripts end with `EndOfStream`; live scripts stay open
/// after the last item until cancelled, like a quiet live feed.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    script: Vec<SourceEvent>,
    interval: Option<Duration>,
    live: bool,
}

impl MemorySource {
    /// Finite source that signals end-of-stream after `events`.
    pub fn historical(name: impl Into<String>, events: Vec<RawEvent>) -> Self {
        Self {
            name: name.into(),
            script: events.into_iter().map(SourceEvent::Event).collect(),
            interval: None,
            live: false,
        }
    }

    /// Open-ended source; may include disconnect/reconnect markers.
    pub fn live(name: impl Into<String>, script: Vec<SourceEvent>) -> Self {
        Self {
            name: name.into(),
            script,
            interval: None,
            live: true,
        }
    }

    /// Pause between items.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

impl EventSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn run(
        self: Box<Self>,
        tx: mpsc::Sender<SourceEvent>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'static, SourceResult<()>> {
        let MemorySource {
            script,
            interval,
            live,
            ..
        } = *self;
        Box::pin(async move {
            for item in script {
                if !forward(&tx, &shutdown, item).await {
                    return Ok(());
                }
                if let Some(interval) = interval {
                    tokio::select! {
                        () = tokio::time::sleep(interval) => {}
                        () = shutdown.cancelled() => return Ok(()),
                    }
                }
            }

            if live {
                shutdown.cancelled().await;
            } else {
                forward(&tx, &shutdown, SourceEvent::EndOfStream).await;
            }
            Ok(())
        })
    }
}
