//! Strategy runtime: the event loop from sources to callbacks.
//!
//! One loop owns every feed, so callbacks are strictly serialized. Each
//! iteration takes one item from the per-feed channels (secondaries are
//! polled before the primary), feeds it through the synchronizer and, on a
//! primary advance at `t`:
//!
//! 1. pulls every secondary forward until its next event is later than
//!    `t`; historical secondaries are awaited, live ones are drained of
//!    what has already arrived
//! 2. delivers pending broker notifications to the strategy
//! 3. evaluates indicators and checks the one-way warm-up transition
//! 4. runs `prenext` or `next`
//! 5. submits the orders the callback queued
//!
//! Cancellation is only observed between callbacks.

use crate::context::StrategyContext;
use crate::error::{StrategyError, StrategyResult};
use crate::indicator::{Indicator, IndicatorValue};
use crate::strategy::Strategy;
use chrono::{DateTime, Utc};
use futures_util::future::poll_fn;
use serde::Serialize;
use std::task::{Context, Poll};
use std::time::Instant;
use tickbar_broker::{DynBroker, OrderEvent, OrderStatus};
use tickbar_core::{FeedId, OrderRequest, Position, RawEvent};
use tickbar_feed::{Advance, Feed, FeedConfig, FeedError, FeedSynchronizer};
use tickbar_source::{SourceEvent, SourceHandle};
use tickbar_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The primary source signalled end of stream.
    Exhausted,
    /// The shutdown token was cancelled.
    Cancelled,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    /// Primary advances, i.e. callbacks.
    pub advances: u64,
    pub warmup_advances: u64,
    pub orders_accepted: u64,
    pub orders_rejected: u64,
    pub fills: u64,
    pub out_of_order: u64,
    pub stalls: u64,
    /// Broker position per feed at the end of the run.
    pub positions: Vec<Position>,
}

#[derive(Debug, Default)]
struct Counters {
    advances: u64,
    warmup_advances: u64,
    orders_accepted: u64,
    orders_rejected: u64,
    fills: u64,
    out_of_order: u64,
    stalls: u64,
}

struct FeedChannel {
    feed: FeedId,
    rx: mpsc::Receiver<SourceEvent>,
    task: JoinHandle<()>,
    live: bool,
    /// Item read ahead while aligning, handed out before the channel.
    peeked: Option<SourceEvent>,
    open: bool,
    ended: bool,
}

enum Polled {
    Item(FeedId, SourceEvent),
    Closed(FeedId),
}

fn poll_channels(channels: &mut [FeedChannel], cx: &mut Context<'_>) -> Poll<Polled> {
    let order = (1..channels.len()).chain(std::iter::once(0));
    for i in order {
        let channel = &mut channels[i];
        if let Some(item) = channel.peeked.take() {
            return Poll::Ready(Polled::Item(channel.feed, item));
        }
        if !channel.open {
            continue;
        }
        match channel.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => return Poll::Ready(Polled::Item(channel.feed, item)),
            Poll::Ready(None) => {
                channel.open = false;
                return Poll::Ready(Polled::Closed(channel.feed));
            }
            Poll::Pending => {}
        }
    }
    Poll::Pending
}

/// Bars that can no longer change.
fn finalized(feed: &Feed) -> usize {
    feed.len() - usize::from(feed.is_last_open())
}

/// Drives one strategy over a set of feeds.
pub struct StrategyRuntime<S: Strategy> {
    sync: FeedSynchronizer,
    strategy: S,
    indicators: Vec<Box<dyn Indicator>>,
    broker: DynBroker,
    broker_events: mpsc::UnboundedReceiver<OrderEvent>,
    /// Accept/reject outcomes of submissions, delivered before broker events.
    pending: Vec<OrderEvent>,
    labels: Vec<String>,
    warmed_up: bool,
    last_advance: Option<Advance>,
    counters: Counters,
}

impl<S: Strategy> StrategyRuntime<S> {
    /// Build the feeds and register the strategy's indicators.
    ///
    /// `broker_events` is the receiving side of the channel the broker
    /// reports fills on.
    pub fn new(
        feeds: Vec<FeedConfig>,
        strategy: S,
        broker: DynBroker,
        broker_events: mpsc::UnboundedReceiver<OrderEvent>,
    ) -> StrategyResult<Self> {
        let sync = FeedSynchronizer::new(feeds)?;
        let indicators = strategy.indicators();
        for indicator in &indicators {
            if indicator.feed().index() >= sync.feed_count() {
                return Err(StrategyError::InvalidConfig(format!(
                    "indicator {} reads {}, but only {} feed(s) exist",
                    indicator.name(),
                    indicator.feed(),
                    sync.feed_count()
                )));
            }
        }
        let labels = (0..sync.feed_count())
            .map(|i| FeedId::new(i).to_string())
            .collect();

        Ok(Self {
            sync,
            strategy,
            indicators,
            broker,
            broker_events,
            pending: Vec::new(),
            labels,
            warmed_up: false,
            last_advance: None,
            counters: Counters::default(),
        })
    }

    #[must_use]
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn into_strategy(self) -> S {
        self.strategy
    }

    #[must_use]
    pub fn feeds(&self) -> &FeedSynchronizer {
        &self.sync
    }

    #[must_use]
    pub fn is_warmed_up(&self) -> bool {
        self.warmed_up
    }

    /// Run until the primary source is exhausted or `shutdown` fires.
    ///
    /// `sources` must hold exactly one handle per feed. A live primary
    /// never ends on its own; only cancellation stops such a run.
    pub async fn run(
        &mut self,
        sources: Vec<SourceHandle>,
        shutdown: CancellationToken,
    ) -> StrategyResult<RunSummary> {
        let mut channels = self.channels(sources)?;
        info!(
            feeds = self.sync.feed_count(),
            indicators = self.indicators.len(),
            broker = self.broker.name(),
            "Strategy runtime started"
        );

        {
            let mut outbox = Vec::new();
            let ctx = StrategyContext::new(
                &self.sync,
                self.broker.as_ref(),
                &[],
                None,
                true,
                &mut outbox,
            );
            self.strategy.start(&ctx)?;
        }

        let stop_reason = loop {
            let polled = tokio::select! {
                biased;
                () = shutdown.cancelled() => break StopReason::Cancelled,
                polled = poll_fn(|cx| poll_channels(&mut channels, cx)) => polled,
            };

            match polled {
                Polled::Item(feed, SourceEvent::Event(event)) => {
                    self.on_event(&mut channels, feed, &event).await?;
                }
                Polled::Item(feed, SourceEvent::Disconnected(reason)) => {
                    warn!(feed = %feed, %reason, "Transport failure");
                    self.mark_stalled(feed, true)?;
                }
                Polled::Item(feed, SourceEvent::Reconnected) => {
                    self.mark_stalled(feed, false)?;
                }
                Polled::Item(feed, SourceEvent::EndOfStream) => {
                    channels[feed.index()].ended = true;
                    if feed.is_primary() {
                        self.finish_all(&mut channels).await?;
                        break StopReason::Exhausted;
                    }
                    self.sync.finish(feed)?;
                }
                Polled::Closed(feed) => {
                    self.on_closed(feed, channels[feed.index()].ended)?;
                }
            }
        };

        for channel in &channels {
            channel.task.abort();
        }
        self.deliver_notifications();

        {
            let mut outbox = Vec::new();
            let ctx = StrategyContext::new(
                &self.sync,
                self.broker.as_ref(),
                &[],
                self.last_advance,
                !self.warmed_up,
                &mut outbox,
            );
            self.strategy.stop(&ctx)?;
        }

        let summary = self.summary(stop_reason);
        info!(
            reason = ?summary.stop_reason,
            advances = summary.advances,
            warmup = summary.warmup_advances,
            accepted = summary.orders_accepted,
            rejected = summary.orders_rejected,
            fills = summary.fills,
            "Strategy runtime stopped"
        );
        Ok(summary)
    }

    fn channels(&self, mut sources: Vec<SourceHandle>) -> StrategyResult<Vec<FeedChannel>> {
        sources.sort_by_key(|s| s.feed);
        let expected: Vec<FeedId> = (0..self.sync.feed_count()).map(FeedId::new).collect();
        let actual: Vec<FeedId> = sources.iter().map(|s| s.feed).collect();
        if actual != expected {
            return Err(StrategyError::InvalidConfig(format!(
                "expected one source per feed {expected:?}, got {actual:?}"
            )));
        }

        Ok(sources
            .into_iter()
            .map(|s| {
                debug!(feed = %s.feed, source = %s.name, "Attached source");
                FeedChannel {
                    feed: s.feed,
                    rx: s.rx,
                    task: s.task,
                    live: s.live,
                    peeked: None,
                    open: true,
                    ended: false,
                }
            })
            .collect())
    }

    async fn on_event(
        &mut self,
        channels: &mut [FeedChannel],
        feed: FeedId,
        event: &RawEvent,
    ) -> StrategyResult<()> {
        if let Some(advance) = self.ingest(feed, event)? {
            self.dispatch_aligned(channels, advance).await?;
        }
        Ok(())
    }

    /// Route one event into the synchronizer. Out-of-order and invalid
    /// events are counted and dropped.
    fn ingest(&mut self, feed: FeedId, event: &RawEvent) -> StrategyResult<Option<Advance>> {
        let before = finalized(self.sync.feed(feed)?);

        match self.sync.ingest(feed, event) {
            Ok(advance) => {
                let label = &self.labels[feed.index()];
                Metrics::raw_event(label);
                let current = self.sync.feed(feed)?;
                for _ in before..finalized(current) {
                    Metrics::bar(label, true);
                }
                if current.is_last_open() {
                    Metrics::bar(label, false);
                }
                Ok(advance)
            }
            Err(FeedError::OutOfOrderEvent { .. }) => {
                Metrics::out_of_order(&self.labels[feed.index()]);
                self.counters.out_of_order += 1;
                Ok(None)
            }
            Err(FeedError::InvalidEvent(reason)) => {
                warn!(feed = %feed, %reason, "Dropping invalid event");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn on_closed(&mut self, feed: FeedId, ended: bool) -> StrategyResult<()> {
        if !ended {
            error!(feed = %feed, "Source ended without end of stream");
            self.mark_stalled(feed, true)?;
        }
        Ok(())
    }

    /// Bring secondaries up to the advance, then run the callback.
    async fn dispatch_aligned(
        &mut self,
        channels: &mut [FeedChannel],
        advance: Advance,
    ) -> StrategyResult<()> {
        self.pull_secondaries(channels, Some(advance.timestamp)).await?;
        self.sync.realign();
        self.dispatch(advance).await
    }

    /// Ingest secondary items until the next event is later than `until`
    /// (everything when `None`), the source ends, or a live source has
    /// nothing more buffered.
    async fn pull_secondaries(
        &mut self,
        channels: &mut [FeedChannel],
        until: Option<DateTime<Utc>>,
    ) -> StrategyResult<()> {
        for channel in channels.iter_mut().skip(1) {
            loop {
                let item = match channel.peeked.take() {
                    Some(item) => item,
                    None if channel.ended || !channel.open => break,
                    None if channel.live => match channel.rx.try_recv() {
                        Ok(item) => item,
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            channel.open = false;
                            self.on_closed(channel.feed, channel.ended)?;
                            break;
                        }
                    },
                    None => match channel.rx.recv().await {
                        Some(item) => item,
                        None => {
                            channel.open = false;
                            self.on_closed(channel.feed, channel.ended)?;
                            break;
                        }
                    },
                };

                match item {
                    SourceEvent::Event(event) => {
                        if until.is_some_and(|t| event.timestamp > t) {
                            channel.peeked = Some(SourceEvent::Event(event));
                            break;
                        }
                        self.ingest(channel.feed, &event)?;
                    }
                    SourceEvent::Disconnected(reason) => {
                        warn!(feed = %channel.feed, %reason, "Transport failure");
                        self.mark_stalled(channel.feed, true)?;
                    }
                    SourceEvent::Reconnected => self.mark_stalled(channel.feed, false)?,
                    SourceEvent::EndOfStream => {
                        channel.ended = true;
                        self.sync.finish(channel.feed)?;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Primary end of stream: drain and flush secondaries first so the
    /// final primary callback sees their last bars.
    async fn finish_all(&mut self, channels: &mut [FeedChannel]) -> StrategyResult<()> {
        self.pull_secondaries(channels, None).await?;
        for i in 1..self.sync.feed_count() {
            self.sync.finish(FeedId::new(i))?;
        }
        let before = finalized(self.sync.primary());
        let advance = self.sync.finish(FeedId::PRIMARY)?;
        if finalized(self.sync.primary()) > before {
            Metrics::bar(&self.labels[0], true);
        }
        if let Some(advance) = advance {
            self.dispatch(advance).await?;
        }
        Ok(())
    }

    fn mark_stalled(&mut self, feed: FeedId, stalled: bool) -> StrategyResult<()> {
        if self.sync.feed(feed)?.is_stalled() != stalled {
            Metrics::feed_stalled(&self.labels[feed.index()], stalled);
            if stalled {
                self.counters.stalls += 1;
            }
        }
        self.sync.set_stalled(feed, stalled)?;
        Ok(())
    }

    fn dependencies_ready(&self) -> StrategyResult<bool> {
        for indicator in &self.indicators {
            let history = self.sync.feed(indicator.feed())?.history().len();
            if history < indicator.min_bars() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn dispatch(&mut self, advance: Advance) -> StrategyResult<()> {
        self.deliver_notifications();

        let values = self
            .indicators
            .iter()
            .map(|indicator| -> StrategyResult<IndicatorValue> {
                let feed = self.sync.feed(indicator.feed())?;
                Ok(indicator.compute(feed.history()))
            })
            .collect::<StrategyResult<Vec<_>>>()?;

        if !self.warmed_up && self.dependencies_ready()? {
            self.warmed_up = true;
            info!(index = advance.index, timestamp = %advance.timestamp, "Warm-up complete");
        }
        let warming_up = !self.warmed_up;

        let mut outbox: Vec<OrderRequest> = Vec::new();
        let started = Instant::now();
        {
            let mut ctx = StrategyContext::new(
                &self.sync,
                self.broker.as_ref(),
                &values,
                Some(advance),
                warming_up,
                &mut outbox,
            );
            if warming_up {
                self.strategy.prenext(&mut ctx)?;
            } else {
                self.strategy.next(&mut ctx)?;
            }
        }
        Metrics::callback(warming_up, started.elapsed().as_secs_f64() * 1000.0);

        self.counters.advances += 1;
        if warming_up {
            self.counters.warmup_advances += 1;
        }
        self.last_advance = Some(advance);

        for request in outbox {
            self.submit(request).await;
        }
        Ok(())
    }

    async fn submit(&mut self, request: OrderRequest) {
        match self.broker.submit(request.clone()).await {
            Ok(id) => {
                info!(order_id = %id, side = %request.side(), size = %request.size(), "Order accepted");
                Metrics::order_accepted();
                self.counters.orders_accepted += 1;
                self.pending.push(OrderEvent::accepted(&request));
            }
            Err(e) => {
                warn!(order_id = %request.id(), error = %e, "Order rejected");
                Metrics::order_rejected();
                self.counters.orders_rejected += 1;
                self.pending.push(OrderEvent::rejected(&request, e.to_string()));
            }
        }
    }

    /// Submission outcomes first, then broker reports in arrival order.
    fn deliver_notifications(&mut self) {
        for event in self.pending.drain(..) {
            self.strategy.notify_order(&event);
        }
        while let Ok(event) = self.broker_events.try_recv() {
            if matches!(event.status, OrderStatus::Filled { .. }) {
                Metrics::order_filled();
                self.counters.fills += 1;
            }
            self.strategy.notify_order(&event);
        }
    }

    fn summary(&self, stop_reason: StopReason) -> RunSummary {
        let positions = (0..self.sync.feed_count())
            .map(|i| self.broker.position(FeedId::new(i)))
            .collect();
        RunSummary {
            stop_reason,
            advances: self.counters.advances,
            warmup_advances: self.counters.warmup_advances,
            orders_accepted: self.counters.orders_accepted,
            orders_rejected: self.counters.orders_rejected,
            fills: self.counters.fills,
            out_of_order: self.counters.out_of_order,
            stalls: self.counters.stalls,
            positions,
        }
    }
}
