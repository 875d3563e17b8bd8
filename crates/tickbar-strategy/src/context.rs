//! Read-only view of the run handed to each callback.

use crate::error::{StrategyError, StrategyResult};
use crate::indicator::IndicatorValue;
use tickbar_broker::Broker;
use tickbar_core::{Bar, FeedId, OrderId, OrderRequest, Position};
use tickbar_feed::{Advance, Feed, FeedSynchronizer};

/// Snapshot of every feed at one primary advance.
///
/// Orders submitted here are queued and sent to the broker after the
/// callback returns, so a callback never observes a half-submitted order.
pub struct StrategyContext<'a> {
    feeds: &'a FeedSynchronizer,
    broker: &'a dyn Broker,
    indicators: &'a [IndicatorValue],
    advance: Option<Advance>,
    warming_up: bool,
    outbox: &'a mut Vec<OrderRequest>,
}

impl<'a> StrategyContext<'a> {
    pub(crate) fn new(
        feeds: &'a FeedSynchronizer,
        broker: &'a dyn Broker,
        indicators: &'a [IndicatorValue],
        advance: Option<Advance>,
        warming_up: bool,
        outbox: &'a mut Vec<OrderRequest>,
    ) -> Self {
        Self {
            feeds,
            broker,
            indicators,
            advance,
            warming_up,
            outbox,
        }
    }

    /// The advance being delivered; `None` in `start`.
    #[must_use]
    pub fn advance(&self) -> Option<Advance> {
        self.advance
    }

    /// One-based length of the primary feed at this advance.
    ///
    /// Replay updates of one in-progress bar share a sequence number.
    #[must_use]
    pub fn sequence(&self) -> usize {
        self.advance.map_or(0, |a| a.index + 1)
    }

    #[must_use]
    pub fn is_warming_up(&self) -> bool {
        self.warming_up
    }

    #[must_use]
    pub fn feed_count(&self) -> usize {
        self.feeds.feed_count()
    }

    #[must_use]
    pub fn primary(&self) -> &Feed {
        self.feeds.primary()
    }

    #[must_use]
    pub fn feed(&self, id: FeedId) -> Option<&Feed> {
        self.feeds.feed(id).ok()
    }

    /// Current bar of a feed, or `None` when it has no data yet.
    #[must_use]
    pub fn current(&self, id: FeedId) -> Option<&Bar> {
        self.feed(id).and_then(Feed::current)
    }

    /// Indicator value by registration order; NaN when out of range.
    #[must_use]
    pub fn indicator(&self, index: usize) -> IndicatorValue {
        self.indicators
            .get(index)
            .copied()
            .unwrap_or(IndicatorValue::NAN)
    }

    pub fn position(&self, feed: FeedId) -> Position {
        self.broker.position(feed)
    }

    /// Queue an order for the broker.
    pub fn submit(&mut self, request: OrderRequest) -> StrategyResult<OrderId> {
        if self.warming_up {
            return Err(StrategyError::OrderDuringWarmup);
        }
        let id = request.id().clone();
        self.outbox.push(request);
        Ok(id)
    }
}
