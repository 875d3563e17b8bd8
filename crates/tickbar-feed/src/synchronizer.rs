//! Cross-feed synchronization.
//!
//! Feed 0 is the primary and drives callback cadence: every visible update
//! on it (a finalized bar, or a replay emission) is one [`Advance`]. At each
//! advance every secondary's cursor moves to its most recent bar whose
//! timestamp is at or before the primary's current bar timestamp. A
//! secondary with no such bar reports no current bar.

use crate::aggregator::{AggregationPolicy, BarAggregator, BarUpdate};
use crate::error::{FeedError, FeedResult};
use crate::feed::Feed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tickbar_core::{FeedId, RawEvent, TimeframeSpec};
use tracing::{debug, info, warn};

/// Construction parameters for one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Source identifier, used for display.
    pub name: String,
    pub policy: AggregationPolicy,
    pub spec: TimeframeSpec,
}

/// One primary-feed advance, i.e. one callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Index of the primary's current bar.
    pub index: usize,
    /// Timestamp of the primary's current bar.
    pub timestamp: DateTime<Utc>,
    /// Whether the current bar may still change (replay in-progress bar).
    pub in_progress: bool,
}

#[derive(Debug)]
struct FeedSlot {
    feed: Feed,
    aggregator: BarAggregator,
    finished: bool,
}

/// Owns every feed and its aggregator for one run.
#[derive(Debug)]
pub struct FeedSynchronizer {
    slots: Vec<FeedSlot>,
}

impl FeedSynchronizer {
    /// Build all feeds. The first config is the primary.
    pub fn new(configs: Vec<FeedConfig>) -> FeedResult<Self> {
        if configs.is_empty() {
            return Err(FeedError::InvalidConfig(
                "at least one feed is required".to_string(),
            ));
        }

        let slots = configs
            .into_iter()
            .enumerate()
            .map(|(i, cfg)| -> FeedResult<FeedSlot> {
                let id = FeedId::new(i);
                Ok(FeedSlot {
                    feed: Feed::new(id, cfg.name),
                    aggregator: BarAggregator::new(id, cfg.policy, cfg.spec)?,
                    finished: false,
                })
            })
            .collect::<FeedResult<Vec<_>>>()?;

        info!(feeds = slots.len(), "Feed synchronizer created");
        Ok(Self { slots })
    }

    #[must_use]
    pub fn feed_count(&self) -> usize {
        self.slots.len()
    }

    pub fn feed(&self, id: FeedId) -> FeedResult<&Feed> {
        self.slots
            .get(id.index())
            .map(|s| &s.feed)
            .ok_or(FeedError::UnknownFeed(id))
    }

    #[must_use]
    pub fn primary(&self) -> &Feed {
        &self.slots[0].feed
    }

    pub fn feeds(&self) -> impl Iterator<Item = &Feed> {
        self.slots.iter().map(|s| &s.feed)
    }

    /// Whether the primary feed's source has ended.
    #[must_use]
    pub fn primary_finished(&self) -> bool {
        self.slots[0].finished
    }

    fn slot_mut(&mut self, id: FeedId) -> FeedResult<&mut FeedSlot> {
        self.slots
            .get_mut(id.index())
            .ok_or(FeedError::UnknownFeed(id))
    }

    /// Route one event to its feed.
    ///
    /// Returns an advance when the event produced a visible update on the
    /// primary feed. Rejected events leave every feed unchanged.
    pub fn ingest(&mut self, id: FeedId, event: &RawEvent) -> FeedResult<Option<Advance>> {
        let slot = self.slot_mut(id)?;
        let update = slot.aggregator.push(event)?;
        Ok(self.apply(id, update))
    }

    /// Source for `id` reached end of stream: flush its open bar.
    pub fn finish(&mut self, id: FeedId) -> FeedResult<Option<Advance>> {
        let slot = self.slot_mut(id)?;
        if slot.finished {
            return Ok(None);
        }
        slot.finished = true;
        let update = slot.aggregator.flush();
        let advance = self.apply(id, update);
        info!(feed = %id, bars = self.slots[id.index()].feed.len(), "Feed finished");
        Ok(advance)
    }

    /// Record a transport failure (or recovery) for a feed.
    pub fn set_stalled(&mut self, id: FeedId, stalled: bool) -> FeedResult<()> {
        let slot = self.slot_mut(id)?;
        if slot.feed.is_stalled() != stalled {
            if stalled {
                let last_bar = slot.feed.last().map(|b| b.timestamp);
                warn!(feed = %id, ?last_bar, "Feed stalled");
            } else {
                info!(feed = %id, "Feed recovered");
            }
        }
        slot.feed.set_stalled(stalled);
        Ok(())
    }

    fn apply(&mut self, id: FeedId, update: Option<BarUpdate>) -> Option<Advance> {
        let update = update?;
        let slot = &mut self.slots[id.index()];
        slot.feed.apply(&update);

        if !id.is_primary() || update.bar().is_none() {
            return None;
        }
        Some(self.advance_primary())
    }

    /// Re-position every secondary cursor against the primary's current
    /// bar, after late secondary bars were ingested for the same advance.
    pub fn realign(&mut self) {
        if let Some(timestamp) = self.slots[0].feed.current().map(|bar| bar.timestamp) {
            self.align_secondaries(timestamp);
        }
    }

    fn align_secondaries(&mut self, timestamp: DateTime<Utc>) {
        for slot in self.slots.iter_mut().skip(1) {
            let visible = slot
                .feed
                .bars()
                .partition_point(|bar| bar.timestamp <= timestamp);
            slot.feed.set_cursor(visible.checked_sub(1));
        }
    }

    fn advance_primary(&mut self) -> Advance {
        let primary = &mut self.slots[0].feed;
        let index = primary.len() - 1;
        primary.set_cursor(Some(index));
        let timestamp = primary.bars()[index].timestamp;
        let in_progress = primary.is_last_open();
        self.align_secondaries(timestamp);

        debug!(index, %timestamp, in_progress, "Primary advanced");
        Advance {
            index,
            timestamp,
            in_progress,
        }
    }
}
