//! Bar aggregation.
//!
//! Converts a feed's RawEvent stream into fixed-timeframe bars under one
//! of three policies, fixed at construction:
//! - `PassThrough`: every event is one finalized bar, verbatim
//! - `Resample`: events merge into the open bucket; only finalized bars are emitted
//! - `Replay`: same merge rule, but the in-progress bar is re-emitted on every event
//!
//! Events whose timestamp is strictly earlier than the feed's watermark
//! (latest accepted event or finalized bar) are rejected without touching
//! aggregator state.

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tickbar_core::{Bar, Bucket, FeedId, RawEvent, TimeFrame, TimeframeSpec};
use tracing::{debug, trace, warn};

/// Aggregation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationPolicy {
    #[default]
    PassThrough,
    Resample,
    Replay,
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PassThrough => write!(f, "passthrough"),
            Self::Resample => write!(f, "resample"),
            Self::Replay => write!(f, "replay"),
        }
    }
}

impl FromStr for AggregationPolicy {
    type Err = FeedError;

    fn from_str(s: &str) -> FeedResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "passthrough" | "pass-through" | "none" => Ok(Self::PassThrough),
            "resample" => Ok(Self::Resample),
            "replay" => Ok(Self::Replay),
            other => Err(FeedError::InvalidConfig(format!(
                "unknown aggregation policy: {other}"
            ))),
        }
    }
}

/// What one accepted event did to the feed's bar sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarUpdate {
    /// A finalized bar was appended.
    Closed(Bar),
    /// Replay: the previous in-progress bar (if any) froze and a new
    /// in-progress bar was appended.
    Opened(Bar),
    /// Replay: the in-progress bar was overwritten in place.
    Updated(Bar),
    /// Replay: the in-progress bar froze with no new emission (end of stream).
    Frozen,
}

impl BarUpdate {
    /// The emitted bar, if this update is visible to callbacks.
    #[must_use]
    pub fn bar(&self) -> Option<&Bar> {
        match self {
            Self::Closed(bar) | Self::Opened(bar) | Self::Updated(bar) => Some(bar),
            Self::Frozen => None,
        }
    }
}

/// Bucket still accepting events.
#[derive(Debug, Clone)]
struct OpenBar {
    bucket: Bucket,
    bar: Bar,
    last_event: DateTime<Utc>,
}

impl OpenBar {
    /// Bar as seen downstream, stamped per the alignment flags.
    fn emit(&self, spec: &TimeframeSpec) -> Bar {
        let mut bar = self.bar.clone();
        bar.timestamp = spec.bar_timestamp(&self.bucket, self.last_event);
        bar
    }
}

/// Per-feed bar aggregator.
#[derive(Debug)]
pub struct BarAggregator {
    feed: FeedId,
    policy: AggregationPolicy,
    spec: TimeframeSpec,
    open: Option<OpenBar>,
    last_event_ts: Option<DateTime<Utc>>,
    last_final_ts: Option<DateTime<Utc>>,
}

impl BarAggregator {
    /// Create an aggregator.
    ///
    /// Tick timeframes have no buckets and are only valid with pass-through.
    pub fn new(feed: FeedId, policy: AggregationPolicy, spec: TimeframeSpec) -> FeedResult<Self> {
        spec.validate()?;
        if spec.timeframe == TimeFrame::Ticks && policy != AggregationPolicy::PassThrough {
            return Err(FeedError::InvalidConfig(format!(
                "{policy} needs a time-based timeframe, got ticks"
            )));
        }
        debug!(feed = %feed, %policy, %spec, "Bar aggregator created");
        Ok(Self {
            feed,
            policy,
            spec,
            open: None,
            last_event_ts: None,
            last_final_ts: None,
        })
    }

    #[must_use]
    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    #[must_use]
    pub fn spec(&self) -> &TimeframeSpec {
        &self.spec
    }

    /// Whether a bucket is currently accepting events.
    #[must_use]
    pub fn has_open_bar(&self) -> bool {
        self.open.is_some()
    }

    /// Earliest timestamp the next event may carry.
    #[must_use]
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match (self.last_event_ts, self.last_final_ts) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Feed one event through the policy.
    ///
    /// Returns the resulting update, or `None` when the event merged into
    /// a resample bucket without finalizing anything.
    pub fn push(&mut self, event: &RawEvent) -> FeedResult<Option<BarUpdate>> {
        if let Some(watermark) = self.watermark() {
            if event.timestamp < watermark {
                warn!(
                    feed = %self.feed,
                    timestamp = %event.timestamp,
                    %watermark,
                    "Rejecting out-of-order event"
                );
                return Err(FeedError::OutOfOrderEvent {
                    feed: self.feed,
                    timestamp: event.timestamp,
                    watermark,
                });
            }
        }
        let seed = Bar::from_event(event)
            .map_err(|e| FeedError::InvalidEvent(format!("{}: {e}", self.feed)))?;

        let update = match self.policy {
            AggregationPolicy::PassThrough => {
                self.last_final_ts = Some(seed.timestamp);
                Some(BarUpdate::Closed(seed))
            }
            AggregationPolicy::Resample | AggregationPolicy::Replay => self.merge(event, seed)?,
        };
        self.last_event_ts = Some(event.timestamp);

        trace!(feed = %self.feed, update = ?update, "Event aggregated");
        Ok(update)
    }

    fn merge(&mut self, event: &RawEvent, seed: Bar) -> FeedResult<Option<BarUpdate>> {
        let replay = self.policy == AggregationPolicy::Replay;

        if let Some(open) = self.open.as_mut() {
            if open.bucket.contains(event.timestamp) {
                open.bar.merge(event);
                open.last_event = event.timestamp;
                return Ok(replay.then(|| BarUpdate::Updated(open.emit(&self.spec))));
            }
        }

        // Resolved before touching the open bucket so a failure changes nothing
        let bucket = self.spec.bucket_for(event.timestamp).ok_or_else(|| {
            FeedError::InvalidEvent(format!(
                "{}: no {} bucket for {}",
                self.feed, self.spec, event.timestamp
            ))
        })?;

        // Crossing (or first event): finalize the old bucket, seed a new one.
        let finished = self.open.take().map(|old| old.emit(&self.spec));
        if let Some(bar) = finished.as_ref() {
            self.last_final_ts = Some(bar.timestamp);
        }

        let open = OpenBar {
            bucket,
            bar: seed,
            last_event: event.timestamp,
        };
        let emitted = open.emit(&self.spec);
        self.open = Some(open);

        if replay {
            Ok(Some(BarUpdate::Opened(emitted)))
        } else {
            Ok(finished.map(BarUpdate::Closed))
        }
    }

    /// End of stream: finalize whatever bucket is still open.
    ///
    /// Resample emits the pending bar; replay has already shown it, so it
    /// just freezes.
    pub fn flush(&mut self) -> Option<BarUpdate> {
        let open = self.open.take()?;
        let bar = open.emit(&self.spec);
        self.last_final_ts = Some(bar.timestamp);
        debug!(feed = %self.feed, timestamp = %bar.timestamp, "Flushed open bar");

        match self.policy {
            AggregationPolicy::Resample => Some(BarUpdate::Closed(bar)),
            AggregationPolicy::Replay => Some(BarUpdate::Frozen),
            AggregationPolicy::PassThrough => None,
        }
    }
}
