//! Timeframe specification and bucket boundary math.
//!
//! Buckets are half-open `[start, end)` intervals of `unit * compression`.
//! The three alignment flags are independent:
//! - `snap_to_edge`: start buckets on the timeframe grid instead of at the
//!   first event's timestamp
//! - `right_edge_label`: label a bucket with its end edge instead of its start
//! - `adjust_bar_time`: stamp a bar with its label edge instead of the last
//!   contributing event's timestamp

use crate::error::{CoreError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest bucket accepted: 100 years of days.
pub const MAX_BUCKET_SECONDS: i64 = 36_600 * 86_400;

/// Timeframe unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    /// One bar per raw event; only valid with pass-through aggregation.
    Ticks,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeFrame {
    /// Unit length in seconds, `None` for ticks.
    #[must_use]
    pub fn unit_seconds(&self) -> Option<i64> {
        match self {
            Self::Ticks => None,
            Self::Seconds => Some(1),
            Self::Minutes => Some(60),
            Self::Hours => Some(3_600),
            Self::Days => Some(86_400),
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticks => write!(f, "ticks"),
            Self::Seconds => write!(f, "seconds"),
            Self::Minutes => write!(f, "minutes"),
            Self::Hours => write!(f, "hours"),
            Self::Days => write!(f, "days"),
        }
    }
}

impl FromStr for TimeFrame {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ticks" => Ok(Self::Ticks),
            "seconds" => Ok(Self::Seconds),
            "minutes" => Ok(Self::Minutes),
            "hours" => Ok(Self::Hours),
            "days" => Ok(Self::Days),
            other => Err(CoreError::InvalidTimeframe(format!(
                "unknown timeframe unit: {other}"
            ))),
        }
    }
}

/// Immutable bucket definition for one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeSpec {
    pub timeframe: TimeFrame,
    pub compression: u32,
    pub snap_to_edge: bool,
    pub adjust_bar_time: bool,
    pub right_edge_label: bool,
}

impl Default for TimeframeSpec {
    fn default() -> Self {
        Self {
            timeframe: TimeFrame::Seconds,
            compression: 1,
            snap_to_edge: true,
            adjust_bar_time: true,
            right_edge_label: true,
        }
    }
}

impl TimeframeSpec {
    /// Create a spec with all alignment flags on.
    pub fn new(timeframe: TimeFrame, compression: u32) -> Result<Self> {
        let spec = Self {
            timeframe,
            compression,
            ..Self::default()
        };
        spec.validate()?;
        Ok(spec)
    }

    #[must_use]
    pub fn with_snap_to_edge(mut self, on: bool) -> Self {
        self.snap_to_edge = on;
        self
    }

    #[must_use]
    pub fn with_adjust_bar_time(mut self, on: bool) -> Self {
        self.adjust_bar_time = on;
        self
    }

    #[must_use]
    pub fn with_right_edge_label(mut self, on: bool) -> Self {
        self.right_edge_label = on;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.compression == 0 {
            return Err(CoreError::InvalidTimeframe(
                "compression must be at least 1".to_string(),
            ));
        }
        if let Some(unit) = self.timeframe.unit_seconds() {
            let total = unit.saturating_mul(i64::from(self.compression));
            if total > MAX_BUCKET_SECONDS {
                return Err(CoreError::InvalidTimeframe(format!(
                    "{self} spans {total}s, more than the {MAX_BUCKET_SECONDS}s limit"
                )));
            }
        }
        Ok(())
    }

    /// Bucket length, `None` for tick timeframes and lengths past
    /// [`MAX_BUCKET_SECONDS`].
    #[must_use]
    pub fn bucket_length(&self) -> Option<Duration> {
        self.timeframe
            .unit_seconds()
            .and_then(|secs| secs.checked_mul(i64::from(self.compression)))
            .filter(|total| *total <= MAX_BUCKET_SECONDS)
            .map(Duration::seconds)
    }

    /// Bucket that a new bar seeded by an event at `ts` covers.
    ///
    /// Returns `None` for tick timeframes, which have no buckets, and when
    /// the bucket would fall outside the representable time range.
    #[must_use]
    pub fn bucket_for(&self, ts: DateTime<Utc>) -> Option<Bucket> {
        let length = self.bucket_length()?;
        let start = if self.snap_to_edge {
            let len_us = length.num_microseconds()?;
            let offset = ts.timestamp_micros().rem_euclid(len_us);
            ts.checked_sub_signed(Duration::microseconds(offset))?
        } else {
            ts
        };
        Some(Bucket {
            start,
            end: start.checked_add_signed(length)?,
        })
    }

    /// Timestamp a bar gets given its bucket and last contributing event.
    ///
    /// Computed the same way for every emission, so an in-progress bar and
    /// its finalized form carry identical timestamps.
    #[must_use]
    pub fn bar_timestamp(&self, bucket: &Bucket, last_event: DateTime<Utc>) -> DateTime<Utc> {
        if self.adjust_bar_time {
            bucket.label(self.right_edge_label)
        } else {
            last_event
        }
    }
}

impl fmt::Display for TimeframeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.compression, self.timeframe)
    }
}

/// Half-open `[start, end)` time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Bucket {
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Label edge: end when right-edge labelling, else start.
    #[must_use]
    pub fn label(&self, right_edge: bool) -> DateTime<Utc> {
        if right_edge {
            self.end
        } else {
            self.start
        }
    }
}
