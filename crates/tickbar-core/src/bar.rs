//! Raw market updates and fixed-timeframe bars.

use crate::decimal::{Price, Size};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One market update: a tick or a pre-aggregated small bar.
///
/// Arrives at irregular times. A plain trade tick carries the same value
/// in all four price fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub timestamp: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    #[serde(default)]
    pub volume: Size,
    #[serde(default)]
    pub open_interest: Size,
}

impl RawEvent {
    /// Create a trade tick where open = high = low = close.
    pub fn tick(timestamp: DateTime<Utc>, price: Price, volume: Size) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            open_interest: Size::ZERO,
        }
    }
}

/// Fixed-timeframe OHLCV + open interest record.
///
/// Invariant: `high >= max(open, close)`, `low <= min(open, close)`,
/// `volume >= 0`. Enforced by [`Bar::validate`] on every constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Size,
    pub open_interest: Size,
}

impl Bar {
    /// Build a bar from a single raw event, keeping its timestamp.
    pub fn from_event(event: &RawEvent) -> Result<Self> {
        let bar = Self {
            timestamp: event.timestamp,
            open: event.open,
            high: event.high,
            low: event.low,
            close: event.close,
            volume: event.volume,
            open_interest: event.open_interest,
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Check the OHLC ordering and non-negative volume.
    pub fn validate(&self) -> Result<()> {
        if self.high < self.open.max(self.close) {
            return Err(CoreError::InvalidBar(format!(
                "high {} below open/close ({}/{})",
                self.high, self.open, self.close
            )));
        }
        if self.low > self.open.min(self.close) {
            return Err(CoreError::InvalidBar(format!(
                "low {} above open/close ({}/{})",
                self.low, self.open, self.close
            )));
        }
        if self.volume.is_negative() {
            return Err(CoreError::InvalidBar(format!(
                "negative volume {}",
                self.volume
            )));
        }
        Ok(())
    }

    /// Fold a later event into this bar.
    ///
    /// Open is kept, high/low track extrema, close is the latest close,
    /// volume accumulates and open interest is the latest value.
    pub fn merge(&mut self, event: &RawEvent) {
        self.high = self.high.max(event.high);
        self.low = self.low.min(event.low);
        self.close = event.close;
        self.volume += event.volume;
        self.open_interest = event.open_interest;
    }
}
