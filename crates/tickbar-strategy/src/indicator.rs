//! Indicators: windowed values over a feed's bar history.
//!
//! An indicator is bound to one feed and reads that feed's history up to
//! its current (synchronized) bar. Until the window is full it reports the
//! NaN sentinel; for a secondary feed that has not caught up with the
//! primary the history is empty, so the sentinel applies there too.

use rust_decimal::Decimal;
use std::fmt;
use std::num::NonZeroUsize;
use tickbar_core::{Bar, FeedId};

/// Indicator output: a value, or the NaN sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndicatorValue(Option<Decimal>);

impl IndicatorValue {
    pub const NAN: Self = Self(None);

    pub fn new(value: Decimal) -> Self {
        Self(Some(value))
    }

    #[must_use]
    pub fn value(&self) -> Option<Decimal> {
        self.0
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for IndicatorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.0, f.precision()) {
            (None, _) => write!(f, "nan"),
            (Some(v), Some(dp)) => write!(f, "{:.*}", dp, v.round_dp(dp as u32)),
            (Some(v), None) => write!(f, "{v}"),
        }
    }
}

/// Pure function of one feed's bar history.
pub trait Indicator: Send {
    fn name(&self) -> &str;

    /// Feed whose history this indicator reads.
    fn feed(&self) -> FeedId;

    /// History length needed before the value is defined.
    fn min_bars(&self) -> usize;

    /// Value at the last bar of `history`.
    fn compute(&self, history: &[Bar]) -> IndicatorValue;
}

/// Simple moving average of the last `period` closes.
#[derive(Debug, Clone)]
pub struct Sma {
    name: String,
    feed: FeedId,
    period: NonZeroUsize,
}

impl Sma {
    pub fn new(feed: FeedId, period: NonZeroUsize) -> Self {
        Self {
            name: format!("sma({period})"),
            feed,
            period,
        }
    }

    #[must_use]
    pub fn period(&self) -> usize {
        self.period.get()
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn feed(&self) -> FeedId {
        self.feed
    }

    fn min_bars(&self) -> usize {
        self.period.get()
    }

    fn compute(&self, history: &[Bar]) -> IndicatorValue {
        let period = self.period.get();
        if history.len() < period {
            return IndicatorValue::NAN;
        }
        let sum: Decimal = history[history.len() - period..]
            .iter()
            .map(|bar| bar.close.inner())
            .sum();
        IndicatorValue::new(sum / Decimal::from(period))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tickbar_core::{Price, RawEvent, Size};

    fn bars(closes: &[Decimal]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let ts = Utc.timestamp_opt(i as i64, 0).unwrap();
                Bar::from_event(&RawEvent::tick(ts, Price::new(*c), Size::new(dec!(1)))).unwrap()
            })
            .collect()
    }

    fn sma(period: usize) -> Sma {
        Sma::new(FeedId::PRIMARY, NonZeroUsize::new(period).unwrap())
    }

    #[test]
    fn test_sma_nan_until_window_full() {
        let sma = sma(3);
        assert!(sma.compute(&[]).is_nan());
        assert!(sma.compute(&bars(&[dec!(1), dec!(2)])).is_nan());
    }

    #[test]
    fn test_sma_uses_last_window() {
        let sma = sma(3);
        let value = sma.compute(&bars(&[dec!(100), dec!(1), dec!(2), dec!(3)]));
        assert_eq!(value.value(), Some(dec!(2)));
        assert_eq!(sma.min_bars(), 3);
        assert_eq!(sma.name(), "sma(3)");
    }

    #[test]
    fn test_indicator_value_display() {
        assert_eq!(format!("{:.2}", IndicatorValue::NAN), "nan");
        assert_eq!(format!("{:.2}", IndicatorValue::new(dec!(100.456))), "100.46");
        assert_eq!(format!("{:.2}", IndicatorValue::new(dec!(7))), "7.00");
        assert_eq!(IndicatorValue::new(dec!(1.5)).to_string(), "1.5");
    }
}
