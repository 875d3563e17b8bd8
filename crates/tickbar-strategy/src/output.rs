//! Per-advance bar lines.
//!
//! ```text
//! Datetime, Open, High, Low, Close, Volume, OpenInterest, SMA
//! 0005, 2024-01-02T09:30:04.000000, 100.00, 100.00, 100.00, 100.00, 1, 0, 100.00
//! ```

use crate::indicator::IndicatorValue;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::io::Write;
use tickbar_core::Bar;

const HEADER: [&str; 8] = [
    "Datetime",
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
    "OpenInterest",
    "SMA",
];

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Comma-separated bar writer.
///
/// Timestamps are rendered in `tz`; prices with two decimals, volume and
/// open interest truncated to integers.
pub struct BarLineWriter<W: Write> {
    out: W,
    tz: Tz,
}

impl<W: Write> BarLineWriter<W> {
    pub fn new(out: W, tz: Tz) -> Self {
        Self { out, tz }
    }

    pub fn write_header(&mut self) -> std::io::Result<()> {
        writeln!(self.out, "{}", HEADER.join(", "))
    }

    /// One line for a feed's current bar; `None` renders every field as
    /// `nan`.
    pub fn write_bar(
        &mut self,
        sequence: usize,
        bar: Option<&Bar>,
        indicator: IndicatorValue,
    ) -> std::io::Result<()> {
        let line = self.format_line(sequence, bar, indicator);
        writeln!(self.out, "{line}")
    }

    pub fn format_line(
        &self,
        sequence: usize,
        bar: Option<&Bar>,
        indicator: IndicatorValue,
    ) -> String {
        let mut fields = vec![format!("{sequence:04}")];
        match bar {
            Some(bar) => {
                fields.push(
                    bar.timestamp
                        .with_timezone(&self.tz)
                        .format(DATETIME_FORMAT)
                        .to_string(),
                );
                for price in [bar.open, bar.high, bar.low, bar.close] {
                    fields.push(two_decimals(price.inner()));
                }
                fields.push(bar.volume.inner().trunc().to_string());
                fields.push(bar.open_interest.inner().trunc().to_string());
                fields.push(format!("{indicator:.2}"));
            }
            None => fields.extend(std::iter::repeat("nan".to_string()).take(HEADER.len())),
        }
        fields.join(", ")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn two_decimals(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}
