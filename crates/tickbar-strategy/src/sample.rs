//! Sample strategy: print every advance, buy once, then exit once.

use crate::context::StrategyContext;
use crate::error::{StrategyError, StrategyResult};
use crate::guard::{GuardConfig, OrderGuard};
use crate::indicator::{Indicator, IndicatorValue, Sma};
use crate::output::BarLineWriter;
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::num::NonZeroUsize;
use tickbar_broker::OrderEvent;
use tickbar_core::FeedId;
use tracing::info;

fn default_sma_period() -> usize {
    5
}

/// Parameters of [`EntryExitStrategy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryExitConfig {
    /// Moving-average window on the primary feed; also the warm-up length.
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,
    #[serde(default)]
    pub guard: GuardConfig,
}

impl Default for EntryExitConfig {
    fn default() -> Self {
        Self {
            sma_period: default_sma_period(),
            guard: GuardConfig::default(),
        }
    }
}

/// Writes one line per feed on every advance and drives an [`OrderGuard`]
/// in steady state.
pub struct EntryExitStrategy<W: Write + Send> {
    sma_period: NonZeroUsize,
    writer: BarLineWriter<W>,
    guard: OrderGuard,
}

impl<W: Write + Send> EntryExitStrategy<W> {
    pub fn new(config: EntryExitConfig, writer: BarLineWriter<W>) -> StrategyResult<Self> {
        let sma_period = NonZeroUsize::new(config.sma_period)
            .ok_or_else(|| StrategyError::InvalidConfig("sma_period must be > 0".to_string()))?;
        Ok(Self {
            sma_period,
            writer,
            guard: OrderGuard::new(config.guard),
        })
    }

    #[must_use]
    pub fn guard(&self) -> &OrderGuard {
        &self.guard
    }

    pub fn into_writer(self) -> BarLineWriter<W> {
        self.writer
    }

    fn write_lines(&mut self, ctx: &StrategyContext<'_>) -> StrategyResult<()> {
        let sequence = ctx.sequence();
        self.writer
            .write_bar(sequence, ctx.current(FeedId::PRIMARY), ctx.indicator(0))?;
        // The moving average only exists on the primary feed
        for i in 1..ctx.feed_count() {
            self.writer
                .write_bar(sequence, ctx.current(FeedId::new(i)), IndicatorValue::NAN)?;
        }
        Ok(())
    }
}

impl<W: Write + Send> Strategy for EntryExitStrategy<W> {
    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(Sma::new(FeedId::PRIMARY, self.sma_period))]
    }

    fn start(&mut self, _ctx: &StrategyContext<'_>) -> StrategyResult<()> {
        self.guard.reset();
        self.writer.write_header()?;
        Ok(())
    }

    fn prenext(&mut self, ctx: &mut StrategyContext<'_>) -> StrategyResult<()> {
        self.write_lines(ctx)
    }

    fn next(&mut self, ctx: &mut StrategyContext<'_>) -> StrategyResult<()> {
        self.write_lines(ctx)?;
        self.guard.on_steady(ctx)?;
        Ok(())
    }

    fn notify_order(&mut self, event: &OrderEvent) {
        self.guard.on_order(event);
    }

    fn stop(&mut self, _ctx: &StrategyContext<'_>) -> StrategyResult<()> {
        self.writer.flush()?;
        info!(
            state = ?self.guard.state(),
            entries = self.guard.entries_accepted(),
            exits = self.guard.exits_accepted(),
            "Strategy stopped"
        );
        Ok(())
    }
}
