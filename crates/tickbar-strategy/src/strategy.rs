//! Strategy callback interface.

use crate::context::StrategyContext;
use crate::error::StrategyResult;
use crate::indicator::Indicator;
use tickbar_broker::OrderEvent;

/// Callbacks are strictly serialized: the runtime never calls two of them
/// at once, so implementations need no locking of their own.
pub trait Strategy: Send {
    /// Indicators the runtime evaluates before each callback, in the order
    /// exposed by [`StrategyContext::indicator`]. Warm-up lasts until every
    /// one of them has enough history.
    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        Vec::new()
    }

    /// Runs once before the first advance.
    fn start(&mut self, _ctx: &StrategyContext<'_>) -> StrategyResult<()> {
        Ok(())
    }

    /// Warm-up callback: bookkeeping only, indicator values may be NaN.
    fn prenext(&mut self, _ctx: &mut StrategyContext<'_>) -> StrategyResult<()> {
        Ok(())
    }

    /// Steady-state callback.
    fn next(&mut self, ctx: &mut StrategyContext<'_>) -> StrategyResult<()>;

    /// Broker notification, delivered before the next callback.
    fn notify_order(&mut self, _event: &OrderEvent) {}

    /// Runs once after the last callback.
    fn stop(&mut self, _ctx: &StrategyContext<'_>) -> StrategyResult<()> {
        Ok(())
    }
}
