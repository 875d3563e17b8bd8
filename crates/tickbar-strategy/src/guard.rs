//! Order guard: a bounded, ordered entry/exit sequence per run.
//!
//! ```text
//! Flat --submit--> EntryPending --accepted--> Holding --submit--> ExitPending --accepted--> Done
//!   ^                   |                        ^                     |
//!   +-----rejected------+                        +------rejected-------+
//! ```
//!
//! At most one entry and one exit are ever accepted. Rejected attempts
//! return the guard to its pre-submission state and are retried on the
//! next steady-state callback.

use crate::context::StrategyContext;
use crate::error::{StrategyError, StrategyResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tickbar_broker::{OrderEvent, OrderStatus};
use tickbar_core::{FeedId, OrderId, OrderKind, OrderRequest, Size};
use tracing::{debug, info, warn};

fn default_entry_size() -> Decimal {
    Decimal::from(20)
}

fn default_exit_excess() -> Decimal {
    Decimal::from(200)
}

/// Sizing and order kind for the guard's two orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Buy size of the entry order.
    #[serde(default = "default_entry_size")]
    pub entry_size: Decimal,
    /// Added to the open position when sizing the exit, so the exit
    /// flips the position instead of flattening it.
    #[serde(default = "default_exit_excess")]
    pub exit_excess: Decimal,
    #[serde(default)]
    pub kind: OrderKind,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            entry_size: default_entry_size(),
            exit_excess: default_exit_excess(),
            kind: OrderKind::Market,
        }
    }
}

impl GuardConfig {
    /// Reject sizes that would produce a zero-size order.
    ///
    /// The exit is sized against the open position, which is `entry_size`
    /// after a fill and zero when the broker never fills.
    pub fn validate(&self) -> StrategyResult<()> {
        if self.entry_size <= Decimal::ZERO {
            return Err(StrategyError::InvalidConfig(format!(
                "entry_size must be > 0, got {}",
                self.entry_size
            )));
        }
        if self.exit_excess.is_zero() || (self.entry_size + self.exit_excess).is_zero() {
            return Err(StrategyError::InvalidConfig(format!(
                "exit size is zero for entry_size {} and exit_excess {}",
                self.entry_size, self.exit_excess
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Flat,
    EntryPending(OrderId),
    Holding,
    ExitPending(OrderId),
    Done,
}

#[derive(Debug)]
pub struct OrderGuard {
    config: GuardConfig,
    state: GuardState,
    entries_accepted: u32,
    exits_accepted: u32,
}

impl OrderGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            state: GuardState::Flat,
            entries_accepted: 0,
            exits_accepted: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> &GuardState {
        &self.state
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == GuardState::Done
    }

    #[must_use]
    pub fn entries_accepted(&self) -> u32 {
        self.entries_accepted
    }

    #[must_use]
    pub fn exits_accepted(&self) -> u32 {
        self.exits_accepted
    }

    /// Back to `Flat` at run start.
    pub fn reset(&mut self) {
        self.state = GuardState::Flat;
        self.entries_accepted = 0;
        self.exits_accepted = 0;
    }

    /// Steady-state step: submit the next order if one is due.
    ///
    /// Orders are priced at the primary feed's current close.
    pub fn on_steady(&mut self, ctx: &mut StrategyContext<'_>) -> StrategyResult<Option<OrderId>> {
        let Some(close) = ctx.current(FeedId::PRIMARY).map(|bar| bar.close) else {
            return Ok(None);
        };

        match self.state {
            GuardState::Flat => {
                let size = Size::new(self.config.entry_size);
                let request = OrderRequest::new(FeedId::PRIMARY, size, self.config.kind, close)?;
                let id = ctx.submit(request)?;
                info!(order_id = %id, %size, price = %close, "Entry order submitted");
                self.state = GuardState::EntryPending(id.clone());
                Ok(Some(id))
            }
            GuardState::Holding => {
                let position = ctx.position(FeedId::PRIMARY).size;
                let size = -(position + Size::new(self.config.exit_excess));
                let request = OrderRequest::new(FeedId::PRIMARY, size, self.config.kind, close)?;
                let id = ctx.submit(request)?;
                info!(order_id = %id, %size, %position, price = %close, "Exit order submitted");
                self.state = GuardState::ExitPending(id.clone());
                Ok(Some(id))
            }
            GuardState::EntryPending(_) | GuardState::ExitPending(_) | GuardState::Done => {
                Ok(None)
            }
        }
    }

    /// Apply a broker notification.
    pub fn on_order(&mut self, event: &OrderEvent) {
        let next = match (&self.state, &event.status) {
            (GuardState::EntryPending(id), OrderStatus::Accepted) if *id == event.order_id => {
                self.entries_accepted += 1;
                GuardState::Holding
            }
            (GuardState::EntryPending(id), OrderStatus::Rejected { reason })
                if *id == event.order_id =>
            {
                warn!(order_id = %id, %reason, "Entry rejected, will retry");
                GuardState::Flat
            }
            (GuardState::ExitPending(id), OrderStatus::Accepted) if *id == event.order_id => {
                self.exits_accepted += 1;
                GuardState::Done
            }
            (GuardState::ExitPending(id), OrderStatus::Rejected { reason })
                if *id == event.order_id =>
            {
                warn!(order_id = %id, %reason, "Exit rejected, will retry");
                GuardState::Holding
            }
            (_, status) => {
                debug!(order_id = %event.order_id, ?status, state = ?self.state, "Order event");
                return;
            }
        };
        debug!(from = ?self.state, to = ?next, "Guard transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tickbar_core::Price;

    fn request() -> OrderRequest {
        OrderRequest::market(FeedId::PRIMARY, Size::new(dec!(20)), Price::new(dec!(100))).unwrap()
    }

    fn pending_entry(guard: &mut OrderGuard) -> OrderRequest {
        let req = request();
        guard.state = GuardState::EntryPending(req.id().clone());
        req
    }

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.entry_size, dec!(20));
        assert_eq!(config.exit_excess, dec!(200));
        assert_eq!(config.kind, OrderKind::Market);
    }

    #[test]
    fn test_config_sizes_validated() {
        assert!(GuardConfig::default().validate().is_ok());

        let zero_entry = GuardConfig {
            entry_size: dec!(0),
            ..GuardConfig::default()
        };
        assert!(zero_entry.validate().is_err());

        let short_entry = GuardConfig {
            entry_size: dec!(-5),
            ..GuardConfig::default()
        };
        assert!(short_entry.validate().is_err());

        // Exit would exactly cancel a filled entry
        let flat_exit = GuardConfig {
            entry_size: dec!(20),
            exit_excess: dec!(-20),
            ..GuardConfig::default()
        };
        assert!(flat_exit.validate().is_err());

        // Exit sized against an unfilled entry
        let no_excess = GuardConfig {
            exit_excess: dec!(0),
            ..GuardConfig::default()
        };
        assert!(no_excess.validate().is_err());

        let flatten_only = GuardConfig {
            entry_size: dec!(20),
            exit_excess: dec!(-10),
            ..GuardConfig::default()
        };
        assert!(flatten_only.validate().is_ok());
    }

    #[test]
    fn test_accepted_entry_holds() {
        let mut guard = OrderGuard::new(GuardConfig::default());
        let req = pending_entry(&mut guard);

        guard.on_order(&OrderEvent::accepted(&req));
        assert_eq!(guard.state(), &GuardState::Holding);
        assert_eq!(guard.entries_accepted(), 1);
    }

    #[test]
    fn test_rejected_entry_returns_to_flat() {
        let mut guard = OrderGuard::new(GuardConfig::default());
        let req = pending_entry(&mut guard);

        guard.on_order(&OrderEvent::rejected(&req, "halted"));
        assert_eq!(guard.state(), &GuardState::Flat);
        assert_eq!(guard.entries_accepted(), 0);
    }

    #[test]
    fn test_foreign_event_ignored() {
        let mut guard = OrderGuard::new(GuardConfig::default());
        pending_entry(&mut guard);

        guard.on_order(&OrderEvent::accepted(&request()));
        assert!(matches!(guard.state(), GuardState::EntryPending(_)));
    }

    #[test]
    fn test_exit_rejection_returns_to_holding() {
        let mut guard = OrderGuard::new(GuardConfig::default());
        let req = request();
        guard.state = GuardState::ExitPending(req.id().clone());

        guard.on_order(&OrderEvent::rejected(&req, "no liquidity"));
        assert_eq!(guard.state(), &GuardState::Holding);

        guard.state = GuardState::ExitPending(req.id().clone());
        guard.on_order(&OrderEvent::accepted(&req));
        assert!(guard.is_done());
        assert_eq!(guard.exits_accepted(), 1);
    }

    #[test]
    fn test_fill_does_not_move_state() {
        let mut guard = OrderGuard::new(GuardConfig::default());
        let req = pending_entry(&mut guard);

        guard.on_order(&OrderEvent::filled(&req, req.size(), req.reference_price()));
        assert!(matches!(guard.state(), GuardState::EntryPending(_)));
    }
}
