//! Paper broker.
//!
//! Fills every accepted order immediately and in full at its reference
//! price. No randomness, no network I/O.

use crate::broker::{BoxFuture, Broker, OrderEvent};
use crate::error::{BrokerError, BrokerResult};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tickbar_core::{FeedId, OrderId, OrderRequest, Position};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Paper broker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperBrokerConfig {
    /// Orders larger than this (absolute size) are rejected.
    #[serde(default)]
    pub max_order_size: Option<Decimal>,
}

/// Deterministic paper broker with per-feed signed positions.
pub struct PaperBroker {
    config: PaperBrokerConfig,
    positions: DashMap<FeedId, Position>,
    events: mpsc::UnboundedSender<OrderEvent>,
    fill_count: AtomicU64,
}

impl PaperBroker {
    /// Create a broker reporting fills on `events`.
    pub fn new(config: PaperBrokerConfig, events: mpsc::UnboundedSender<OrderEvent>) -> Self {
        info!(max_order_size = ?config.max_order_size, "Paper broker created");
        Self {
            config,
            positions: DashMap::new(),
            events,
            fill_count: AtomicU64::new(0),
        }
    }

    /// Number of fills executed so far.
    pub fn fill_count(&self) -> u64 {
        self.fill_count.load(Ordering::SeqCst)
    }

    fn check(&self, request: &OrderRequest) -> BrokerResult<()> {
        if let Some(max) = self.config.max_order_size {
            let size = request.size().abs().inner();
            if size > max {
                return Err(BrokerError::OrderRejected {
                    id: request.id().clone(),
                    reason: format!("size {size} exceeds max order size {max}"),
                });
            }
        }
        Ok(())
    }
}

impl Broker for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    fn submit(&self, request: OrderRequest) -> BoxFuture<'_, BrokerResult<OrderId>> {
        Box::pin(async move {
            if let Err(e) = self.check(&request) {
                warn!(order_id = %request.id(), error = %e, "Paper order rejected");
                return Err(e);
            }

            let size = request.size();
            let price = request.reference_price();
            let position = {
                let mut entry = self
                    .positions
                    .entry(request.feed())
                    .or_insert_with(|| Position::flat(request.feed()));
                entry.apply_fill(size, price);
                entry.value().clone()
            };
            self.fill_count.fetch_add(1, Ordering::SeqCst);

            debug!(
                order_id = %request.id(),
                feed = %request.feed(),
                %size,
                %price,
                position = %position.size,
                "Paper fill"
            );

            if self
                .events
                .send(OrderEvent::filled(&request, size, price))
                .is_err()
            {
                warn!(order_id = %request.id(), "Order event receiver dropped");
            }
            Ok(request.id().clone())
        })
    }

    fn position(&self, feed: FeedId) -> Position {
        self.positions
            .get(&feed)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| Position::flat(feed))
    }
}
