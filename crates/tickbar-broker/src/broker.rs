//! Broker trait and order notifications.

use crate::error::BrokerResult;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tickbar_core::{FeedId, OrderId, OrderRequest, Position, Price, Size};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Lifecycle step of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Accepted,
    Rejected { reason: String },
    /// Signed fill size and execution price.
    Filled { size: Size, price: Price },
}

/// Notification delivered to the strategy before its next callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: OrderId,
    pub feed: FeedId,
    pub status: OrderStatus,
}

impl OrderEvent {
    pub fn accepted(request: &OrderRequest) -> Self {
        Self {
            order_id: request.id().clone(),
            feed: request.feed(),
            status: OrderStatus::Accepted,
        }
    }

    pub fn rejected(request: &OrderRequest, reason: impl Into<String>) -> Self {
        Self {
            order_id: request.id().clone(),
            feed: request.feed(),
            status: OrderStatus::Rejected {
                reason: reason.into(),
            },
        }
    }

    pub fn filled(request: &OrderRequest, size: Size, price: Price) -> Self {
        Self {
            order_id: request.id().clone(),
            feed: request.feed(),
            status: OrderStatus::Filled { size, price },
        }
    }
}

/// Order-taking collaborator.
///
/// `submit` resolves to the accepted order's id or
/// [`BrokerError::OrderRejected`](crate::BrokerError::OrderRejected).
/// Acceptance and rejection are reported through that result; fills arrive
/// later on the broker's event channel.
pub trait Broker: Send + Sync {
    /// Name shown in logs.
    fn name(&self) -> &str;

    /// Submit an order request.
    fn submit(&self, request: OrderRequest) -> BoxFuture<'_, BrokerResult<OrderId>>;

    /// Current position on a feed's instrument; flat when unknown.
    fn position(&self, feed: FeedId) -> Position;
}

/// Arc wrapper for Broker trait objects.
pub type DynBroker = Arc<dyn Broker>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_carries_request_identity() {
        let req = OrderRequest::market(FeedId::PRIMARY, Size::new(dec!(20)), Price::new(dec!(100)))
            .unwrap();

        let ev = OrderEvent::rejected(&req, "no margin");
        assert_eq!(&ev.order_id, req.id());
        assert_eq!(ev.feed, FeedId::PRIMARY);
        assert_eq!(
            ev.status,
            OrderStatus::Rejected {
                reason: "no margin".to_string()
            }
        );
    }
}
