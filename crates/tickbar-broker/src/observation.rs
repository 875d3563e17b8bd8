//! Observation-only broker: orders are accepted and logged, never filled.

use crate::broker::{BoxFuture, Broker};
use crate::error::BrokerResult;
use parking_lot::Mutex;
use tickbar_core::{FeedId, OrderId, OrderRequest, Position};
use tracing::info;

#[derive(Debug, Default)]
pub struct ObservationBroker {
    orders: Mutex<Vec<OrderRequest>>,
}

impl ObservationBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders seen so far.
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().clone()
    }
}

impl Broker for ObservationBroker {
    fn name(&self) -> &str {
        "observation"
    }

    fn submit(&self, request: OrderRequest) -> BoxFuture<'_, BrokerResult<OrderId>> {
        Box::pin(async move {
            info!(
                order_id = %request.id(),
                feed = %request.feed(),
                side = %request.side(),
                size = %request.size(),
                kind = %request.kind(),
                price = %request.reference_price(),
                "Order observed (not routed)"
            );
            let id = request.id().clone();
            self.orders.lock().push(request);
            Ok(id)
        })
    }

    fn position(&self, feed: FeedId) -> Position {
        Position::flat(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tickbar_core::{Price, Size};

    #[tokio::test]
    async fn test_records_without_position() {
        let broker = ObservationBroker::new();
        let req = OrderRequest::market(FeedId::PRIMARY, Size::new(dec!(20)), Price::new(dec!(99)))
            .unwrap();

        assert!(broker.submit(req).await.is_ok());
        assert_eq!(broker.orders().len(), 1);
        assert!(broker.position(FeedId::PRIMARY).is_flat());
    }
}
