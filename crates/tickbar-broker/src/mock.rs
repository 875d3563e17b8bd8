//! Mock broker for testing.

use crate::broker::{BoxFuture, Broker, OrderEvent};
use crate::error::{BrokerError, BrokerResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tickbar_core::{FeedId, OrderId, OrderRequest, Position};
use tokio::sync::mpsc;

/// Scripted result for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Accept and fill at the reference price.
    Fill,
    /// Accept without filling.
    Accept,
    Reject(String),
    Unavailable,
}

/// Mock broker with recorded submissions and scripted outcomes.
///
/// Outcomes are consumed in order; once the script is empty every
/// submission gets the default outcome.
#[derive(Debug)]
pub struct MockBroker {
    submissions: Mutex<Vec<OrderRequest>>,
    script: Mutex<VecDeque<MockOutcome>>,
    default_outcome: Mutex<MockOutcome>,
    positions: Mutex<HashMap<FeedId, Position>>,
    events: mpsc::UnboundedSender<OrderEvent>,
}

impl MockBroker {
    pub fn new(events: mpsc::UnboundedSender<OrderEvent>) -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(MockOutcome::Fill),
            positions: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Queue outcomes for the next submissions.
    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.script.lock().extend(outcomes);
    }

    pub fn set_default_outcome(&self, outcome: MockOutcome) {
        *self.default_outcome.lock() = outcome;
    }

    /// Get recorded submissions.
    pub fn get_submissions(&self) -> Vec<OrderRequest> {
        self.submissions.lock().clone()
    }

    fn next_outcome(&self) -> MockOutcome {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_outcome.lock().clone())
    }
}

impl Broker for MockBroker {
    fn name(&self) -> &str {
        "mock"
    }

    fn submit(&self, request: OrderRequest) -> BoxFuture<'_, BrokerResult<OrderId>> {
        Box::pin(async move {
            self.submissions.lock().push(request.clone());
            match self.next_outcome() {
                MockOutcome::Fill => {
                    let size = request.size();
                    let price = request.reference_price();
                    self.positions
                        .lock()
                        .entry(request.feed())
                        .or_insert_with(|| Position::flat(request.feed()))
                        .apply_fill(size, price);
                    let _ = self.events.send(OrderEvent::filled(&request, size, price));
                    Ok(request.id().clone())
                }
                MockOutcome::Accept => Ok(request.id().clone()),
                MockOutcome::Reject(reason) => Err(BrokerError::OrderRejected {
                    id: request.id().clone(),
                    reason,
                }),
                MockOutcome::Unavailable => {
                    Err(BrokerError::Unavailable("mock broker offline".to_string()))
                }
            }
        })
    }

    fn position(&self, feed: FeedId) -> Position {
        self.positions
            .lock()
            .get(&feed)
            .cloned()
            .unwrap_or_else(|| Position::flat(feed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tickbar_core::{Price, Size};

    fn order() -> OrderRequest {
        OrderRequest::market(FeedId::PRIMARY, Size::new(dec!(20)), Price::new(dec!(100))).unwrap()
    }

    #[tokio::test]
    async fn test_mock_follows_script_then_default() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let broker = MockBroker::new(tx);
        broker.push_outcomes([MockOutcome::Reject("halted".to_string())]);

        assert!(matches!(
            broker.submit(order()).await,
            Err(BrokerError::OrderRejected { .. })
        ));
        assert!(rx.try_recv().is_err());

        assert!(broker.submit(order()).await.is_ok());
        assert!(rx.try_recv().is_ok());
        assert_eq!(broker.get_submissions().len(), 2);
        assert_eq!(broker.position(FeedId::PRIMARY).size, Size::new(dec!(20)));
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let broker = MockBroker::new(tx);
        broker.set_default_outcome(MockOutcome::Unavailable);

        assert!(matches!(
            broker.submit(order()).await,
            Err(BrokerError::Unavailable(_))
        ));
        assert!(broker.position(FeedId::PRIMARY).is_flat());
    }
}
