//! Broker error types.

use thiserror::Error;
use tickbar_core::OrderId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Order {id} rejected: {reason}")]
    OrderRejected { id: OrderId, reason: String },

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
