//! Strategy error types.

use thiserror::Error;
use tickbar_core::CoreError;
use tickbar_feed::FeedError;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid strategy configuration: {0}")]
    InvalidConfig(String),

    #[error("Orders cannot be submitted during warm-up")]
    OrderDuringWarmup,
}

pub type StrategyResult<T> = Result<T, StrategyError>;
