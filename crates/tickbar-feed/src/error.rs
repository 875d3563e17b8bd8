//! Feed error types.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tickbar_core::{CoreError, FeedId};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Out-of-order event on {feed}: {timestamp} is earlier than {watermark}")]
    OutOfOrderEvent {
        feed: FeedId,
        timestamp: DateTime<Utc>,
        watermark: DateTime<Utc>,
    },

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Unknown feed: {0}")]
    UnknownFeed(FeedId),

    #[error("Invalid feed configuration: {0}")]
    InvalidConfig(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type FeedResult<T> = Result<T, FeedError>;
