//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid or contradictory configuration; fatal before any feed exists.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] tickbar_feed::FeedError),

    #[error("Source error: {0}")]
    Source(#[from] tickbar_source::SourceError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] tickbar_strategy::StrategyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tickbar_telemetry::TelemetryError),
}

pub type AppResult<T> = Result<T, AppError>;
