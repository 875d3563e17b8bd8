//! Error types for tickbar-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid bar: {0}")]
    InvalidBar(String),

    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
