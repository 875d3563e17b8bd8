//! Core domain types for the tickbar engine.
//!
//! This crate provides fundamental types used throughout the pipeline:
//! - `RawEvent`, `Bar`: market updates and the fixed-timeframe records built from them
//! - `TimeframeSpec`: bucket length and alignment flags
//! - `Price`, `Size`: Precision-safe numeric types
//! - `OrderRequest`, `Position`: what strategies emit and what brokers hold

pub mod bar;
pub mod decimal;
pub mod error;
pub mod order;
pub mod timeframe;
pub mod types;

pub use bar::{Bar, RawEvent};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use order::{OrderId, OrderKind, OrderRequest, OrderSide, Position};
pub use timeframe::{Bucket, TimeFrame, TimeframeSpec, MAX_BUCKET_SECONDS};
pub use types::FeedId;
