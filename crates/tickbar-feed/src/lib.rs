//! Bar aggregation and feed synchronization for tickbar.
//!
//! Turns per-feed RawEvent streams into fixed-timeframe bars under a
//! pass-through, resample or replay policy, and keeps a consistent
//! "current bar" per feed aligned to the primary feed's cadence.

pub mod aggregator;
pub mod error;
pub mod feed;
pub mod synchronizer;

pub use aggregator::{AggregationPolicy, BarAggregator, BarUpdate};
pub use error::{FeedError, FeedResult};
pub use feed::Feed;
pub use synchronizer::{Advance, FeedConfig, FeedSynchronizer};
