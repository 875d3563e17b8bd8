//! Observability for tickbar.
//!
//! - Structured logging with tracing (pretty for development, JSON in production)
//! - Prometheus counters for events, bars, stalls and orders
//! - End-of-run statistics summary

pub mod error;
pub mod logging;
pub mod metrics;
pub mod run_stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use run_stats::{FeedRunStats, OrderRunStats, RunStatsReporter};
