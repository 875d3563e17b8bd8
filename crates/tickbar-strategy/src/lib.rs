//! Strategy runtime for tickbar.
//!
//! Drives the two-phase callback protocol (warm-up, then steady state)
//! over synchronized feeds:
//! - `StrategyRuntime`: event loop from sources to callbacks to the broker
//! - `Strategy`, `StrategyContext`: the callback interface
//! - `Indicator`, `Sma`: windowed values with a NaN sentinel
//! - `OrderGuard`: one accepted entry, one accepted exit per run
//! - `EntryExitStrategy`, `BarLineWriter`: the sample strategy and its output

pub mod context;
pub mod error;
pub mod guard;
pub mod indicator;
pub mod output;
pub mod runtime;
pub mod sample;
pub mod strategy;

pub use context::StrategyContext;
pub use error::{StrategyError, StrategyResult};
pub use guard::{GuardConfig, GuardState, OrderGuard};
pub use indicator::{Indicator, IndicatorValue, Sma};
pub use output::BarLineWriter;
pub use runtime::{RunSummary, StopReason, StrategyRuntime};
pub use sample::{EntryExitConfig, EntryExitStrategy};
pub use strategy::Strategy;
