//! tickbar runner.
//!
//! Wires the pieces into one process:
//! - CLI flags and TOML configuration
//! - One source per feed (CSV file or live WebSocket)
//! - Paper or observation broker
//! - The sample entry/exit strategy writing bar lines to stdout

pub mod app;
pub mod cli;
pub mod config;
pub mod error;

pub use app::Application;
pub use cli::Args;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
