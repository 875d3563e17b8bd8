//! tickbar - live bar aggregation and strategy runner.
//!
//! Reads one or two feeds (live symbols or CSV files), aggregates them into
//! bars, runs the entry/exit sample strategy and prints one line per feed
//! per bar on stdout.

use anyhow::Result;
use clap::Parser;
use tickbar_bot::{AppConfig, Application, Args};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config first so its debug flag can raise the log level
    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_args(&args)?;

    tickbar_telemetry::init_logging(config.debug)?;
    info!("Starting tickbar v{}", env!("CARGO_PKG_VERSION"));
    info!(
        data0 = %config.data.data0,
        data1 = ?config.data.data1,
        policy = %config.policy(),
        "Configuration loaded"
    );

    let app = Application::new(config)?;
    let summary = app.run().await?;

    info!(stop_reason = ?summary.stop_reason, "Shutdown complete");
    Ok(())
}
