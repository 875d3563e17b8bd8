//! Main application orchestration.
//!
//! Wires the configured sources, the broker and the sample strategy into a
//! [`StrategyRuntime`], then runs until the primary data is exhausted or
//! the process is interrupted.

use crate::config::{is_csv_path, AppConfig};
use crate::error::AppResult;
use std::io::Write;
use std::sync::Arc;
use tickbar_broker::{DynBroker, ObservationBroker, PaperBroker};
use tickbar_core::FeedId;
use tickbar_source::{spawn_source, CsvSource, EventSource, SourceHandle, WsSource};
use tickbar_strategy::{BarLineWriter, EntryExitStrategy, RunSummary, StrategyRuntime};
use tickbar_telemetry::RunStatsReporter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    /// Create a new application from a validated configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run with bar lines on stdout until exhausted or Ctrl+C.
    pub async fn run(self) -> AppResult<RunSummary> {
        let shutdown = CancellationToken::new();

        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received shutdown signal");
                    signal_token.cancel();
                }
                Err(e) => error!(?e, "Failed to listen for shutdown signal"),
            }
        });

        let (summary, mut out) = self.run_with_output(std::io::stdout(), shutdown).await?;
        out.flush()?;
        Ok(summary)
    }

    /// Run writing bar lines to `out`; returns the summary and the writer.
    pub async fn run_with_output<W: Write + Send>(
        self,
        out: W,
        shutdown: CancellationToken,
    ) -> AppResult<(RunSummary, W)> {
        let config = self.config;
        let feeds = config.feed_configs()?;
        let tz = config.timezone()?;

        info!(
            data0 = %config.data.data0,
            data1 = ?config.data.data1,
            policy = %config.policy(),
            timeframe = %config.aggregation.timeframe,
            compression = config.aggregation.compression,
            paper_broker = config.broker.enabled,
            "Starting run"
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let broker: DynBroker = if config.broker.enabled {
            Arc::new(PaperBroker::new(config.broker.paper.clone(), events_tx))
        } else {
            // Never fills
            drop(events_tx);
            Arc::new(ObservationBroker::new())
        };

        let writer = BarLineWriter::new(out, tz);
        let strategy = EntryExitStrategy::new(config.strategy.clone(), writer)?;
        let mut runtime = StrategyRuntime::new(feeds, strategy, broker, events_rx)?;

        let sources = spawn_sources(&config, &shutdown)?;
        let reporter = RunStatsReporter::new(
            (0..sources.len())
                .map(|i| FeedId::new(i).to_string())
                .collect(),
        );

        let result = runtime.run(sources, shutdown.clone()).await;
        // Stops any source still running when the runtime bails out early
        shutdown.cancel();
        let summary = result?;

        reporter.output_summary();
        info!(
            stop_reason = ?summary.stop_reason,
            advances = summary.advances,
            warmup_advances = summary.warmup_advances,
            orders_accepted = summary.orders_accepted,
            orders_rejected = summary.orders_rejected,
            fills = summary.fills,
            "Run finished"
        );

        let out = runtime.into_strategy().into_writer().into_inner();
        Ok((summary, out))
    }
}

/// Spawn one source task per configured data identifier, in feed order.
fn spawn_sources(config: &AppConfig, shutdown: &CancellationToken) -> AppResult<Vec<SourceHandle>> {
    config
        .data_ids()
        .into_iter()
        .enumerate()
        .map(|(i, id)| -> AppResult<SourceHandle> {
            let source: Box<dyn EventSource> = if is_csv_path(id) {
                Box::new(CsvSource::open(id, config.csv.clone())?)
            } else {
                Box::new(WsSource::new(config.ws_config(id)))
            };
            Ok(spawn_source(
                FeedId::new(i),
                source,
                config.data.channel_buffer,
                shutdown.clone(),
            ))
        })
        .collect()
}
