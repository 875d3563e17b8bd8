//! Application configuration.
//!
//! Loaded from TOML, then overridden by command-line flags, then validated
//! before any feed is created.

use crate::cli::Args;
use crate::error::{AppError, AppResult};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tickbar_broker::PaperBrokerConfig;
use tickbar_core::{TimeFrame, TimeframeSpec};
use tickbar_feed::{AggregationPolicy, FeedConfig};
use tickbar_source::{CsvColumns, StreamKind, WsSourceConfig};
use tickbar_strategy::EntryExitConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TICKBAR_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Data source identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Primary source: a live symbol, or a path ending in `.csv`.
    #[serde(default = "default_data0")]
    pub data0: String,
    #[serde(default)]
    pub data1: Option<String>,
    /// Per-feed event buffer between a source and the runtime.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_data0() -> String {
    "ES".to_string()
}

fn default_channel_buffer() -> usize {
    1024
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data0: default_data0(),
            data1: None,
            channel_buffer: default_channel_buffer(),
        }
    }
}

/// Live source connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Subscribe to server-side real-time bars instead of ticks.
    #[serde(default)]
    pub rtbar: bool,
    /// 0 = retry forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7496
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            rtbar: false,
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

/// Aggregation policy and bucket alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationSettings {
    #[serde(default)]
    pub resample: bool,
    #[serde(default)]
    pub replay: bool,
    #[serde(default)]
    pub timeframe: TimeFrame,
    #[serde(default = "default_compression")]
    pub compression: u32,
    #[serde(default = "default_true")]
    pub bar2edge: bool,
    #[serde(default = "default_true")]
    pub adjbartime: bool,
    #[serde(default = "default_true")]
    pub rightedge: bool,
}

fn default_compression() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            resample: false,
            replay: false,
            timeframe: TimeFrame::Seconds,
            compression: default_compression(),
            bar2edge: true,
            adjbartime: true,
            rightedge: true,
        }
    }
}

/// Broker selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Fill orders with the paper broker; otherwise orders are only observed.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub paper: PaperBrokerConfig,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Verbose logging.
    #[serde(default)]
    pub debug: bool,
    /// Zone for printed timestamps; UTC when unset.
    #[serde(default)]
    pub tz: Option<String>,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub aggregation: AggregationSettings,
    #[serde(default)]
    pub strategy: EntryExitConfig,
    #[serde(default)]
    pub broker: BrokerSettings,
    /// Column layout for `.csv` data.
    #[serde(default)]
    pub csv: CsvColumns,
}

impl AppConfig {
    /// Load configuration: explicit path, then `TICKBAR_CONFIG`, then the
    /// default path. Only an implicit path may be missing.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let config_path =
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply command-line flags on top of file values.
    pub fn apply_args(&mut self, args: &Args) -> AppResult<()> {
        if let Some(data0) = &args.data0 {
            self.data.data0 = data0.clone();
        }
        if let Some(data1) = &args.data1 {
            self.data.data1 = Some(data1.clone());
        }
        if let Some(host) = &args.host {
            self.connection.host = host.clone();
        }
        if let Some(port) = args.port {
            self.connection.port = port;
        }
        if let Some(compression) = args.compression {
            self.aggregation.compression = compression;
        }
        if let Some(timeframe) = &args.timeframe {
            self.aggregation.timeframe = timeframe
                .parse()
                .map_err(|e| AppError::Config(format!("{e}")))?;
        }
        if let Some(period) = args.smaperiod {
            self.strategy.sma_period = period;
        }
        if let Some(tz) = &args.tz {
            self.tz = Some(tz.clone());
        }

        self.connection.rtbar |= args.rtbar;
        self.aggregation.resample |= args.resample;
        self.aggregation.replay |= args.replay;
        self.aggregation.bar2edge &= !args.nobar2edge;
        self.aggregation.adjbartime &= !args.noadjbartime;
        self.aggregation.rightedge &= !args.norightedge;
        self.broker.enabled |= args.broker;
        self.debug |= args.debug;
        Ok(())
    }

    /// Reject contradictory or unusable settings.
    pub fn validate(&self) -> AppResult<()> {
        let agg = &self.aggregation;
        if agg.resample && agg.replay {
            return Err(AppError::Config(
                "resample and replay are mutually exclusive".to_string(),
            ));
        }
        if agg.compression == 0 {
            return Err(AppError::Config("compression must be > 0".to_string()));
        }
        if agg.timeframe == TimeFrame::Ticks && (agg.resample || agg.replay) {
            return Err(AppError::Config(format!(
                "{} needs a time-based timeframe, got ticks",
                self.policy()
            )));
        }
        if self.strategy.sma_period == 0 {
            return Err(AppError::Config("sma_period must be > 0".to_string()));
        }
        if self.data.data0.trim().is_empty() {
            return Err(AppError::Config("data0 must not be empty".to_string()));
        }
        if self.data.channel_buffer == 0 {
            return Err(AppError::Config("channel_buffer must be > 0".to_string()));
        }
        self.timeframe_spec()?;
        self.strategy
            .guard
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        self.timezone()?;
        Ok(())
    }

    #[must_use]
    pub fn policy(&self) -> AggregationPolicy {
        if self.aggregation.replay {
            AggregationPolicy::Replay
        } else if self.aggregation.resample {
            AggregationPolicy::Resample
        } else {
            AggregationPolicy::PassThrough
        }
    }

    pub fn timeframe_spec(&self) -> AppResult<TimeframeSpec> {
        let agg = &self.aggregation;
        let spec = TimeframeSpec::new(agg.timeframe, agg.compression)
            .map_err(|e| AppError::Config(e.to_string()))?
            .with_snap_to_edge(agg.bar2edge)
            .with_adjust_bar_time(agg.adjbartime)
            .with_right_edge_label(agg.rightedge);
        Ok(spec)
    }

    /// Display zone for bar lines.
    pub fn timezone(&self) -> AppResult<Tz> {
        match &self.tz {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| AppError::Config(format!("unknown timezone {name}: {e}"))),
            None => Ok(chrono_tz::UTC),
        }
    }

    /// Source identifiers in feed order.
    #[must_use]
    pub fn data_ids(&self) -> Vec<&str> {
        std::iter::once(self.data.data0.as_str())
            .chain(self.data.data1.as_deref())
            .collect()
    }

    /// One feed per source, all sharing the policy and spec.
    pub fn feed_configs(&self) -> AppResult<Vec<FeedConfig>> {
        let spec = self.timeframe_spec()?;
        let policy = self.policy();
        Ok(self
            .data_ids()
            .into_iter()
            .map(|name| FeedConfig {
                name: name.to_string(),
                policy,
                spec,
            })
            .collect())
    }

    /// Live source settings for one symbol.
    #[must_use]
    pub fn ws_config(&self, symbol: &str) -> WsSourceConfig {
        let conn = &self.connection;
        WsSourceConfig {
            url: format!("ws://{}:{}", conn.host, conn.port),
            symbol: symbol.to_string(),
            stream: if conn.rtbar {
                StreamKind::Bars
            } else {
                StreamKind::Ticks
            },
            max_reconnect_attempts: conn.max_reconnect_attempts,
            reconnect_base_delay_ms: conn.reconnect_base_delay_ms,
            reconnect_max_delay_ms: conn.reconnect_max_delay_ms,
        }
    }
}

/// Whether a data identifier names a CSV file.
#[must_use]
pub fn is_csv_path(id: &str) -> bool {
    id.to_ascii_lowercase().ends_with(".csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(flags: &[&str]) -> Args {
        let mut argv = vec!["tickbar"];
        argv.extend_from_slice(flags);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.data.data0, "ES");
        assert_eq!(config.connection.port, 7496);
        assert_eq!(config.strategy.sma_period, 5);
        assert_eq!(config.policy(), AggregationPolicy::PassThrough);
        assert!(config.aggregation.bar2edge);
        assert!(config.aggregation.adjbartime);
        assert!(config.aggregation.rightedge);
        assert!(!config.broker.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            tz = "US/Eastern"

            [aggregation]
            resample = true
            compression = 5

            [strategy]
            sma_period = 10

            [strategy.guard]
            entry_size = "5"
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.policy(), AggregationPolicy::Resample);
        assert_eq!(config.aggregation.compression, 5);
        assert!(config.aggregation.rightedge);
        assert_eq!(config.strategy.sma_period, 10);
        assert_eq!(config.strategy.guard.entry_size.to_string(), "5");
        assert_eq!(config.strategy.guard.exit_excess.to_string(), "200");
        assert_eq!(config.connection.host, "127.0.0.1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_args_override_file() {
        let mut config = AppConfig::default();
        config.apply_args(&args(&[
            "--data0",
            "NQ",
            "--data1",
            "ES",
            "--replay",
            "--compression",
            "10",
            "--norightedge",
            "--rtbar",
            "--broker",
            "--port",
            "4002",
        ]))
        .unwrap();

        assert_eq!(config.data_ids(), vec!["NQ", "ES"]);
        assert_eq!(config.policy(), AggregationPolicy::Replay);
        assert!(!config.aggregation.rightedge);
        assert!(config.aggregation.bar2edge);
        assert!(config.broker.enabled);

        let ws = config.ws_config("NQ");
        assert_eq!(ws.url, "ws://127.0.0.1:4002");
        assert_eq!(ws.stream, StreamKind::Bars);

        let feeds = config.feed_configs().unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[1].spec.compression, 10);
        assert!(!feeds[1].spec.right_edge_label);
    }

    #[test]
    fn test_resample_with_replay_from_file_and_flag() {
        let mut config = AppConfig::default();
        config.aggregation.resample = true;
        config.apply_args(&args(&["--replay"])).unwrap();

        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.aggregation.compression = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.strategy.sma_period = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.tz = Some("Mars/Olympus".to_string());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.aggregation.timeframe = TimeFrame::Ticks;
        config.aggregation.resample = true;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.data.data0 = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.aggregation.timeframe = TimeFrame::Days;
        config.aggregation.compression = 200_000_000;
        config.aggregation.resample = true;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.aggregation.timeframe = TimeFrame::Days;
        config.aggregation.compression = u32::MAX;
        config.aggregation.bar2edge = false;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.strategy.guard.entry_size = "0".parse().unwrap();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.strategy.guard.exit_excess = -config.strategy.guard.entry_size;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_unknown_timeframe_flag() {
        let mut config = AppConfig::default();
        let err = config.apply_args(&args(&["--timeframe", "weeks"])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_csv_detection() {
        assert!(is_csv_path("data/es.csv"));
        assert!(is_csv_path("ES.CSV"));
        assert!(!is_csv_path("ES"));
    }

    #[test]
    fn test_shipped_default_file_parses() {
        let content = include_str!("../../../config/default.toml");
        let config: AppConfig = toml::from_str(content).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let err = AppConfig::load(Some("/nonexistent/tickbar.toml")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
