//! Command-line flags.
//!
//! Every flag is optional and overrides the matching configuration value.

use clap::Parser;

/// Live bar aggregation and strategy runner
#[derive(Parser, Debug, Default, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Configuration file path (can also be set via TICKBAR_CONFIG env var)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Primary data: a symbol for the live source or a path ending in .csv
    #[arg(long)]
    pub data0: Option<String>,

    /// Optional secondary data
    #[arg(long)]
    pub data1: Option<String>,

    /// Live source host
    #[arg(long)]
    pub host: Option<String>,

    /// Live source port
    #[arg(long)]
    pub port: Option<u16>,

    /// Subscribe to real-time bars instead of ticks
    #[arg(long)]
    pub rtbar: bool,

    /// Replay: re-deliver the growing bar on every event
    #[arg(long, conflicts_with = "resample")]
    pub replay: bool,

    /// Resample: deliver each bar once it closes
    #[arg(long)]
    pub resample: bool,

    /// Bars per timeframe unit for resample/replay
    #[arg(long)]
    pub compression: Option<u32>,

    /// Timeframe unit (ticks, seconds, minutes, hours, days)
    #[arg(long)]
    pub timeframe: Option<String>,

    /// Do not snap buckets to the timeframe grid
    #[arg(long)]
    pub nobar2edge: bool,

    /// Keep the last event's timestamp on bars
    #[arg(long)]
    pub noadjbartime: bool,

    /// Label buckets by their start edge
    #[arg(long)]
    pub norightedge: bool,

    /// Moving-average window (also the warm-up length)
    #[arg(long)]
    pub smaperiod: Option<usize>,

    /// Fill orders with the paper broker instead of only observing them
    #[arg(long)]
    pub broker: bool,

    /// Timezone for printed timestamps, e.g. "US/Eastern"
    #[arg(long)]
    pub tz: Option<String>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "tickbar",
            "--data0",
            "ES",
            "--resample",
            "--compression",
            "5",
            "--nobar2edge",
            "--tz",
            "US/Eastern",
        ])
        .unwrap();

        assert_eq!(args.data0.as_deref(), Some("ES"));
        assert!(args.resample);
        assert!(!args.replay);
        assert_eq!(args.compression, Some(5));
        assert!(args.nobar2edge);
        assert_eq!(args.tz.as_deref(), Some("US/Eastern"));
    }

    #[test]
    fn test_replay_and_resample_conflict() {
        let result = Args::try_parse_from(["tickbar", "--replay", "--resample"]);
        assert!(result.is_err());
    }
}
