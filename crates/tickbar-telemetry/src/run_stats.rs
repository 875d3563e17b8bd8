//! End-of-run statistics.
//!
//! Reads the process counters in [`crate::metrics`] and logs a summary:
//! - raw events, out-of-order rejections, bars and stalls per feed
//! - order outcomes

use crate::metrics::{
    BARS_TOTAL, CALLBACKS_TOTAL, ORDERS_TOTAL, OUT_OF_ORDER_TOTAL, RAW_EVENTS_TOTAL, STALLS_TOTAL,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Statistics for one feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedRunStats {
    pub feed: String,
    pub raw_events: u64,
    pub out_of_order: u64,
    pub bars_closed: u64,
    pub bars_updated: u64,
    pub stalls: u64,
}

/// Order outcomes and callback counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderRunStats {
    pub accepted: u64,
    pub rejected: u64,
    pub filled: u64,
    pub warmup_callbacks: u64,
    pub steady_callbacks: u64,
}

/// Run statistics reporter.
pub struct RunStatsReporter {
    feeds: Vec<String>,
    start_time: DateTime<Utc>,
}

impl RunStatsReporter {
    pub fn new(feeds: Vec<String>) -> Self {
        Self {
            feeds,
            start_time: Utc::now(),
        }
    }

    pub fn feed_stats(&self) -> Vec<FeedRunStats> {
        self.feeds
            .iter()
            .map(|feed| FeedRunStats {
                feed: feed.clone(),
                raw_events: counter(&RAW_EVENTS_TOTAL, &[feed]),
                out_of_order: counter(&OUT_OF_ORDER_TOTAL, &[feed]),
                bars_closed: counter(&BARS_TOTAL, &[feed, "closed"]),
                bars_updated: counter(&BARS_TOTAL, &[feed, "updated"]),
                stalls: counter(&STALLS_TOTAL, &[feed]),
            })
            .collect()
    }

    pub fn order_stats(&self) -> OrderRunStats {
        OrderRunStats {
            accepted: counter(&ORDERS_TOTAL, &["accepted"]),
            rejected: counter(&ORDERS_TOTAL, &["rejected"]),
            filled: counter(&ORDERS_TOTAL, &["filled"]),
            warmup_callbacks: counter(&CALLBACKS_TOTAL, &["warmup"]),
            steady_callbacks: counter(&CALLBACKS_TOTAL, &["steady"]),
        }
    }

    /// Output the run summary to logs.
    pub fn output_summary(&self) {
        let duration = Utc::now() - self.start_time;

        info!("============== Run Statistics ==============");
        info!(
            "Period: {} ({} s)",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
            duration.num_seconds()
        );

        for s in self.feed_stats() {
            info!("--- {} ---", s.feed);
            info!(
                "  Raw events: {} (out of order: {})",
                s.raw_events, s.out_of_order
            );
            info!(
                "  Bars: {} closed, {} replay updates",
                s.bars_closed, s.bars_updated
            );
            info!("  Stalls: {}", s.stalls);
        }

        let orders = self.order_stats();
        info!(
            "Callbacks: {} warm-up, {} steady-state",
            orders.warmup_callbacks, orders.steady_callbacks
        );
        info!(
            "Orders: {} accepted, {} rejected, {} filled",
            orders.accepted, orders.rejected, orders.filled
        );
        info!("============================================");
    }
}

fn counter(vec: &prometheus::CounterVec, labels: &[&str]) -> u64 {
    vec.with_label_values(labels).get() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;

    #[test]
    fn test_feed_stats_read_counters() {
        let feed = "run_stats_test_feed";
        Metrics::raw_event(feed);
        Metrics::raw_event(feed);
        Metrics::raw_event(feed);
        Metrics::bar(feed, true);
        Metrics::feed_stalled(feed, true);

        let reporter = RunStatsReporter::new(vec![feed.to_string()]);
        let stats = reporter.feed_stats();

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].raw_events, 3);
        assert_eq!(stats[0].bars_closed, 1);
        assert_eq!(stats[0].bars_updated, 0);
        assert_eq!(stats[0].stalls, 1);
    }

    #[test]
    fn test_unknown_feed_is_zero() {
        let reporter = RunStatsReporter::new(vec!["run_stats_never_seen".to_string()]);
        let stats = reporter.feed_stats();
        assert_eq!(stats[0].raw_events, 0);
        assert_eq!(stats[0].out_of_order, 0);

        reporter.output_summary();
    }
}
