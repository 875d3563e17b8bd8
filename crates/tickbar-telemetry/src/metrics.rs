//! Prometheus metrics for the tickbar pipeline.
//!
//! Counters are process-global and labelled by feed name (`data0`, `data1`)
//! or by order outcome.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a programming error surfaced on first use.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};

/// Raw events accepted by an aggregator.
pub static RAW_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickbar_raw_events_total",
        "Raw events accepted per feed",
        &["feed"]
    )
    .unwrap()
});

/// Raw events rejected for arriving behind the feed watermark.
pub static OUT_OF_ORDER_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickbar_out_of_order_total",
        "Raw events rejected as out of order",
        &["feed"]
    )
    .unwrap()
});

/// Bars delivered downstream.
/// Labels: feed, kind (closed/updated)
pub static BARS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickbar_bars_total",
        "Bars delivered per feed",
        &["feed", "kind"]
    )
    .unwrap()
});

/// Transport failures that stalled a feed.
pub static STALLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickbar_feed_stalls_total",
        "Transport failures per feed",
        &["feed"]
    )
    .unwrap()
});

/// Current stall state (1 = stalled).
pub static FEED_STALLED: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "tickbar_feed_stalled",
        "Feed stall state (1=stalled)",
        &["feed"]
    )
    .unwrap()
});

/// Strategy callbacks.
/// Labels: phase (warmup/steady)
pub static CALLBACKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickbar_callbacks_total",
        "Strategy callbacks by phase",
        &["phase"]
    )
    .unwrap()
});

/// Callback wall time in milliseconds.
pub static CALLBACK_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tickbar_callback_duration_ms",
        "Strategy callback duration in milliseconds",
        &["phase"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0]
    )
    .unwrap()
});

/// Order outcomes.
/// Labels: outcome (accepted/rejected/filled)
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickbar_orders_total",
        "Orders by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Metrics helper for recording.
pub struct Metrics;

impl Metrics {
    pub fn raw_event(feed: &str) {
        RAW_EVENTS_TOTAL.with_label_values(&[feed]).inc();
    }

    pub fn out_of_order(feed: &str) {
        OUT_OF_ORDER_TOTAL.with_label_values(&[feed]).inc();
    }

    /// Record a delivered bar; `closed` is false for replay updates.
    pub fn bar(feed: &str, closed: bool) {
        let kind = if closed { "closed" } else { "updated" };
        BARS_TOTAL.with_label_values(&[feed, kind]).inc();
    }

    /// Record a stall transition.
    pub fn feed_stalled(feed: &str, stalled: bool) {
        if stalled {
            STALLS_TOTAL.with_label_values(&[feed]).inc();
        }
        FEED_STALLED
            .with_label_values(&[feed])
            .set(if stalled { 1.0 } else { 0.0 });
    }

    pub fn callback(warmup: bool, duration_ms: f64) {
        let phase = if warmup { "warmup" } else { "steady" };
        CALLBACKS_TOTAL.with_label_values(&[phase]).inc();
        CALLBACK_DURATION_MS
            .with_label_values(&[phase])
            .observe(duration_ms);
    }

    pub fn order_accepted() {
        ORDERS_TOTAL.with_label_values(&["accepted"]).inc();
    }

    pub fn order_rejected() {
        ORDERS_TOTAL.with_label_values(&["rejected"]).inc();
    }

    pub fn order_filled() {
        ORDERS_TOTAL.with_label_values(&["filled"]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_counters() {
        let feed = "metrics_test_feed";
        Metrics::raw_event(feed);
        Metrics::raw_event(feed);
        Metrics::out_of_order(feed);
        Metrics::bar(feed, true);
        Metrics::bar(feed, false);

        assert_eq!(RAW_EVENTS_TOTAL.with_label_values(&[feed]).get(), 2.0);
        assert_eq!(OUT_OF_ORDER_TOTAL.with_label_values(&[feed]).get(), 1.0);
        assert_eq!(BARS_TOTAL.with_label_values(&[feed, "closed"]).get(), 1.0);
        assert_eq!(BARS_TOTAL.with_label_values(&[feed, "updated"]).get(), 1.0);
    }

    #[test]
    fn test_stall_gauge_follows_state() {
        let feed = "metrics_test_stall";
        Metrics::feed_stalled(feed, true);
        assert_eq!(FEED_STALLED.with_label_values(&[feed]).get(), 1.0);

        Metrics::feed_stalled(feed, false);
        assert_eq!(FEED_STALLED.with_label_values(&[feed]).get(), 0.0);
        assert_eq!(STALLS_TOTAL.with_label_values(&[feed]).get(), 1.0);
    }
}
