//! Engine Metrics
//!
//! Counters, gauges and histograms for the pad engine:
//! - commands emitted, in total and per command kind
//! - haptic requests
//! - timers fired and stale timer firings
//! - gesture durations (pointer down to pointer up)
//! - event handling latency under the realtime driver
//!
//! The collector is shared behind an `Arc` and guarded by `parking_lot`
//! locks, so the CLI can read a snapshot while the driver task is running.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector for the pad engine
pub struct MetricsCollector {
    counters: Arc<RwLock<HashMap<String, u64>>>,
    gauges: Arc<RwLock<HashMap<String, f64>>>,
    histograms: Arc<RwLock<HashMap<String, Histogram>>>,
    start_time: Instant,
}

impl MetricsCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            gauges: Arc::new(RwLock::new(HashMap::new())),
            histograms: Arc::new(RwLock::new(HashMap::new())),
            start_time: Instant::now(),
        }
    }

    /// Add `value` to a counter
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut counters = self.counters.write();
        *counters.entry(name.to_string()).or_insert(0) += value;
    }

    /// Set a gauge
    pub fn set_gauge(&self, name: &str, value: f64) {
        self.gauges.write().insert(name.to_string(), value);
    }

    /// Record one observation
    pub fn record_histogram(&self, name: &str, value: f64) {
        self.histograms
            .write()
            .entry(name.to_string())
            .or_default()
            .record(value);
    }

    /// Counter value
    pub fn get_counter(&self, name: &str) -> Option<u64> {
        self.counters.read().get(name).copied()
    }

    /// Gauge value
    pub fn get_gauge(&self, name: &str) -> Option<f64> {
        self.gauges.read().get(name).copied()
    }

    /// Histogram statistics
    pub fn get_histogram(&self, name: &str) -> Option<HistogramStats> {
        self.histograms.read().get(name).map(Histogram::stats)
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            counters: self.counters.read().clone(),
            gauges: self.gauges.read().clone(),
            histograms: self
                .histograms
                .read()
                .iter()
                .map(|(name, histogram)| (name.clone(), histogram.stats()))
                .collect(),
        }
    }

    /// Drop every metric
    pub fn reset(&self) {
        self.counters.write().clear();
        self.gauges.write().clear();
        self.histograms.write().clear();
    }

    /// Plain text report, one metric per line, sorted by name
    pub fn export_text(&self) -> String {
        let snapshot = self.snapshot();
        let mut lines = Vec::new();

        for (name, value) in &snapshot.counters {
            lines.push(format!("{} {}", name, value));
        }
        for (name, value) in &snapshot.gauges {
            lines.push(format!("{} {}", name, value));
        }
        for (name, stats) in &snapshot.histograms {
            lines.push(format!(
                "{} count={} min={} max={} mean={:.2} p50={} p95={}",
                name, stats.count, stats.min, stats.max, stats.mean, stats.p50, stats.p95
            ));
        }

        lines.sort();
        let mut output = lines.join("\n");
        output.push('\n');
        output
    }

    /// Snapshot as pretty JSON
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Recorded observations of one metric
#[derive(Debug, Default)]
pub struct Histogram {
    values: Vec<f64>,
    sum: f64,
}

impl Histogram {
    fn record(&mut self, value: f64) {
        self.values.push(value);
        self.sum += value;
    }

    fn stats(&self) -> HistogramStats {
        if self.values.is_empty() {
            return HistogramStats::default();
        }

        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = self.sum / count as f64;

        HistogramStats {
            count: count as u64,
            sum: self.sum,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
        }
    }
}

/// Inclusive percentile of sorted values (p=0 is the first, p=1 the last)
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let index = ((sorted_values.len() - 1) as f64 * p) as usize;
    sorted_values[index.min(sorted_values.len() - 1)]
}

/// Histogram statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramStats {
    /// Number of observations
    pub count: u64,
    /// Sum of observations
    pub sum: f64,
    /// Smallest observation
    pub min: f64,
    /// Largest observation
    pub max: f64,
    /// Mean
    pub mean: f64,
    /// Median
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

/// Point-in-time snapshot of all metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Time since the collector was created
    pub uptime: Duration,
    /// Counter values
    pub counters: HashMap<String, u64>,
    /// Gauge values
    pub gauges: HashMap<String, f64>,
    /// Histogram statistics
    pub histograms: HashMap<String, HistogramStats>,
}

pub mod metric_names {
    //! Metric names shared by the engine, the driver and the CLI.

    /// Events handled by the pad
    pub const EVENTS_RECEIVED: &str = "events_received_total";
    /// Events rejected with an error
    pub const EVENT_ERRORS: &str = "event_errors_total";
    /// Commands sent to the transport
    pub const COMMANDS_SENT: &str = "commands_sent_total";
    /// Haptic requests sent to the transport
    pub const HAPTICS_REQUESTED: &str = "haptics_requested_total";
    /// Timers popped from the queue
    pub const TIMERS_FIRED: &str = "timers_fired_total";
    /// Timer firings that found their context gone
    pub const TIMERS_STALE: &str = "timers_stale_total";

    /// Pointers currently on the trackpad
    pub const POINTERS_ACTIVE: &str = "pointers_active";
    /// Timers currently pending
    pub const TIMERS_PENDING: &str = "timers_pending";

    /// Pointer down to pointer up (milliseconds)
    pub const GESTURE_DURATION_MS: &str = "gesture_duration_ms";
    /// Wall-clock time spent handling one event (microseconds)
    pub const EVENT_HANDLING_US: &str = "event_handling_us";

    /// Counter name for one command kind, e.g. `commands_click_total`
    pub fn command_counter(kind: &str) -> String {
        format!("commands_{}_total", kind)
    }
}

/// Wall-clock stopwatch
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Elapsed microseconds
    pub fn elapsed_us(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1_000_000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let metrics = MetricsCollector::new();

        metrics.increment_counter(metric_names::COMMANDS_SENT, 1);
        metrics.increment_counter(metric_names::COMMANDS_SENT, 4);
        assert_eq!(metrics.get_counter(metric_names::COMMANDS_SENT), Some(5));
        assert_eq!(metrics.get_counter("missing"), None);
    }

    #[test]
    fn test_gauge() {
        let metrics = MetricsCollector::new();

        metrics.set_gauge(metric_names::POINTERS_ACTIVE, 2.0);
        metrics.set_gauge(metric_names::POINTERS_ACTIVE, 1.0);
        assert_eq!(metrics.get_gauge(metric_names::POINTERS_ACTIVE), Some(1.0));
    }

    #[test]
    fn test_histogram() {
        let metrics = MetricsCollector::new();

        for value in [80.0, 520.0, 120.0] {
            metrics.record_histogram(metric_names::GESTURE_DURATION_MS, value);
        }

        let stats = metrics
            .get_histogram(metric_names::GESTURE_DURATION_MS)
            .unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 80.0);
        assert_eq!(stats.max, 520.0);
        assert_eq!(stats.p50, 120.0);
        assert!((stats.mean - 240.0).abs() < 0.01);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = MetricsCollector::new();
        metrics.increment_counter("a", 10);
        metrics.set_gauge("b", 42.0);
        metrics.record_histogram("c", 5.0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.counters.get("a"), Some(&10));
        assert_eq!(snapshot.gauges.get("b"), Some(&42.0));
        assert!(snapshot.histograms.contains_key("c"));

        metrics.reset();
        assert_eq!(metrics.get_counter("a"), None);
        assert_eq!(metrics.get_gauge("b"), None);
        assert_eq!(metrics.get_histogram("c"), None);
    }

    #[test]
    fn test_text_export_sorted() {
        let metrics = MetricsCollector::new();
        metrics.increment_counter("timers_fired_total", 3);
        metrics.increment_counter("commands_sent_total", 7);

        let output = metrics.export_text();
        assert_eq!(output, "commands_sent_total 7\ntimers_fired_total 3\n");
    }

    #[test]
    fn test_json_export() {
        let metrics = MetricsCollector::new();
        metrics.increment_counter(&metric_names::command_counter("scroll"), 1);

        let json = metrics.export_json().unwrap();
        assert!(json.contains("\"commands_scroll_total\""));
    }

    #[test]
    fn test_percentile() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];

        assert_eq!(percentile(&values, 0.50), 5.0);
        assert_eq!(percentile(&values, 0.95), 9.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }
}
