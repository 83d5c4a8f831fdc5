//! Utility Functions
//!
//! Engine metrics and user-friendly error formatting.
//!
//! ## Metrics
//!
//! The [`metrics`] module tracks engine statistics:
//!
//! ```rust
//! use lamco_remote_pad::utils::{metric_names, MetricsCollector};
//!
//! let metrics = MetricsCollector::new();
//! metrics.increment_counter(metric_names::EVENTS_RECEIVED, 1);
//! metrics.record_histogram(metric_names::GESTURE_DURATION_MS, 120.0);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.counters[metric_names::EVENTS_RECEIVED], 1);
//! ```
//!
//! ## Error Formatting
//!
//! The [`errors`] module turns an error chain into a boxed message with
//! troubleshooting hints for configuration, keyboard table, element and
//! script problems.

pub mod errors;
pub mod metrics;

pub use errors::format_user_error;
pub use metrics::{metric_names, HistogramStats, MetricsCollector, MetricsSnapshot, Timer};
