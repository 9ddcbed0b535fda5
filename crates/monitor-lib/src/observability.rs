//! Observability infrastructure for the cluster monitor
//!
//! Provides:
//! - Prometheus metrics (poll latency, poll errors, slow polls, active feeds)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default histogram buckets for poll latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    poll_latency_seconds: Histogram,
    poll_errors: IntCounter,
    slow_polls: IntCounter,
    discarded_polls: IntCounter,
    listener_failures: IntCounter,
    feeds_active: IntGauge,
    buffered_samples: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            poll_latency_seconds: register_histogram!(
                "cluster_monitor_poll_latency_seconds",
                "Time spent running a feed query against a cluster member",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register poll_latency_seconds"),

            poll_errors: register_int_counter!(
                "cluster_monitor_poll_errors_total",
                "Total number of failed feed polls"
            )
            .expect("Failed to register poll_errors"),

            slow_polls: register_int_counter!(
                "cluster_monitor_slow_polls_total",
                "Total number of polls that took longer than the feed rate"
            )
            .expect("Failed to register slow_polls"),

            discarded_polls: register_int_counter!(
                "cluster_monitor_discarded_polls_total",
                "Poll results dropped because the feed was stopped or restarted"
            )
            .expect("Failed to register discarded_polls"),

            listener_failures: register_int_counter!(
                "cluster_monitor_listener_failures_total",
                "Total number of feed listeners that returned an error or panicked"
            )
            .expect("Failed to register listener_failures"),

            feeds_active: register_int_gauge!(
                "cluster_monitor_feeds_active",
                "Number of feeds currently registered"
            )
            .expect("Failed to register feeds_active"),

            buffered_samples: register_int_gauge!(
                "cluster_monitor_buffered_samples",
                "Number of samples held across all feed buffers"
            )
            .expect("Failed to register buffered_samples"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MonitorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MonitorMetrics")
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_poll_latency(&self, elapsed: Duration) {
        self.inner()
            .poll_latency_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn inc_poll_errors(&self) {
        self.inner().poll_errors.inc();
    }

    pub fn inc_slow_polls(&self) {
        self.inner().slow_polls.inc();
    }

    pub fn inc_discarded_polls(&self) {
        self.inner().discarded_polls.inc();
    }

    pub fn inc_listener_failures(&self) {
        self.inner().listener_failures.inc();
    }

    /// Update registry-wide gauges
    pub fn set_feed_totals(&self, feeds: i64, samples: i64) {
        self.inner().feeds_active.set(feeds);
        self.inner().buffered_samples.set(samples);
    }
}

/// Structured logger for monitor events
///
/// Provides consistent JSON-formatted logging for feed lifecycle
/// and poll outcomes.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_feed_started(&self, feed: &str, target: &str, rate: Duration, capacity: usize) {
        info!(
            event = "feed_started",
            instance = %self.instance,
            feed = %feed,
            target = %target,
            rate_ms = rate.as_millis() as u64,
            capacity = capacity,
            "Feed started"
        );
    }

    pub fn log_feed_stopped(&self, feed: &str, target: &str) {
        info!(
            event = "feed_stopped",
            instance = %self.instance,
            feed = %feed,
            target = %target,
            "Feed stopped"
        );
    }

    pub fn log_feed_evicted(&self, feed: &str, idle_secs: u64) {
        debug!(
            event = "feed_evicted",
            instance = %self.instance,
            feed = %feed,
            idle_secs = idle_secs,
            "Idle feed evicted"
        );
    }

    pub fn log_poll_failed(&self, feed: &str, target: &str, error: &str, consecutive: u64) {
        warn!(
            event = "poll_failed",
            instance = %self.instance,
            feed = %feed,
            target = %target,
            error = %error,
            consecutive_failures = consecutive,
            "Feed poll failed, backing off"
        );
    }

    pub fn log_listener_failed(&self, feed: &str, error: &str) {
        warn!(
            event = "listener_failed",
            instance = %self.instance,
            feed = %feed,
            error = %error,
            "Feed listener failed"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            event = "diagnostic_warning",
            instance = %self.instance,
            "{}",
            message
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, members: usize, feeds: usize) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            members = members,
            feeds = feeds,
            "Cluster monitor started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Cluster monitor shutting down"
        );
    }
}
