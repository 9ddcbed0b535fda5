//! The polling feed
//!
//! A feed runs one query against one member on a fixed cadence, keeps a
//! bounded history of timestamped samples and broadcasts every poll outcome
//! to its listeners. Scheduling is a spawned Tokio task per run; stopping a
//! feed drops the task's cancel channel and bumps a generation counter so a
//! query still in flight is discarded when it returns.

use super::key::FeedKey;
use super::ring::RingBuffer;
use super::transform::{self, AliasMap, AugmentFn};
use crate::diagnostics::{self, DiagnosticsSink, ErrorContext, ErrorSource};
use crate::member::ClusterMember;
use crate::models::{DisplayColumn, Observation, Params, Sample};
use crate::observability::{MonitorMetrics, StructuredLogger};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Callback invoked with the feed's state after every poll
pub type Listener = Arc<dyn Fn(&FeedState, &Feed) -> anyhow::Result<()> + Send + Sync>;

/// Read-only snapshot of a feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedState {
    /// Latest observation, if any poll has succeeded
    pub data: Option<Observation>,
    /// Timestamp of the latest observation
    pub timestamp: Option<DateTime<Utc>>,
    /// Buffered history, oldest first
    pub samples: Vec<Sample>,
    pub feed_start_time: Option<DateTime<Utc>>,
    pub last_data_arrived: Option<DateTime<Utc>>,
    pub last_elapsed_ms: Option<u64>,
}

impl FeedState {
    /// True when no data has arrived within `expected` of `now`
    pub fn is_stale(&self, now: DateTime<Utc>, expected: Duration) -> bool {
        match self.last_data_arrived {
            Some(arrived) => (now - arrived)
                .to_std()
                .map(|age| age > expected)
                .unwrap_or(false),
            None => true,
        }
    }
}

/// Poll latency summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
    pub samples: u64,
}

#[derive(Debug, Default)]
struct LatencyTracker {
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl LatencyTracker {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = Some(self.min.map_or(elapsed, |m| m.min(elapsed)));
        self.max = self.max.max(elapsed);
    }

    fn summary(&self) -> LatencyStats {
        if self.count == 0 {
            return LatencyStats::default();
        }
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        LatencyStats {
            min_ms: self.min.map(ms).unwrap_or_default(),
            mean_ms: ms(self.total) / self.count as f64,
            max_ms: ms(self.max),
            samples: self.count,
        }
    }
}

/// Operational summary of one feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedStats {
    pub id: String,
    pub target: String,
    pub address: String,
    pub label: String,
    pub rate_ms: u64,
    pub running: bool,
    pub buffered: usize,
    pub capacity: usize,
    pub listeners: usize,
    pub latency: LatencyStats,
    pub errors: u64,
    pub consecutive_errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_data_arrived: Option<DateTime<Utc>>,
}

/// Mutable poll results, guarded together
struct FeedInner {
    buffer: RingBuffer<Sample>,
    feed_start_time: Option<DateTime<Utc>>,
    last_data_arrived: Option<DateTime<Utc>>,
    last_elapsed: Option<Duration>,
    latency: LatencyTracker,
    errors: u64,
    consecutive_errors: u64,
    last_error: Option<String>,
}

#[derive(Default)]
struct Pipeline {
    listeners: Vec<Listener>,
    augment: Vec<AugmentFn>,
    aliases: Vec<AliasMap>,
    /// When the listener count last dropped to zero
    idle_since: Option<Instant>,
}

/// Settings resolved by the builder
pub(crate) struct FeedParts {
    pub target: Arc<dyn ClusterMember>,
    pub query: String,
    pub params: Params,
    pub columns: Vec<DisplayColumn>,
    pub rate: Duration,
    pub capacity: usize,
    pub label: String,
    pub aliases: Vec<AliasMap>,
    pub augment: Vec<AugmentFn>,
    pub sink: Option<Arc<dyn DiagnosticsSink>>,
    pub metrics: MonitorMetrics,
    pub logger: StructuredLogger,
}

/// A recurring query against one cluster member
pub struct Feed {
    key: FeedKey,
    target: Arc<dyn ClusterMember>,
    query: String,
    params: Params,
    columns: Vec<DisplayColumn>,
    rate: Duration,
    label: String,
    sink: Option<Arc<dyn DiagnosticsSink>>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    inner: Mutex<FeedInner>,
    pipeline: RwLock<Pipeline>,
    /// Cancel side of the running schedule; dropping it ends the task
    cancel: Mutex<Option<oneshot::Sender<()>>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("label", &self.label)
            .field("target", &self.target.label())
            .field("rate", &self.rate)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Feed {
    pub(crate) fn from_parts(parts: FeedParts) -> Self {
        let key = FeedKey::new(
            parts.target.address(),
            &parts.query,
            &parts.params,
            &parts.columns,
        );
        Self {
            key,
            target: parts.target,
            query: parts.query,
            params: parts.params,
            columns: parts.columns,
            rate: parts.rate,
            label: parts.label,
            sink: parts.sink,
            metrics: parts.metrics,
            logger: parts.logger,
            inner: Mutex::new(FeedInner {
                buffer: RingBuffer::new(parts.capacity),
                feed_start_time: None,
                last_data_arrived: None,
                last_elapsed: None,
                latency: LatencyTracker::default(),
                errors: 0,
                consecutive_errors: 0,
                last_error: None,
            }),
            pipeline: RwLock::new(Pipeline {
                listeners: Vec::new(),
                augment: parts.augment,
                aliases: parts.aliases,
                idle_since: Some(Instant::now()),
            }),
            cancel: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn target(&self) -> &Arc<dyn ClusterMember> {
        &self.target
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn columns(&self) -> &[DisplayColumn] {
        &self.columns
    }

    pub fn rate(&self) -> Duration {
        self.rate
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().buffer.capacity()
    }

    /// Start polling: one poll right away, then every `rate` (or `2 × rate`
    /// after a failure) until stopped. Restarts the feed if already running.
    ///
    /// The returned handle completes once the run ends.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        if self.is_running() {
            self.stop();
        }

        let generation = {
            let mut inner = self.inner.lock();
            inner.feed_start_time.get_or_insert_with(Utc::now);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *self.cancel.lock() = Some(cancel_tx);
        let handle = tokio::spawn(run_schedule(Arc::downgrade(self), generation, cancel_rx));

        self.logger.log_feed_started(
            &self.label,
            self.target.label(),
            self.rate,
            self.capacity(),
        );
        handle
    }

    /// Cancel the pending poll. A query already in flight is left to finish
    /// but its result is discarded.
    pub fn stop(&self) {
        let was_running = {
            let mut inner = self.inner.lock();
            self.generation.fetch_add(1, Ordering::SeqCst);
            inner.feed_start_time.take().is_some()
        };
        self.cancel.lock().take();

        if was_running {
            self.logger.log_feed_stopped(&self.label, self.target.label());
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().feed_start_time.is_some()
    }

    pub fn feed_start_time(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().feed_start_time
    }

    pub fn last_data_arrived(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_data_arrived
    }

    /// Run one poll cycle inline and return the delay before the next one
    pub async fn poll_once(&self) -> Duration {
        let generation = self.generation.load(Ordering::SeqCst);
        self.poll(generation).await.unwrap_or(self.rate)
    }

    /// Returns `None` if the result was discarded because the feed was
    /// stopped or restarted while the query was in flight.
    async fn poll(&self, generation: u64) -> Option<Duration> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let result = self.target.run(&self.query, &self.params).await;
        let elapsed = clock.elapsed();

        if elapsed > self.rate {
            self.metrics.inc_slow_polls();
            diagnostics::warn(
                self.sink.as_deref(),
                &format!(
                    "feed {} on {} is falling behind: poll took {}ms, rate is {}ms",
                    self.label,
                    self.target.label(),
                    elapsed.as_millis(),
                    self.rate.as_millis()
                ),
            );
        }

        let delay = match result {
            Ok(result) => {
                let mut observation = transform::extract(result.first(), &self.columns);
                let (augment, aliases) = {
                    let pipeline = self.pipeline.read();
                    (pipeline.augment.clone(), pipeline.aliases.clone())
                };
                for failure in transform::augment(&mut observation, &augment) {
                    self.report(
                        anyhow::anyhow!("augmentation panicked: {}", failure),
                        ErrorSource::Augmentation,
                    );
                }
                transform::apply_aliases(&mut observation, &aliases);

                {
                    let mut inner = self.inner.lock();
                    if self.generation.load(Ordering::SeqCst) != generation {
                        drop(inner);
                        self.discard();
                        return None;
                    }
                    inner.buffer.push(Sample {
                        timestamp: started_at,
                        data: observation,
                    });
                    inner.last_data_arrived = Some(Utc::now());
                    inner.last_elapsed = Some(elapsed);
                    inner.latency.record(elapsed);
                    inner.consecutive_errors = 0;
                }
                self.metrics.observe_poll_latency(elapsed);
                self.rate
            }
            Err(err) => {
                let consecutive = {
                    let mut inner = self.inner.lock();
                    if self.generation.load(Ordering::SeqCst) != generation {
                        drop(inner);
                        self.discard();
                        return None;
                    }
                    inner.errors += 1;
                    inner.consecutive_errors += 1;
                    inner.last_error = Some(err.to_string());
                    inner.consecutive_errors
                };
                self.metrics.inc_poll_errors();
                self.report(anyhow::Error::new(err), ErrorSource::Poll { consecutive });
                self.rate * 2
            }
        };

        self.notify();
        Some(delay)
    }

    fn discard(&self) {
        debug!(feed = %self.label, "Discarding poll result from a stopped run");
        self.metrics.inc_discarded_polls();
    }

    fn report(&self, error: anyhow::Error, source: ErrorSource) {
        let context = ErrorContext {
            feed: self.label.clone(),
            target: self.target.label().to_string(),
            source,
        };
        diagnostics::report(self.sink.as_deref(), &error, &context);
    }

    /// Invoke listeners in registration order; failures are reported and
    /// do not stop delivery to the rest
    fn notify(&self) {
        let listeners = self.pipeline.read().listeners.clone();
        if listeners.is_empty() {
            return;
        }

        let state = self.current_state();
        for listener in &listeners {
            let error = match catch_unwind(AssertUnwindSafe(|| listener(&state, self))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(panic) => anyhow::anyhow!(
                    "listener panicked: {}",
                    transform::panic_message(panic.as_ref())
                ),
            };
            self.metrics.inc_listener_failures();
            self.report(error, ErrorSource::Listener);
        }
    }

    /// Register a listener; adding the same `Arc` twice is a no-op.
    /// Returns whether the listener was newly added.
    pub fn add_listener(&self, listener: Listener) -> bool {
        let mut pipeline = self.pipeline.write();
        if pipeline.listeners.iter().any(|l| same_fn(l, &listener)) {
            return false;
        }
        pipeline.listeners.push(listener);
        pipeline.idle_since = None;
        true
    }

    pub fn remove_listener(&self, listener: &Listener) -> bool {
        let mut pipeline = self.pipeline.write();
        let before = pipeline.listeners.len();
        pipeline.listeners.retain(|l| !same_fn(l, listener));
        let removed = pipeline.listeners.len() != before;
        if removed && pipeline.listeners.is_empty() {
            pipeline.idle_since = Some(Instant::now());
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.pipeline.read().listeners.len()
    }

    /// How long the feed has had no listeners, if it has none
    pub fn idle_for(&self) -> Option<Duration> {
        self.pipeline.read().idle_since.map(|since| since.elapsed())
    }

    /// Restart the idle clock if the feed has no listeners
    pub(crate) fn touch(&self) {
        let mut pipeline = self.pipeline.write();
        if pipeline.listeners.is_empty() {
            pipeline.idle_since = Some(Instant::now());
        }
    }

    /// Add an augmentation; adding the same `Arc` twice is a no-op
    pub fn add_augmentation_function(&self, f: AugmentFn) -> bool {
        let mut pipeline = self.pipeline.write();
        if pipeline.augment.iter().any(|g| same_fn(g, &f)) {
            return false;
        }
        pipeline.augment.push(f);
        true
    }

    pub fn remove_augmentation_function(&self, f: &AugmentFn) -> bool {
        let mut pipeline = self.pipeline.write();
        let before = pipeline.augment.len();
        pipeline.augment.retain(|g| !same_fn(g, f));
        pipeline.augment.len() != before
    }

    /// Append a rename mapping applied to future polls only
    pub fn add_aliases(&self, mapping: AliasMap) {
        self.pipeline.write().aliases.push(mapping);
    }

    /// Smallest finite number under `columns` across the buffer
    /// (all display columns when empty); `0` when there is none
    pub fn min(&self, columns: &[&str]) -> f64 {
        self.extreme(columns, f64::min).unwrap_or(0.0)
    }

    /// Largest finite number under `columns` across the buffer
    /// (all display columns when empty); `1` when there is none
    pub fn max(&self, columns: &[&str]) -> f64 {
        self.extreme(columns, f64::max).unwrap_or(1.0)
    }

    fn extreme(&self, columns: &[&str], pick: fn(f64, f64) -> f64) -> Option<f64> {
        let defaults: Vec<&str>;
        let columns = if columns.is_empty() {
            defaults = self.columns.iter().map(|c| c.accessor.as_str()).collect();
            &defaults[..]
        } else {
            columns
        };

        let inner = self.inner.lock();
        inner
            .buffer
            .iter()
            .flat_map(|sample| columns.iter().filter_map(move |c| sample.data.get(*c)))
            .filter_map(|value| value.as_finite())
            .reduce(pick)
    }

    /// Latest observation, buffered history and timestamps
    pub fn current_state(&self) -> FeedState {
        let inner = self.inner.lock();
        let latest = inner.buffer.last();
        FeedState {
            data: latest.map(|s| s.data.clone()),
            timestamp: latest.map(|s| s.timestamp),
            samples: inner.buffer.to_vec(),
            feed_start_time: inner.feed_start_time,
            last_data_arrived: inner.last_data_arrived,
            last_elapsed_ms: inner.last_elapsed.map(|d| d.as_millis() as u64),
        }
    }

    pub fn stats(&self) -> FeedStats {
        let listeners = self.listener_count();
        let inner = self.inner.lock();
        FeedStats {
            id: self.key.id(),
            target: self.target.label().to_string(),
            address: self.target.address().to_string(),
            label: self.label.clone(),
            rate_ms: self.rate.as_millis() as u64,
            running: inner.feed_start_time.is_some(),
            buffered: inner.buffer.len(),
            capacity: inner.buffer.capacity(),
            listeners,
            latency: inner.latency.summary(),
            errors: inner.errors,
            consecutive_errors: inner.consecutive_errors,
            last_error: inner.last_error.clone(),
            last_data_arrived: inner.last_data_arrived,
        }
    }
}

/// Compare callbacks by allocation, ignoring vtable differences
fn same_fn<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Poll loop for one run of a feed. Holds only a weak reference between
/// polls so dropping the feed ends the loop.
async fn run_schedule(feed: Weak<Feed>, generation: u64, mut cancel: oneshot::Receiver<()>) {
    loop {
        let Some(strong) = feed.upgrade() else {
            break;
        };
        let Some(delay) = strong.poll(generation).await else {
            break;
        };
        drop(strong);

        tokio::select! {
            biased;
            _ = &mut cancel => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
