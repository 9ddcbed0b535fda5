//! Feed registry
//!
//! Hands out at most one live feed per (target, query, params, columns).
//! Lookup and insertion happen under the key's shard lock so concurrent
//! callers asking for the same feed always get the same instance.

use crate::diagnostics::DiagnosticsSink;
use crate::error::FeedError;
use crate::feed::{Feed, FeedBuilder, FeedConfig, FeedKey, FeedStats};
use crate::member::ClusterMember;
use crate::models::{DisplayColumn, Params};
use crate::observability::{MonitorMetrics, StructuredLogger};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

/// What to poll; everything the registry needs to find or build a feed
#[derive(Clone)]
pub struct FeedSpec {
    pub target: Arc<dyn ClusterMember>,
    pub query: String,
    pub columns: Vec<DisplayColumn>,
    pub params: Params,
    pub config: FeedConfig,
    pub label: Option<String>,
}

impl FeedSpec {
    pub fn new(
        target: Arc<dyn ClusterMember>,
        query: impl Into<String>,
        columns: Vec<DisplayColumn>,
    ) -> Self {
        Self {
            target,
            query: query.into(),
            columns,
            params: Params::new(),
            config: FeedConfig::default(),
            label: None,
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn config(mut self, config: FeedConfig) -> Self {
        self.config = config;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Identity of the feed this spec resolves to. Rate and label are not part of it.
    pub fn key(&self) -> FeedKey {
        FeedKey::new(
            self.target.address(),
            &self.query,
            &self.params,
            &self.columns,
        )
    }
}

impl std::fmt::Debug for FeedSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSpec")
            .field("target", &self.target.label())
            .field("query", &self.query)
            .field("columns", &self.columns)
            .field("config", &self.config)
            .finish()
    }
}

/// Registry of live feeds
pub struct FeedRegistry {
    feeds: DashMap<FeedKey, Arc<Feed>>,
    sink: Option<Arc<dyn DiagnosticsSink>>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl FeedRegistry {
    pub fn new(logger: StructuredLogger) -> Self {
        Self {
            feeds: DashMap::new(),
            sink: None,
            metrics: MonitorMetrics::new(),
            logger,
        }
    }

    /// Route errors from every feed built here to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Return the running feed for `spec`, starting one if needed.
    ///
    /// A stopped feed that still has listeners is restarted in place; a
    /// stopped feed without listeners is replaced. Handing out an existing
    /// feed restarts its idle clock so it survives until the caller attaches
    /// a listener. Must be called from within a Tokio runtime.
    pub fn get_or_create(&self, spec: FeedSpec) -> Result<Arc<Feed>, FeedError> {
        let feed = match self.feeds.entry(spec.key()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get().clone();
                // Under the shard lock, so a concurrent evict_idle sees it
                existing.touch();
                if existing.is_running() {
                    return Ok(existing);
                }
                if existing.listener_count() > 0 {
                    debug!(feed = %existing.label(), "Restarting stopped feed with listeners");
                    existing.start();
                    existing
                } else {
                    let feed = self.build(spec)?;
                    feed.start();
                    entry.insert(feed.clone());
                    feed
                }
            }
            Entry::Vacant(entry) => {
                let feed = self.build(spec)?;
                feed.start();
                entry.insert(feed.clone());
                feed
            }
        };

        self.update_gauges();
        Ok(feed)
    }

    fn build(&self, spec: FeedSpec) -> Result<Arc<Feed>, FeedError> {
        let mut builder = FeedBuilder::new()
            .target(spec.target)
            .query(spec.query)
            .columns(spec.columns)
            .params(spec.params)
            .config(spec.config)
            .metrics(self.metrics.clone())
            .logger(self.logger.clone());
        if let Some(label) = spec.label {
            builder = builder.label(label);
        }
        if let Some(sink) = &self.sink {
            builder = builder.sink(sink.clone());
        }
        builder.build()
    }

    pub fn get(&self, key: &FeedKey) -> Option<Arc<Feed>> {
        self.feeds.get(key).map(|r| r.value().clone())
    }

    /// Look up a feed by its short id
    pub fn get_by_id(&self, id: &str) -> Option<Arc<Feed>> {
        self.feeds
            .iter()
            .find(|r| r.key().id() == id)
            .map(|r| r.value().clone())
    }

    /// All live feeds, ordered by label
    pub fn list(&self) -> Vec<Arc<Feed>> {
        let mut feeds: Vec<Arc<Feed>> = self.feeds.iter().map(|r| r.value().clone()).collect();
        feeds.sort_by(|a, b| a.label().cmp(b.label()));
        feeds
    }

    /// Stop and drop a feed. Refuses while listeners are attached.
    /// Returns `Ok(false)` if nothing was registered under `key`.
    pub fn remove(&self, key: &FeedKey) -> Result<bool, FeedError> {
        match self.feeds.remove_if(key, |_, feed| feed.listener_count() == 0) {
            Some((_, feed)) => {
                feed.stop();
                self.update_gauges();
                Ok(true)
            }
            None => match self.feeds.get(key) {
                Some(feed) => Err(FeedError::FeedInUse(feed.label().to_string())),
                None => Ok(false),
            },
        }
    }

    /// Evict feeds that have had no listeners for at least `grace`.
    /// Returns the number of feeds evicted.
    pub fn evict_idle(&self, grace: Duration) -> usize {
        let candidates: Vec<FeedKey> = self
            .feeds
            .iter()
            .filter(|r| is_idle(r.value(), grace))
            .map(|r| r.key().clone())
            .collect();

        let mut evicted = 0;
        for key in candidates {
            // Re-checked under the shard lock; a listener may have arrived
            if let Some((_, feed)) = self.feeds.remove_if(&key, |_, feed| is_idle(feed, grace)) {
                feed.stop();
                let idle_secs = feed.idle_for().map(|d| d.as_secs()).unwrap_or_default();
                self.logger.log_feed_evicted(feed.label(), idle_secs);
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.update_gauges();
        }
        evicted
    }

    /// Run `evict_idle` every `every` until `shutdown` fires or the
    /// registry is dropped
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        grace: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(registry) = registry.upgrade() else {
                            break;
                        };
                        let evicted = registry.evict_idle(grace);
                        if evicted > 0 {
                            debug!(evicted, "Evicted idle feeds");
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!("Feed sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Operational summary of every live feed, ordered by label
    pub fn stats_snapshot(&self) -> Vec<FeedStats> {
        let stats: Vec<FeedStats> = self.list().iter().map(|feed| feed.stats()).collect();
        let buffered: usize = stats.iter().map(|s| s.buffered).sum();
        let running = stats.iter().filter(|s| s.running).count();
        self.metrics
            .set_feed_totals(running as i64, buffered as i64);
        stats
    }

    /// Stop every feed. Feeds stay registered.
    pub fn shutdown(&self) {
        for feed in self.list() {
            feed.stop();
        }
        info!(feeds = self.feeds.len(), "Stopped all feeds");
        self.update_gauges();
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    fn update_gauges(&self) {
        let (mut running, mut buffered) = (0i64, 0i64);
        for entry in self.feeds.iter() {
            let stats = entry.value().stats();
            running += stats.running as i64;
            buffered += stats.buffered as i64;
        }
        self.metrics.set_feed_totals(running, buffered);
    }
}

fn is_idle(feed: &Feed, grace: Duration) -> bool {
    feed.listener_count() == 0 && feed.idle_for().is_some_and(|idle| idle >= grace)
}
