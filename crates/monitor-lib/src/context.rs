//! Monitoring context
//!
//! Everything a consumer needs to build feeds: the cluster members, the
//! feed registry and the shared time window. Passed around explicitly
//! instead of living in global state.

use crate::catalog::CatalogEntry;
use crate::diagnostics::{DiagnosticsSink, TracingSink};
use crate::error::FeedError;
use crate::feed::{Feed, FeedConfig};
use crate::member::ClusterMember;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::registry::{FeedRegistry, FeedSpec};
use crate::window::TimeWindow;
use std::sync::Arc;

#[derive(Clone)]
pub struct MonitoringContext {
    pub members: Vec<Arc<dyn ClusterMember>>,
    pub registry: Arc<FeedRegistry>,
    pub time_window: Arc<TimeWindow>,
    pub sink: Arc<dyn DiagnosticsSink>,
    pub metrics: MonitorMetrics,
    /// Timing for entries that do not set their own rate
    pub defaults: FeedConfig,
}

impl MonitoringContext {
    /// Context whose feeds report through the structured log
    pub fn new(members: Vec<Arc<dyn ClusterMember>>, logger: StructuredLogger) -> Self {
        let sink: Arc<dyn DiagnosticsSink> = Arc::new(TracingSink::new(logger.clone()));
        Self::with_sink(members, logger, sink)
    }

    pub fn with_sink(
        members: Vec<Arc<dyn ClusterMember>>,
        logger: StructuredLogger,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let registry = FeedRegistry::new(logger).with_sink(sink.clone());
        Self {
            members,
            registry: Arc::new(registry),
            time_window: Arc::new(TimeWindow::new()),
            sink,
            metrics: MonitorMetrics::new(),
            defaults: FeedConfig::default(),
        }
    }

    pub fn defaults(mut self, defaults: FeedConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn member(&self, label: &str) -> Option<&Arc<dyn ClusterMember>> {
        self.members.iter().find(|m| m.label() == label)
    }

    /// The feed running `entry` against `member`
    pub fn feed_for(
        &self,
        member: &Arc<dyn ClusterMember>,
        entry: &CatalogEntry,
    ) -> Result<Arc<Feed>, FeedError> {
        let spec = FeedSpec::new(member.clone(), entry.query.clone(), entry.columns.clone())
            .params(entry.params.clone())
            .config(entry.feed_config(self.defaults))
            .label(format!("{} {}", member.label(), entry.name));
        self.registry.get_or_create(spec)
    }

    /// One feed per member for `entry`, in member order
    pub fn feeds_for_entry(&self, entry: &CatalogEntry) -> Result<Vec<Arc<Feed>>, FeedError> {
        self.members
            .iter()
            .map(|member| self.feed_for(member, entry))
            .collect()
    }
}

impl std::fmt::Debug for MonitoringContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members: Vec<&str> = self.members.iter().map(|m| m.label()).collect();
        f.debug_struct("MonitoringContext")
            .field("members", &members)
            .field("feeds", &self.registry.len())
            .field("time_window", &self.time_window.get_time_window())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DisplayColumn;
    use crate::test_support::MockMember;

    fn context() -> MonitoringContext {
        let members: Vec<Arc<dyn ClusterMember>> = vec![
            Arc::new(MockMember::new("core-1")),
            Arc::new(MockMember::new("core-2")),
        ];
        MonitoringContext::new(members, StructuredLogger::new("test"))
    }

    fn entry() -> CatalogEntry {
        CatalogEntry::new(
            "heap",
            "RETURN 1 AS used",
            vec![DisplayColumn::new("Used", "used")],
        )
    }

    #[tokio::test]
    async fn test_feeds_for_entry_covers_every_member() {
        let ctx = context();

        let feeds = ctx.feeds_for_entry(&entry()).unwrap();

        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].label(), "core-1 heap");
        assert_eq!(feeds[1].label(), "core-2 heap");
        assert_eq!(ctx.registry.len(), 2);
        ctx.registry.shutdown();
    }

    #[tokio::test]
    async fn test_feed_for_reuses_registered_feed() {
        let ctx = context();
        let member = ctx.member("core-2").unwrap().clone();

        let a = ctx.feed_for(&member, &entry()).unwrap();
        let b = ctx.feed_for(&member, &entry()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        ctx.registry.shutdown();
    }

    #[tokio::test]
    async fn test_entry_rate_overrides_defaults() {
        let ctx = context();
        let mut fast = entry();
        fast.rate_ms = Some(250);

        let member = ctx.member("core-1").unwrap().clone();
        let feed = ctx.feed_for(&member, &fast).unwrap();

        assert_eq!(feed.rate(), std::time::Duration::from_millis(250));
        ctx.registry.shutdown();
    }

    #[test]
    fn test_unknown_member_is_none() {
        assert!(context().member("core-9").is_none());
    }
}
