//! Wiring between configuration and the feed library
//!
//! Builds one HTTP member per configured cluster member, starts a feed for
//! every compatible catalog entry on every member and keeps the feed health
//! component up to date.

use crate::config::MonitorConfig;
use anyhow::{Context, Result};
use monitor_lib::{
    feed::{Feed, FeedState, Listener},
    health::HealthRegistry,
    member::{ClusterMember, HttpMember},
    observability::StructuredLogger,
    registry::FeedRegistry,
    MonitoringContext,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

/// Feeds the agent started on its own behalf
pub struct Monitor {
    pub context: MonitoringContext,
    pub feeds: Vec<Arc<Feed>>,
    /// Attached to every agent feed so idle eviction leaves them alone
    keepalive: Listener,
}

impl Monitor {
    /// Build the members and start the catalog feeds
    pub fn start(config: &MonitorConfig, logger: StructuredLogger) -> Result<Self> {
        let members = build_members(config)?;
        let context = MonitoringContext::new(members, logger).defaults(config.feed_defaults());
        let keepalive: Listener =
            Arc::new(|_: &FeedState, _: &Feed| -> anyhow::Result<()> { Ok(()) });

        let mut feeds = Vec::new();
        for entry in config.catalog() {
            let compatibility = entry.check(&config.server);
            if !compatibility.pass {
                warn!(
                    entry = %entry.name,
                    reason = %compatibility.description,
                    "Skipping incompatible catalog entry"
                );
                continue;
            }

            for feed in context
                .feeds_for_entry(&entry)
                .with_context(|| format!("Failed to start feeds for {}", entry.name))?
            {
                feed.add_listener(keepalive.clone());
                feeds.push(feed);
            }
        }

        Ok(Self {
            context,
            feeds,
            keepalive,
        })
    }

    /// Detach from the agent feeds and stop everything
    pub fn shutdown(&self) {
        for feed in &self.feeds {
            feed.remove_listener(&self.keepalive);
        }
        self.context.registry.shutdown();
    }
}

pub fn build_members(config: &MonitorConfig) -> Result<Vec<Arc<dyn ClusterMember>>> {
    config
        .members
        .iter()
        .map(|m| {
            let member = HttpMember::new(
                &m.address,
                &m.label,
                &config.database,
                config.query_timeout(),
            )
            .with_context(|| format!("Invalid address for member {}", m.label))?;
            Ok(Arc::new(member) as Arc<dyn ClusterMember>)
        })
        .collect()
}

/// Recompute the feed health component every `every` until shutdown
pub fn spawn_health_updates(
    health: HealthRegistry,
    registry: Arc<FeedRegistry>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    health.update_from_feeds(&registry.stats_snapshot()).await;
                }
                _ = shutdown.recv() => {
                    debug!("Health updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemberConfig;
    use monitor_lib::{catalog::ServerInfo, ComponentStatus};

    fn config(members: Vec<MemberConfig>) -> MonitorConfig {
        let mut config = MonitorConfig::load_from(None, false).unwrap();
        config.members = members;
        config.server = ServerInfo {
            version: "4.4.0".to_string(),
            enterprise: false,
            procedures: vec!["dbms.queryJmx".to_string()],
        };
        config
    }

    fn member(label: &str) -> MemberConfig {
        MemberConfig {
            // Nothing listens here; polls fail and back off
            address: "http://127.0.0.1:9".to_string(),
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn test_starts_compatible_entries_on_every_member() {
        let config = config(vec![member("core-1"), member("core-2")]);

        let monitor = Monitor::start(&config, StructuredLogger::new("test")).unwrap();

        // Only "heap" passes: community server with dbms.queryJmx
        assert_eq!(monitor.feeds.len(), 2);
        assert!(monitor.feeds.iter().all(|f| f.is_running()));
        assert!(monitor.feeds.iter().all(|f| f.listener_count() == 1));
        assert_eq!(monitor.context.registry.len(), 2);

        monitor.shutdown();
        assert!(monitor.feeds.iter().all(|f| !f.is_running()));
        assert!(monitor.feeds.iter().all(|f| f.listener_count() == 0));
    }

    #[test]
    fn test_invalid_member_address_fails() {
        let config = config(vec![MemberConfig {
            address: "not a url".to_string(),
            label: "core-1".to_string(),
        }]);
        assert!(build_members(&config).is_err());
    }

    #[tokio::test]
    async fn test_health_updates_follow_feed_stats() {
        let health = HealthRegistry::new();
        let registry = Arc::new(FeedRegistry::new(StructuredLogger::new("test")));
        let (tx, rx) = broadcast::channel(1);

        let handle = spawn_health_updates(
            health.clone(),
            registry,
            Duration::from_millis(10),
            rx,
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        let report = health.health().await;
        assert_eq!(
            report.components[monitor_lib::health::components::FEEDS].status,
            ComponentStatus::Healthy
        );

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
