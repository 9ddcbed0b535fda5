//! Health tracking for the monitor
//!
//! Components report their own status; the feed component is derived
//! from feed statistics so a cluster member that stops answering shows
//! up in liveness and readiness probes.

use crate::feed::FeedStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive poll failures after which a feed counts as failing
pub const FAILING_AFTER: u64 = 3;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Still serving, with reduced data
    Degraded,
    /// Component has failed
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Create a healthy status
    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    /// Create a degraded status with message
    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    /// Create an unhealthy status with message
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }

    /// Health of the feed component given every feed's stats
    pub fn from_feeds(stats: &[FeedStats]) -> Self {
        let failing: Vec<&FeedStats> = stats
            .iter()
            .filter(|s| s.consecutive_errors >= FAILING_AFTER)
            .collect();

        if failing.is_empty() {
            Self::healthy()
        } else if failing.len() == stats.len() {
            Self::unhealthy(format!("all {} feeds are failing", stats.len()))
        } else {
            let targets: Vec<&str> = failing.iter().map(|s| s.target.as_str()).collect();
            Self::degraded(format!(
                "{} of {} feeds failing (targets: {})",
                failing.len(),
                stats.len(),
                targets.join(", ")
            ))
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Readiness check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const FEEDS: &str = "feeds";
    pub const REGISTRY: &str = "registry";
    pub const API: &str = "api";
}

/// Health registry for tracking component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Create a new health registry
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Update component health status
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    /// Mark component as degraded
    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    /// Mark component as unhealthy
    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Recompute the feed component from the latest stats
    pub async fn update_from_feeds(&self, stats: &[FeedStats]) {
        self.update(components::FEEDS, ComponentHealth::from_feeds(stats))
            .await;
    }

    /// Set overall readiness state
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Get overall health response
    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Get readiness response
    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        let reason = if !ready {
            Some("Monitor not yet initialized".to_string())
        } else if health.status == ComponentStatus::Unhealthy {
            Some("Critical component unhealthy".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::LatencyStats;

    fn stats(target: &str, consecutive_errors: u64) -> FeedStats {
        FeedStats {
            id: "0123456789abcdef".to_string(),
            target: target.to_string(),
            address: format!("http://{}:7474", target),
            label: format!("{}: Heap", target),
            rate_ms: 1000,
            running: true,
            buffered: 10,
            capacity: 525,
            listeners: 1,
            latency: LatencyStats::default(),
            errors: consecutive_errors,
            consecutive_errors,
            last_error: None,
            last_data_arrived: None,
        }
    }

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_component_degrades_overall() {
        let registry = HealthRegistry::new();
        registry.register(components::FEEDS).await;
        registry.register(components::API).await;

        registry.set_degraded(components::FEEDS, "core-2 failing").await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.status.is_operational());
    }

    #[test]
    fn test_feed_health_thresholds() {
        assert_eq!(
            ComponentHealth::from_feeds(&[stats("core-1", 0), stats("core-2", 2)]).status,
            ComponentStatus::Healthy
        );

        let degraded = ComponentHealth::from_feeds(&[stats("core-1", 0), stats("core-2", 3)]);
        assert_eq!(degraded.status, ComponentStatus::Degraded);
        assert!(degraded.message.unwrap().contains("core-2"));

        assert_eq!(
            ComponentHealth::from_feeds(&[stats("core-1", 5), stats("core-2", 3)]).status,
            ComponentStatus::Unhealthy
        );
    }

    #[test]
    fn test_no_feeds_is_healthy() {
        assert_eq!(
            ComponentHealth::from_feeds(&[]).status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_readiness_follows_flag_and_health() {
        let registry = HealthRegistry::new();
        assert!(!registry.readiness().await.ready);

        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .update_from_feeds(&[stats("core-1", 4)])
            .await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Critical component unhealthy")
        );
    }
}
