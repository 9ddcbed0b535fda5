//! Polling data feeds for graph database cluster monitoring
//!
//! This crate provides:
//! - Feeds that poll one query against one cluster member on a schedule
//! - A registry that shares one feed between identical requests
//! - The shared viewing window charts reconcile against
//! - A validated query catalog and server compatibility checks
//! - Health checks and observability

pub mod catalog;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod feed;
pub mod health;
pub mod member;
pub mod models;
pub mod observability;
pub mod registry;
pub mod window;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog::{CatalogEntry, Compatibility, Requirement, ServerInfo};
pub use context::MonitoringContext;
pub use diagnostics::{DiagnosticsSink, ErrorContext, ErrorSource, TracingSink};
pub use error::{CatalogError, FeedError, QueryError};
pub use feed::{Feed, FeedBuilder, FeedConfig, FeedKey, FeedState, FeedStats, Listener};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use member::{ClusterMember, HttpMember};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use registry::{FeedRegistry, FeedSpec};
pub use window::TimeWindow;
