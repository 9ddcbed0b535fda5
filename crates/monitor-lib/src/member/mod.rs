//! Cluster members that feeds run their queries against
//!
//! The feed layer only needs a stable address for identity, a readable
//! label for diagnostics and a way to run a query.

mod http;

pub use http::HttpMember;

use crate::error::QueryError;
use crate::models::{Params, QueryResult};

pub use async_trait::async_trait;

/// A database member that can execute read-only queries
#[async_trait]
pub trait ClusterMember: Send + Sync {
    /// Stable address, used as part of the feed identity
    fn address(&self) -> &str;

    /// Human-readable name for logs and stats
    fn label(&self) -> &str;

    /// Run a query with named parameters
    async fn run(&self, query: &str, params: &Params) -> Result<QueryResult, QueryError>;
}
