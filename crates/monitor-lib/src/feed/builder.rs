//! Builder for feeds

use super::poller::{Feed, FeedParts};
use super::transform::{AliasMap, AugmentFn};
use crate::diagnostics::DiagnosticsSink;
use crate::error::FeedError;
use crate::member::ClusterMember;
use crate::models::{DisplayColumn, Params};
use crate::observability::{MonitorMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;

/// Default polling interval
pub const DEFAULT_RATE: Duration = Duration::from_millis(1000);

/// Default width of the viewing window the buffer has to cover
pub const DEFAULT_WINDOW_WIDTH: Duration = Duration::from_secs(7 * 60);

/// Extra buffer headroom over the window width
const CAPACITY_HEADROOM: f64 = 1.25;

/// Timing configuration for a feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedConfig {
    /// Interval between polls (default: 1 second)
    pub rate: Duration,
    /// Span of history the buffer must hold (default: 7 minutes)
    pub window_width: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            window_width: DEFAULT_WINDOW_WIDTH,
        }
    }
}

impl FeedConfig {
    /// Number of samples needed to cover the window at this rate
    pub fn capacity(&self) -> usize {
        let samples = self.window_width.as_secs_f64() / self.rate.as_secs_f64();
        ((samples * CAPACITY_HEADROOM).ceil() as usize).max(1)
    }
}

/// Builder for creating feeds
pub struct FeedBuilder {
    target: Option<Arc<dyn ClusterMember>>,
    query: Option<String>,
    columns: Vec<DisplayColumn>,
    params: Params,
    config: FeedConfig,
    label: Option<String>,
    aliases: Vec<AliasMap>,
    augment: Vec<AugmentFn>,
    sink: Option<Arc<dyn DiagnosticsSink>>,
    metrics: Option<MonitorMetrics>,
    logger: Option<StructuredLogger>,
}

impl FeedBuilder {
    /// Create a new builder with default timing
    pub fn new() -> Self {
        Self {
            target: None,
            query: None,
            columns: Vec::new(),
            params: Params::new(),
            config: FeedConfig::default(),
            label: None,
            aliases: Vec::new(),
            augment: Vec::new(),
            sink: None,
            metrics: None,
            logger: None,
        }
    }

    /// Set the member the query runs against
    pub fn target(mut self, target: Arc<dyn ClusterMember>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set the display columns, which also act as the extraction allow-list
    pub fn columns(mut self, columns: Vec<DisplayColumn>) -> Self {
        self.columns = columns;
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn rate(mut self, rate: Duration) -> Self {
        self.config.rate = rate;
        self
    }

    pub fn window_width(mut self, width: Duration) -> Self {
        self.config.window_width = width;
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

    pub fn alias(mut self, mapping: AliasMap) -> Self {
        self.aliases.push(mapping);
        self
    }

    pub fn augment(mut self, f: AugmentFn) -> Self {
        self.augment.push(f);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn metrics(mut self, metrics: MonitorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the feed. It is not started.
    pub fn build(self) -> Result<Arc<Feed>, FeedError> {
        let target = self.target.ok_or(FeedError::MissingParameter("target"))?;
        let query = self
            .query
            .filter(|q| !q.trim().is_empty())
            .ok_or(FeedError::MissingParameter("query"))?;
        if self.columns.is_empty() {
            return Err(FeedError::MissingParameter("display columns"));
        }
        if self.config.rate.is_zero() {
            return Err(FeedError::InvalidRate);
        }

        let label = self.label.unwrap_or_else(|| {
            let headers: Vec<&str> = self.columns.iter().map(|c| c.header.as_str()).collect();
            format!("{}: {}", target.label(), headers.join(", "))
        });
        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new(target.label()));

        Ok(Arc::new(Feed::from_parts(FeedParts {
            target,
            query,
            params: self.params,
            columns: self.columns,
            rate: self.config.rate,
            capacity: self.config.capacity(),
            label,
            aliases: self.aliases,
            augment: self.augment,
            sink: self.sink,
            metrics: self.metrics.unwrap_or_default(),
            logger,
        })))
    }
}

impl Default for FeedBuilder {
    fn default() -> Self {
        Self::new()
    }
}
