//! Monitor configuration
//!
//! Loaded from an optional TOML file layered under `MONITOR_*` environment
//! variables. Nested keys use a double underscore, e.g.
//! `MONITOR_SERVER__VERSION=5.12`.

use anyhow::{bail, Context, Result};
use monitor_lib::catalog::{self, CatalogEntry, ServerInfo};
use monitor_lib::feed::FeedConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default config file looked up when none is given
pub const DEFAULT_CONFIG_FILE: &str = "monitor.toml";

/// A cluster member to poll
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemberConfig {
    /// Base URL of the member's HTTP endpoint
    pub address: String,
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    /// API server port for health, metrics and feed data
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Default poll interval in milliseconds
    #[serde(default = "default_rate_ms")]
    pub rate_ms: u64,

    /// Span of history each feed keeps, in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How long a feed may go without listeners before it is evicted
    #[serde(default = "default_idle_grace_secs")]
    pub idle_grace_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Database the queries run against
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    #[serde(default)]
    pub members: Vec<MemberConfig>,

    /// Capabilities of the cluster, used to skip incompatible queries
    #[serde(default = "default_server")]
    pub server: ServerInfo,

    /// Query catalog; the built-in catalog is used when empty
    #[serde(default)]
    pub feeds: Vec<CatalogEntry>,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "cluster-monitor".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_rate_ms() -> u64 {
    1000
}

fn default_window_secs() -> u64 {
    420
}

fn default_idle_grace_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_query_timeout_ms() -> u64 {
    5000
}

fn default_server() -> ServerInfo {
    ServerInfo {
        version: "4.4".to_string(),
        enterprise: false,
        procedures: Vec::new(),
    }
}

impl MonitorConfig {
    /// Load from `path` (if any) layered under the environment.
    /// A missing file is an error only when `required` is set.
    pub fn load_from(path: Option<&Path>, required: bool) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(required),
            );
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("MONITOR")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read monitor configuration")?;

        let parsed: MonitorConfig = config
            .try_deserialize()
            .context("Invalid monitor configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.rate_ms == 0 {
            bail!("rate_ms must be greater than zero");
        }
        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than zero");
        }
        for (i, member) in self.members.iter().enumerate() {
            if member.label.trim().is_empty() {
                bail!("member {} has an empty label", i);
            }
            if self.members[..i].iter().any(|m| m.label == member.label) {
                bail!("member label {} is used more than once", member.label);
            }
        }
        catalog::validate_all(&self.feeds)?;
        Ok(())
    }

    pub fn feed_defaults(&self) -> FeedConfig {
        FeedConfig {
            rate: Duration::from_millis(self.rate_ms),
            window_width: Duration::from_secs(self.window_secs),
        }
    }

    /// The configured catalog, or the built-in one
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        if self.feeds.is_empty() {
            catalog::builtin()
        } else {
            self.feeds.clone()
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
