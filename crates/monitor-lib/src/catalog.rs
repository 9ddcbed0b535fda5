//! Query catalog
//!
//! Catalog entries describe the queries the monitor knows how to run,
//! which columns to keep and what the server must support for the query
//! to work. Entries are validated when loaded; compatibility with a given
//! server is checked before a feed is created for it.

use crate::error::CatalogError;
use crate::feed::FeedConfig;
use crate::models::{DisplayColumn, Params};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

/// What the server reports about itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    #[serde(default)]
    pub enterprise: bool,
    #[serde(default)]
    pub procedures: Vec<String>,
}

/// A server capability a query depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    MinVersion { version: String },
    Enterprise,
    Procedure { name: String },
}

/// Outcome of checking an entry against a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Compatibility {
    pub pass: bool,
    pub description: String,
}

impl Compatibility {
    fn pass() -> Self {
        Self {
            pass: true,
            description: "compatible".to_string(),
        }
    }

    fn fail(description: String) -> Self {
        Self {
            pass: false,
            description,
        }
    }
}

/// A named query with its column schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub query: String,
    pub columns: Vec<DisplayColumn>,
    /// Overrides the default poll rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_ms: Option<u64>,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub requires: Vec<Requirement>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, query: impl Into<String>, columns: Vec<DisplayColumn>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            columns,
            rate_ms: None,
            params: Params::new(),
            requires: Vec::new(),
        }
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if self.query.trim().is_empty() {
            return Err(CatalogError::EmptyQuery(self.name.clone()));
        }
        if self.columns.is_empty() {
            return Err(CatalogError::NoColumns(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.accessor.as_str()) {
                return Err(CatalogError::DuplicateAccessor {
                    entry: self.name.clone(),
                    accessor: column.accessor.clone(),
                });
            }
        }

        if self.rate_ms == Some(0) {
            return Err(CatalogError::ZeroRate(self.name.clone()));
        }

        for requirement in &self.requires {
            if let Requirement::MinVersion { version } = requirement {
                if parse_version(version).is_none() {
                    return Err(CatalogError::InvalidVersion {
                        entry: self.name.clone(),
                        version: version.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Check every requirement; the first unmet one is described
    pub fn check(&self, server: &ServerInfo) -> Compatibility {
        for requirement in &self.requires {
            match requirement {
                Requirement::MinVersion { version } => {
                    match compare_versions(&server.version, version) {
                        Some(Ordering::Less) => {
                            return Compatibility::fail(format!(
                                "{} requires version {} or later, server is {}",
                                self.name, version, server.version
                            ))
                        }
                        Some(_) => {}
                        None => {
                            return Compatibility::fail(format!(
                                "{}: cannot compare server version {} with {}",
                                self.name, server.version, version
                            ))
                        }
                    }
                }
                Requirement::Enterprise if !server.enterprise => {
                    return Compatibility::fail(format!(
                        "{} requires an enterprise server",
                        self.name
                    ))
                }
                Requirement::Procedure { name }
                    if !server.procedures.iter().any(|p| p == name) =>
                {
                    return Compatibility::fail(format!(
                        "{} requires procedure {}",
                        self.name, name
                    ))
                }
                _ => {}
            }
        }
        Compatibility::pass()
    }

    /// Feed timing for this entry, starting from `defaults`
    pub fn feed_config(&self, defaults: FeedConfig) -> FeedConfig {
        match self.rate_ms {
            Some(ms) => FeedConfig {
                rate: Duration::from_millis(ms),
                ..defaults
            },
            None => defaults,
        }
    }
}

/// Validate every entry and reject duplicate names
pub fn validate_all(entries: &[CatalogEntry]) -> Result<(), CatalogError> {
    let mut names = HashSet::new();
    for entry in entries {
        entry.validate()?;
        if !names.insert(entry.name.as_str()) {
            return Err(CatalogError::DuplicateName(entry.name.clone()));
        }
    }
    Ok(())
}

/// Queries available without any configuration
pub fn builtin() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new(
            "heap",
            "CALL dbms.queryJmx('java.lang:type=Memory') YIELD attributes \
             RETURN attributes.HeapMemoryUsage.value.properties.used AS heapUsed, \
             attributes.HeapMemoryUsage.value.properties.committed AS heapCommitted",
            vec![
                DisplayColumn::new("Heap Used", "heapUsed"),
                DisplayColumn::new("Heap Committed", "heapCommitted"),
            ],
        )
        .requires(Requirement::Procedure {
            name: "dbms.queryJmx".to_string(),
        }),
        CatalogEntry::new(
            "page_cache",
            "CALL dbms.queryJmx('org.neo4j:*') YIELD name, attributes \
             WHERE name =~ '.*Page cache' \
             RETURN attributes.Hits.value AS hits, attributes.Faults.value AS faults",
            vec![
                DisplayColumn::new("Hits", "hits"),
                DisplayColumn::new("Faults", "faults"),
            ],
        )
        .requires(Requirement::Enterprise)
        .requires(Requirement::Procedure {
            name: "dbms.queryJmx".to_string(),
        }),
        CatalogEntry::new(
            "transactions",
            "CALL dbms.listTransactions() YIELD transactionId RETURN count(transactionId) AS open",
            vec![DisplayColumn::new("Open Transactions", "open")],
        )
        .requires(Requirement::Procedure {
            name: "dbms.listTransactions".to_string(),
        }),
        CatalogEntry::new(
            "connections",
            "CALL dbms.listConnections() YIELD connectionId RETURN count(connectionId) AS connections",
            vec![DisplayColumn::new("Connections", "connections")],
        )
        .requires(Requirement::MinVersion {
            version: "3.5".to_string(),
        })
        .requires(Requirement::Procedure {
            name: "dbms.listConnections".to_string(),
        }),
    ]
}

fn parse_version(version: &str) -> Option<Vec<u64>> {
    // Drop pre-release suffixes such as "-aura" or "-drop01"
    let core = version.trim().split(['-', '+']).next()?;
    if core.is_empty() {
        return None;
    }
    core.split('.').map(|part| part.parse().ok()).collect()
}

/// Numeric component-wise comparison; missing components count as zero
fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let a = parse_version(a)?;
    let b = parse_version(b)?;
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}
