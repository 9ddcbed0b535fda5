//! Error types for feeds, member queries and catalog loading

use thiserror::Error;

/// Errors raised when creating or managing feeds
#[derive(Debug, Error)]
pub enum FeedError {
    /// A required construction parameter was not supplied
    #[error("feed requires a {0}")]
    MissingParameter(&'static str),

    #[error("feed rate must be greater than zero")]
    InvalidRate,

    /// The feed still has listeners and cannot be evicted
    #[error("feed {0} still has registered listeners")]
    FeedInUse(String),
}

/// Errors returned by a cluster member when running a query
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("transport error: {0}")]
    Transport(String),

    /// The database accepted the request but reported a failure
    #[error("{code}: {message}")]
    Database { code: String, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        QueryError::Transport(err.to_string())
    }
}

/// Errors found while validating catalog entries
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog entry has an empty name")]
    EmptyName,

    #[error("catalog entry {0} has an empty query")]
    EmptyQuery(String),

    #[error("catalog entry {0} declares no columns")]
    NoColumns(String),

    #[error("catalog entry {entry} declares accessor {accessor} more than once")]
    DuplicateAccessor { entry: String, accessor: String },

    #[error("catalog entry {0} has a zero rate")]
    ZeroRate(String),

    #[error("catalog entry {entry} has an invalid version requirement {version}")]
    InvalidVersion { entry: String, version: String },

    #[error("catalog entry {0} is declared more than once")]
    DuplicateName(String),
}
