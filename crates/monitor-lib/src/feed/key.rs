//! Canonical feed identity

use crate::models::{DisplayColumn, Params};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Identity of a feed: member address, normalized query, parameters and
/// display-column shape. Two requests with equal keys share one live feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FeedKey(String);

impl FeedKey {
    pub fn new(address: &str, query: &str, params: &Params, columns: &[DisplayColumn]) -> Self {
        // BTreeMap-backed params serialize with sorted keys
        let params = serde_json::to_string(params).unwrap_or_default();
        let columns = serde_json::to_string(columns).unwrap_or_default();
        Self(format!(
            "{}|{}|{}|{}",
            address,
            normalize_query(query),
            params,
            columns
        ))
    }

    /// Short stable identifier suitable for URLs
    pub fn id(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..8])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapse whitespace runs so formatting differences don't split feeds
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}
