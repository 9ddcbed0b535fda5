//! Core data models for cluster monitoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named query parameters, sent to the database as-is
pub type Params = BTreeMap<String, serde_json::Value>;

/// One sample result keyed by column (or derived/aliased) name
pub type Observation = BTreeMap<String, Value>;

/// A value held in an observation
///
/// Numbers are stored as `f64` so derived values such as a rate over a zero
/// interval stay representable. Non-finite numbers serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Numeric view of the value, if it is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view restricted to finite numbers
    pub fn as_finite(&self) -> Option<f64> {
        self.as_f64().filter(|n| n.is_finite())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// A value as returned by the database driver
///
/// Integers are kept distinct from floats and must be normalized with
/// [`QueryValue::into_value`] before they are stored in an observation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<QueryValue>),
    Map(BTreeMap<String, QueryValue>),
}

impl QueryValue {
    /// Normalize the driver value into a plain observation value
    pub fn into_value(self) -> Value {
        match self {
            QueryValue::Null => Value::Null,
            QueryValue::Bool(b) => Value::Bool(b),
            QueryValue::Integer(i) => Value::Number(i as f64),
            QueryValue::Float(f) => Value::Number(f),
            QueryValue::String(s) => Value::String(s),
            QueryValue::List(items) => {
                Value::List(items.into_iter().map(QueryValue::into_value).collect())
            }
            QueryValue::Map(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect(),
            ),
        }
    }

    /// Convert a JSON value as produced by the HTTP transport
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => QueryValue::Null,
            serde_json::Value::Bool(b) => QueryValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => QueryValue::Integer(i),
                None => QueryValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => QueryValue::String(s),
            serde_json::Value::Array(items) => {
                QueryValue::List(items.into_iter().map(QueryValue::from_json).collect())
            }
            serde_json::Value::Object(entries) => QueryValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, QueryValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// One result record
pub type Record = BTreeMap<String, QueryValue>;

/// Result of running a query against a member
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl QueryResult {
    /// Build a single-record result
    pub fn single(record: Record) -> Self {
        Self {
            columns: record.keys().cloned().collect(),
            records: vec![record],
        }
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }
}

/// Declares a field of interest in a query result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayColumn {
    pub header: String,
    pub accessor: String,
}

impl DisplayColumn {
    pub fn new(header: impl Into<String>, accessor: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            accessor: accessor.into(),
        }
    }
}

/// An observation stamped with the time the poll that produced it started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub data: Observation,
}

/// Closed time interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, swapping the bounds if they are reversed
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Whether the two ranges share at least one instant
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}
