//! Shared fakes for unit tests

use crate::diagnostics::{DiagnosticsSink, ErrorContext, ErrorSource};
use crate::error::QueryError;
use crate::member::{async_trait, ClusterMember};
use crate::models::{Params, QueryResult, QueryValue, Record};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Member that replays scripted responses and records when it was called
pub struct MockMember {
    address: String,
    label: String,
    responses: Mutex<VecDeque<Result<QueryResult, QueryError>>>,
    calls: Mutex<Vec<Instant>>,
    delay: Duration,
}

impl MockMember {
    pub fn new(label: &str) -> Self {
        Self {
            address: format!("http://{}:7474", label),
            label: label.to_string(),
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Make every query take this long
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn respond(&self, response: Result<QueryResult, QueryError>) {
        self.responses.lock().push_back(response);
    }

    pub fn respond_record(&self, pairs: &[(&str, QueryValue)]) {
        self.respond(Ok(record(pairs)));
    }

    pub fn fail(&self, message: &str) {
        self.respond(Err(QueryError::Transport(message.to_string())));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ClusterMember for MockMember {
    fn address(&self) -> &str {
        &self.address
    }

    fn label(&self) -> &str {
        &self.label
    }

    async fn run(&self, _query: &str, _params: &Params) -> Result<QueryResult, QueryError> {
        self.calls.lock().push(Instant::now());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.responses.lock().pop_front();
        next.unwrap_or_else(|| Ok(QueryResult::default()))
    }
}

pub fn record(pairs: &[(&str, QueryValue)]) -> QueryResult {
    let record: Record = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    QueryResult::single(record)
}

/// Sink that keeps everything it is given
#[derive(Default)]
pub struct RecordingSink {
    pub errors: Mutex<Vec<(ErrorSource, String)>>,
    pub warnings: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn error_sources(&self) -> Vec<ErrorSource> {
        self.errors.lock().iter().map(|(s, _)| *s).collect()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn report_error(&self, error: &anyhow::Error, context: &ErrorContext) {
        self.errors.lock().push((context.source, error.to_string()));
    }

    fn warn(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }
}
