//! Member backed by the database's HTTP transactional endpoint

use super::ClusterMember;
use crate::error::QueryError;
use crate::models::{Params, QueryResult, QueryValue, Record};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Runs queries with `POST {address}/db/{database}/tx/commit`
#[derive(Debug, Clone)]
pub struct HttpMember {
    address: String,
    label: String,
    endpoint: Url,
    client: Client,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: [Statement<'a>; 1],
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: &'a Params,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<DatabaseError>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<ResultRow>,
}

#[derive(Deserialize)]
struct ResultRow {
    row: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct DatabaseError {
    code: String,
    message: String,
}

impl HttpMember {
    /// Create a member for the given base address and database name
    pub fn new(
        address: &str,
        label: impl Into<String>,
        database: &str,
        timeout: Duration,
    ) -> Result<Self, QueryError> {
        let mut base = Url::parse(address)
            .map_err(|e| QueryError::Transport(format!("invalid member address {}: {}", address, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join(&format!("db/{}/tx/commit", database))
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            address: address.trim_end_matches('/').to_string(),
            label: label.into(),
            endpoint,
            client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ClusterMember for HttpMember {
    fn address(&self) -> &str {
        &self.address
    }

    fn label(&self) -> &str {
        &self.label
    }

    async fn run(&self, query: &str, params: &Params) -> Result<QueryResult, QueryError> {
        let body = CommitRequest {
            statements: [Statement {
                statement: query,
                parameters: params,
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(QueryError::Transport(format!("HTTP {}: {}", status, text)));
        }

        let commit: CommitResponse = response
            .json()
            .await
            .map_err(|e| QueryError::Malformed(e.to_string()))?;

        if let Some(err) = commit.errors.into_iter().next() {
            return Err(QueryError::Database {
                code: err.code,
                message: err.message,
            });
        }

        let result = commit
            .results
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::Malformed("response contained no results".to_string()))?;

        debug!(member = %self.label, rows = result.data.len(), "Query returned");
        Ok(to_query_result(result))
    }
}

fn to_query_result(result: StatementResult) -> QueryResult {
    let records = result
        .data
        .into_iter()
        .map(|row| {
            result
                .columns
                .iter()
                .cloned()
                .zip(row.row.into_iter().map(QueryValue::from_json))
                .collect::<Record>()
        })
        .collect();

    QueryResult {
        columns: result.columns,
        records,
    }
}
