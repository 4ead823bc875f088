//! Boundary with the graph store's transactional HTTP endpoint.
//!
//! The store accepts `{ statements: [...] }` and answers with one columnar
//! result per statement plus a transaction-level error list. This module only
//! moves those payloads; interpreting them is the reshaper's job.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::statement::Statement;

/// Errors raised while talking to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection, timeout or body decoding failure.
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("store answered with HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnosis.
        body: String,
    },
    /// The endpoint answered, but not with a transaction response body.
    #[error("store response is not a transaction result: {0}")]
    Decode(#[source] serde_json::Error),
    /// The client could not be constructed from its settings.
    #[error("invalid store client configuration: {0}")]
    Config(String),
}

/// Request body for the transactional endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Statements executed in one transaction.
    pub statements: Vec<Statement>,
}

impl TransactionRequest {
    /// Wraps a single statement.
    pub fn single(statement: Statement) -> Self {
        Self {
            statements: vec![statement],
        }
    }
}

/// Response body of the transactional endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionResponse {
    /// One result per submitted statement.
    #[serde(default)]
    pub results: Vec<StatementResult>,
    /// Errors reported by the store; non-empty means the statement failed.
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// Columnar result of one statement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    /// Column names, in return order.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Result rows.
    #[serde(default)]
    pub data: Vec<Row>,
}

/// One result row.
///
/// `meta` is a flat pool: list-valued cells consume one entry per element,
/// left to right.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Cell values, one per column.
    #[serde(default)]
    pub row: Vec<Value>,
    /// Per-value metadata pool.
    #[serde(default)]
    pub meta: Vec<Value>,
}

/// Executes statements against the graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Sends the request and returns the decoded response.
    async fn execute(&self, request: TransactionRequest) -> Result<TransactionResponse, StoreError>;
}

#[async_trait]
impl<T: GraphStore + ?Sized> GraphStore for Arc<T> {
    async fn execute(&self, request: TransactionRequest) -> Result<TransactionResponse, StoreError> {
        (**self).execute(request).await
    }
}

/// Settings for [`HttpStore`].
#[derive(Clone, Debug)]
pub struct HttpStoreOptions {
    /// Transactional commit endpoint.
    pub url: String,
    /// Headers added to every request (credentials and the like).
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout; `None` relies on the transport defaults.
    pub timeout: Option<Duration>,
}

impl HttpStoreOptions {
    /// Options for `url` with no extra headers and no timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout: None,
        }
    }
}

/// [`GraphStore`] backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpStore {
    url: String,
    http: Client,
}

impl HttpStore {
    /// Builds the HTTP client.
    pub fn new(options: HttpStoreOptions) -> Result<Self, StoreError> {
        if options.url.trim().is_empty() {
            return Err(StoreError::Config("store url cannot be empty".into()));
        }
        let headers = header_map(&options.headers)?;
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| StoreError::Config(err.to_string()))?;
        Ok(Self {
            url: options.url,
            http,
        })
    }

    /// Endpoint this store posts to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl GraphStore for HttpStore {
    async fn execute(&self, request: TransactionRequest) -> Result<TransactionResponse, StoreError> {
        let response = self.http.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(StoreError::Decode)
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, StoreError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| StoreError::Config(format!("header name '{name}': {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| StoreError::Config(format!("header '{name}' value: {err}")))?;
        map.insert(name, value);
    }
    Ok(map)
}
