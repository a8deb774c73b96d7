//! REST adapters for BigQuery, Firestore and Google access tokens.

pub mod bigquery;
pub mod credentials;
pub mod firestore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use sync_core::config::SyncConfig;
use sync_core::error::SyncError;
use thiserror::Error;

use self::bigquery::BigQueryWarehouse;
use self::credentials::TokenSource;
use self::firestore::FirestoreStore;
use crate::handlers::sync::Connector;

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum GcpError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{service} returned status {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },
    #[error("malformed {service} response: {details}")]
    Malformed {
        service: &'static str,
        details: String,
    },
    #[error("{0}")]
    Credentials(String),
}

impl GcpError {
    pub fn malformed(service: &'static str, details: impl Into<String>) -> Self {
        Self::Malformed {
            service,
            details: details.into(),
        }
    }

    pub fn into_query_error(self) -> SyncError {
        match self {
            Self::Credentials(message) => SyncError::Credentials(message),
            other => SyncError::Query(other.to_string()),
        }
    }

    pub fn into_commit_error(self) -> SyncError {
        match self {
            Self::Credentials(message) => SyncError::Credentials(message),
            other => SyncError::Commit(other.to_string()),
        }
    }
}

/// Process-wide client handle: one HTTP client and one token source, built at
/// start-up and shared by every invocation.
#[derive(Clone)]
pub struct GcpConnector {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
}

impl GcpConnector {
    pub fn new(http: reqwest::Client, tokens: TokenSource) -> Self {
        Self {
            http,
            tokens: Arc::new(tokens),
        }
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GcpError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self::new(http, TokenSource::from_lookup(lookup)))
    }

    pub fn from_env() -> Result<Self, GcpError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

impl Connector for GcpConnector {
    type Warehouse = BigQueryWarehouse;
    type Store = FirestoreStore;

    fn warehouse(&self, config: &SyncConfig) -> Self::Warehouse {
        BigQueryWarehouse::new(
            self.http.clone(),
            Arc::clone(&self.tokens),
            config.project_id.clone(),
            config.location.clone(),
        )
    }

    fn document_store(&self, config: &SyncConfig) -> Self::Store {
        FirestoreStore::new(
            self.http.clone(),
            Arc::clone(&self.tokens),
            config.project_id.clone(),
            config.database.clone(),
        )
    }
}

/// Drives an async client call from the synchronous adapter seams.
///
/// Requires the multi-threaded runtime.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    response: reqwest::Response,
) -> Result<T, GcpError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(GcpError::Api {
            service,
            status: status.as_u16(),
            message: api_error_message(&body),
        });
    }
    serde_json::from_str(&body).map_err(|error| GcpError::malformed(service, error.to_string()))
}

/// Pulls `error.message` out of a Google API error body, falling back to the
/// raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
