use thiserror::Error;

/// Failures that stop a sync run or a single batch.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("missing environment variables: {}", .0.join(", "))]
    MissingConfig(Vec<&'static str>),
    #[error("credentials unavailable: {0}")]
    Credentials(String),
    #[error("warehouse query failed: {0}")]
    Query(String),
    #[error("batch commit failed: {0}")]
    Commit(String),
}

impl SyncError {
    /// Stable code used in log lines and handler responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingConfig(_) => "missing_config",
            Self::Credentials(_) => "credentials_error",
            Self::Query(_) => "query_error",
            Self::Commit(_) => "commit_error",
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
