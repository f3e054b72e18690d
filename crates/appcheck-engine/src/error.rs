use std::time::Duration;

use appcheck_core::CoreError;
use appcheck_github::GithubError;
use appcheck_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input. Raised before any resource mutation.
    #[error("validation failed: {0}")]
    Validation(#[from] CoreError),

    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency failure. Retry after re-reading.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store or API unavailable. Retry the operation as is.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("timed out after {}s waiting for app {key} to be deployed", after.as_secs())]
    WaitTimeout { key: String, after: Duration },
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Conflict(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        let msg = format_err_chain(&err);
        match err {
            StoreError::NotFound { .. } => Self::NotFound(msg),
            StoreError::AlreadyExists { .. } | StoreError::Conflict { .. } => Self::Conflict(msg),
            StoreError::Unavailable(_) | StoreError::Expired(_) => Self::Transient(msg),
            StoreError::Invalid(_) | StoreError::Serialization(_) => Self::Permanent(msg),
        }
    }
}

impl From<GithubError> for EngineError {
    fn from(err: GithubError) -> Self {
        let msg = format_err_chain(&err);
        if err.is_transient() {
            Self::Transient(msg)
        } else if err.status() == Some(404) {
            Self::NotFound(msg)
        } else {
            Self::Permanent(msg)
        }
    }
}

/// Walk the full error chain and join all causes into one string.
///
/// reqwest and kube errors keep the useful detail in their sources.
pub fn format_err_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
