use appcheck_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("github request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("github returned {status} for {operation}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("invalid github response: {0}")]
    Decode(String),
}

impl GithubError {
    /// Network failures, rate limiting and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }
}

/// Rejections of an inbound webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing X-Hub-Signature-256 header")]
    MissingSignature,

    #[error("webhook signature does not match")]
    SignatureMismatch,

    #[error("missing X-GitHub-Event header")]
    MissingEventType,

    #[error("malformed webhook body: {0}")]
    Decode(String),

    #[error(transparent)]
    Validation(#[from] CoreError),
}
