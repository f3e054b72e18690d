use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("app not found: {key}")]
    NotFound { key: String },

    #[error("app already exists: {key}")]
    AlreadyExists { key: String },

    #[error("revision conflict on {key}: {message}")]
    Conflict { key: String, message: String },

    /// The requested watch revision is no longer available.
    #[error("watch cursor expired: {0}")]
    Expired(String),

    #[error("resource store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid app resource: {0}")]
    Invalid(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Store unavailability; the whole operation may be retried as is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Optimistic-concurrency failure; retry after re-reading.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists { .. })
    }
}
