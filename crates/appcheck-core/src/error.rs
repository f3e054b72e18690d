use thiserror::Error;

/// Validation failures. None of these ever lead to a resource mutation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field `{0}` in payload")]
    MissingField(&'static str),

    #[error("invalid app version {version:?}: {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("umbrella repository deployment requires a `chart` field")]
    MissingChart,
}
