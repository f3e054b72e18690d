use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound on a status description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 140;

const ELLIPSIS: &str = "...";

/// State of an upstream deployment status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Pending,
    InProgress,
    Success,
    Failure,
    Inactive,
}

impl DeploymentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry on a deployment's status timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatusReport {
    pub state: DeploymentState,
    pub description: String,
    pub environment: String,
}

impl DeploymentStatusReport {
    pub fn new(state: DeploymentState, reason: &str, environment: impl Into<String>) -> Self {
        Self {
            state,
            description: truncate_description(reason),
            environment: environment.into(),
        }
    }
}

/// Clamp a description to [`MAX_DESCRIPTION_CHARS`].
///
/// Longer strings keep their first 137 characters followed by `...`.
/// Counts characters, not bytes, so multi-byte text is never split.
pub fn truncate_description(reason: &str) -> String {
    if reason.chars().count() <= MAX_DESCRIPTION_CHARS {
        return reason.to_string();
    }

    let keep = MAX_DESCRIPTION_CHARS - ELLIPSIS.len();
    let mut out: String = reason.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
