//! Build metadata served on `/version`.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub source: &'static str,
    /// Set at build time through `APPCHECK_GIT_COMMIT`.
    pub git_commit: &'static str,
}

pub const NAME: &str = "appcheck";

pub fn info() -> ProjectInfo {
    ProjectInfo {
        name: NAME,
        version: env!("CARGO_PKG_VERSION"),
        description: env!("CARGO_PKG_DESCRIPTION"),
        source: env!("CARGO_PKG_REPOSITORY"),
        git_commit: option_env!("APPCHECK_GIT_COMMIT").unwrap_or("n/a"),
    }
}
