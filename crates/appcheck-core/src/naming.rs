//! Resource name and catalog resolution.
//!
//! Pure functions of the event fields and the parsed version. Replaying
//! the same deployment event always resolves to the same App, which is what
//! makes the create-or-update in the engine idempotent.

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::app::DesiredApp;
use crate::models::event::DeploymentRequest;

/// Suffix used instead of the ref for singleton deployments.
pub const UNIQUE_SUFFIX: &str = "unique";

/// Catalog naming rules.
///
/// All catalog names the resolver can produce live in this table so they
/// can be tuned from configuration without touching reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogPolicy {
    /// Catalog for versions without a pre-release component.
    pub stable_catalog: String,
    /// Catalog for pre-release versions.
    pub test_catalog: String,
    /// The umbrella repository. Its events name the chart to deploy in the
    /// payload and pick a catalog by branch instead of by version.
    pub umbrella_repo: String,
    /// Branch of the umbrella repository that deploys to production.
    pub umbrella_stable_branch: String,
    pub umbrella_stable_catalog: String,
    pub umbrella_test_catalog: String,
}

impl Default for CatalogPolicy {
    fn default() -> Self {
        Self::with_umbrella_repo("releases")
    }
}

impl CatalogPolicy {
    pub fn with_umbrella_repo(repo: &str) -> Self {
        Self {
            stable_catalog: "control-plane-catalog".into(),
            test_catalog: "control-plane-test-catalog".into(),
            umbrella_repo: repo.into(),
            umbrella_stable_branch: "master".into(),
            umbrella_stable_catalog: repo.into(),
            umbrella_test_catalog: format!("{repo}-test"),
        }
    }

    pub fn is_umbrella(&self, repo: &str) -> bool {
        repo == self.umbrella_repo
    }
}

/// Application name for an event: the chart for the umbrella repository,
/// the repository name otherwise.
pub fn app_name<'a>(
    policy: &CatalogPolicy,
    repo: &'a str,
    chart: Option<&'a str>,
) -> Result<&'a str, CoreError> {
    if policy.is_umbrella(repo) {
        chart.ok_or(CoreError::MissingChart)
    } else {
        Ok(repo)
    }
}

/// Resource name: `<app>-unique` for singleton deployments, `<app>-<ref>`
/// otherwise.
pub fn resolve_name(
    policy: &CatalogPolicy,
    repo: &str,
    git_ref: &str,
    chart: Option<&str>,
    unique: bool,
) -> Result<String, CoreError> {
    let app = app_name(policy, repo, chart)?;
    if unique {
        Ok(format!("{app}-{UNIQUE_SUFFIX}"))
    } else {
        Ok(format!("{app}-{git_ref}"))
    }
}

/// Catalog for a deployment.
///
/// Fails with a validation error when `app_version` is not a semantic
/// version, even for the umbrella repository whose catalog ignores it.
pub fn resolve_catalog(
    policy: &CatalogPolicy,
    repo: &str,
    git_ref: &str,
    app_version: &str,
) -> Result<String, CoreError> {
    let version = parse_version(app_version)?;

    if policy.is_umbrella(repo) {
        return Ok(if git_ref == policy.umbrella_stable_branch {
            policy.umbrella_stable_catalog.clone()
        } else {
            policy.umbrella_test_catalog.clone()
        });
    }

    if version.pre.is_empty() {
        Ok(policy.stable_catalog.clone())
    } else {
        Ok(policy.test_catalog.clone())
    }
}

/// Build the desired App for a deployment request.
///
/// Every validation happens here, before anything touches the store.
pub fn desired_app(
    policy: &CatalogPolicy,
    request: &DeploymentRequest,
) -> Result<DesiredApp, CoreError> {
    let event = &request.event;
    let payload = &request.payload;

    let catalog = resolve_catalog(policy, &event.repo, &event.git_ref, &payload.app_version)?;
    let name = resolve_name(
        policy,
        &event.repo,
        &event.git_ref,
        payload.chart(),
        payload.unique,
    )?;
    let app = app_name(policy, &event.repo, payload.chart())?;

    Ok(DesiredApp {
        name,
        namespace: payload.namespace.clone(),
        app_name: app.to_string(),
        catalog,
        version: payload.app_version.clone(),
        disable_force_upgrade: true,
    })
}

/// Upstream ref a deployed version corresponds to.
///
/// Pre-release builds are tagged by their pre-release component (the
/// commit), releases by `v<version>`.
pub fn deployment_ref(app_version: &str) -> Result<String, CoreError> {
    let version = parse_version(app_version)?;
    if version.pre.is_empty() {
        Ok(format!("v{version}"))
    } else {
        Ok(version.pre.as_str().to_string())
    }
}

/// Parse a semantic version, tolerating a leading `v`.
pub fn parse_version(raw: &str) -> Result<Version, CoreError> {
    let trimmed = raw.trim();
    let candidate = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(candidate).map_err(|source| CoreError::InvalidVersion {
        version: raw.to_string(),
        source,
    })
}
