use std::sync::Arc;

use futures::TryFutureExt;

use appcheck_core::models::report::{DeploymentState, DeploymentStatusReport};
use appcheck_github::DeploymentApi;

use crate::error::EngineError;
use crate::retry::{RetryPolicy, with_retry};

/// The upstream deployment a report belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTarget {
    pub owner: String,
    pub repo: String,
    pub deployment_id: i64,
}

impl ReportTarget {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, deployment_id: i64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            deployment_id,
        }
    }
}

/// Submits deployment statuses for the configured environment.
///
/// Statuses form an append-only timeline upstream, so sending the same
/// state twice is harmless.
pub struct StatusReporter {
    api: Arc<dyn DeploymentApi>,
    environment: String,
    retry: RetryPolicy,
}

impl StatusReporter {
    pub fn new(
        api: Arc<dyn DeploymentApi>,
        environment: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            environment: environment.into(),
            retry,
        }
    }

    pub async fn report(
        &self,
        target: &ReportTarget,
        state: DeploymentState,
        reason: &str,
    ) -> Result<(), EngineError> {
        let report = DeploymentStatusReport::new(state, reason, &self.environment);

        with_retry(&self.retry, "create deployment status", || {
            self.api
                .create_deployment_status(
                    &target.owner,
                    &target.repo,
                    target.deployment_id,
                    &report,
                )
                .map_err(EngineError::from)
        })
        .await?;

        tracing::info!(
            repo = %target.repo,
            deployment_id = target.deployment_id,
            state = %state,
            description = %report.description,
            "reported deployment status"
        );
        Ok(())
    }
}
