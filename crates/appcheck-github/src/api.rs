use std::future::Future;
use std::pin::Pin;

use appcheck_core::models::report::DeploymentStatusReport;

use crate::error::GithubError;
use crate::models::{Deployment, DeploymentQuery, Hook, NewDeployment, NewHook};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The subset of the upstream REST API the service needs.
pub trait DeploymentApi: Send + Sync {
    /// Append a status to a deployment's timeline.
    fn create_deployment_status(
        &self,
        owner: &str,
        repo: &str,
        deployment_id: i64,
        report: &DeploymentStatusReport,
    ) -> BoxFuture<'_, Result<(), GithubError>>;

    /// Deployments of a repository, newest first.
    fn list_deployments(
        &self,
        owner: &str,
        repo: &str,
        query: &DeploymentQuery,
    ) -> BoxFuture<'_, Result<Vec<Deployment>, GithubError>>;

    fn create_deployment(
        &self,
        owner: &str,
        repo: &str,
        deployment: &NewDeployment,
    ) -> BoxFuture<'_, Result<Deployment, GithubError>>;

    fn list_org_hooks(&self, org: &str) -> BoxFuture<'_, Result<Vec<Hook>, GithubError>>;

    fn create_org_hook(&self, org: &str, hook: &NewHook)
    -> BoxFuture<'_, Result<Hook, GithubError>>;
}
