use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;

use appcheck_core::models::report::DeploymentStatusReport;

use crate::api::{BoxFuture, DeploymentApi};
use crate::error::GithubError;
use crate::models::{Deployment, DeploymentQuery, Hook, NewDeployment, NewHook};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Cap on a single API call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("appcheck/", env!("CARGO_PKG_VERSION"));

/// REST client authenticated with a static token.
#[derive(Clone)]
pub struct GithubClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GithubClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GithubError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            token: token.into(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, GithubError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| String::from_utf8_lossy(&body).to_string());

        Err(GithubError::Status {
            operation,
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, GithubError> {
        let response = self.send(operation, request).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| GithubError::Decode(format!("{operation}: {e}")))
    }
}

impl DeploymentApi for GithubClient {
    fn create_deployment_status(
        &self,
        owner: &str,
        repo: &str,
        deployment_id: i64,
        report: &DeploymentStatusReport,
    ) -> BoxFuture<'_, Result<(), GithubError>> {
        let path = format!("/repos/{owner}/{repo}/deployments/{deployment_id}/statuses");
        let request = self.request(Method::POST, &path).json(report);
        Box::pin(async move {
            self.send("create deployment status", request).await?;
            Ok(())
        })
    }

    fn list_deployments(
        &self,
        owner: &str,
        repo: &str,
        query: &DeploymentQuery,
    ) -> BoxFuture<'_, Result<Vec<Deployment>, GithubError>> {
        let path = format!("/repos/{owner}/{repo}/deployments");
        let mut params = Vec::new();
        if let Some(environment) = &query.environment {
            params.push(("environment", environment.clone()));
        }
        if let Some(git_ref) = &query.git_ref {
            params.push(("ref", git_ref.clone()));
        }
        let request = self.request(Method::GET, &path).query(&params);
        Box::pin(async move { self.send_json("list deployments", request).await })
    }

    fn create_deployment(
        &self,
        owner: &str,
        repo: &str,
        deployment: &NewDeployment,
    ) -> BoxFuture<'_, Result<Deployment, GithubError>> {
        let path = format!("/repos/{owner}/{repo}/deployments");
        let request = self.request(Method::POST, &path).json(deployment);
        Box::pin(async move { self.send_json("create deployment", request).await })
    }

    fn list_org_hooks(&self, org: &str) -> BoxFuture<'_, Result<Vec<Hook>, GithubError>> {
        let request = self.request(Method::GET, &format!("/orgs/{org}/hooks"));
        Box::pin(async move { self.send_json("list org hooks", request).await })
    }

    fn create_org_hook(
        &self,
        org: &str,
        hook: &NewHook,
    ) -> BoxFuture<'_, Result<Hook, GithubError>> {
        let request = self
            .request(Method::POST, &format!("/orgs/{org}/hooks"))
            .json(hook);
        Box::pin(async move { self.send_json("create org hook", request).await })
    }
}
