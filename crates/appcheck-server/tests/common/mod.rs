#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use tower::ServiceExt;

use appcheck_core::models::report::{DeploymentState, DeploymentStatusReport};
use appcheck_core::naming::CatalogPolicy;
use appcheck_engine::{
    DeploymentSync, Ledger, Reconciler, RetryPolicy, StatusReporter, StatusWatcher, SyncConfig,
    Tracker, WaitStrategy, WatchConfig,
};
use appcheck_github::models::{Deployment, DeploymentQuery, Hook, NewDeployment, NewHook};
use appcheck_github::webhook::{EVENT_HEADER, SIGNATURE_HEADER};
use appcheck_github::{BoxFuture, DeploymentApi, EventDecoder, GithubError};
use appcheck_server::{AppState, router};
use appcheck_store::{AppStore, MemoryAppStore};

pub const SECRET: &str = "webhook-secret";
pub const ENV: &str = "ginger";

/// Keeps the submitted statuses; every other call is unsupported.
#[derive(Default)]
pub struct StatusLog {
    reports: Mutex<Vec<DeploymentStatusReport>>,
}

impl StatusLog {
    pub fn states(&self) -> Vec<DeploymentState> {
        self.reports.lock().unwrap().iter().map(|r| r.state).collect()
    }
}

fn unsupported(operation: &'static str) -> GithubError {
    GithubError::Status {
        operation,
        status: 501,
        message: "not supported by the test api".into(),
    }
}

impl DeploymentApi for StatusLog {
    fn create_deployment_status(
        &self,
        _owner: &str,
        _repo: &str,
        _deployment_id: i64,
        report: &DeploymentStatusReport,
    ) -> BoxFuture<'_, Result<(), GithubError>> {
        let report = report.clone();
        Box::pin(async move {
            self.reports.lock().unwrap().push(report);
            Ok(())
        })
    }

    fn list_deployments(
        &self,
        _owner: &str,
        _repo: &str,
        _query: &DeploymentQuery,
    ) -> BoxFuture<'_, Result<Vec<Deployment>, GithubError>> {
        Box::pin(async { Err(unsupported("list deployments")) })
    }

    fn create_deployment(
        &self,
        _owner: &str,
        _repo: &str,
        _deployment: &NewDeployment,
    ) -> BoxFuture<'_, Result<Deployment, GithubError>> {
        Box::pin(async { Err(unsupported("create deployment")) })
    }

    fn list_org_hooks(&self, _org: &str) -> BoxFuture<'_, Result<Vec<Hook>, GithubError>> {
        Box::pin(async { Err(unsupported("list hooks")) })
    }

    fn create_org_hook(
        &self,
        _org: &str,
        _hook: &NewHook,
    ) -> BoxFuture<'_, Result<Hook, GithubError>> {
        Box::pin(async { Err(unsupported("create hook")) })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryAppStore>,
    pub api: Arc<StatusLog>,
}

impl TestApp {
    pub fn new(request_timeout: Duration) -> Self {
        let store = Arc::new(MemoryAppStore::new());
        let api = Arc::new(StatusLog::default());
        let ledger = Arc::new(Ledger::new());
        let retry = RetryPolicy {
            delay: Duration::from_millis(10),
            max_attempts: 2,
        };
        let reporter = Arc::new(StatusReporter::new(
            api.clone() as Arc<dyn DeploymentApi>,
            ENV,
            retry,
        ));
        let tracker = Arc::new(Tracker::new(
            StatusWatcher::new(
                store.clone() as Arc<dyn AppStore>,
                WatchConfig {
                    strategy: WaitStrategy::Push,
                    ..WatchConfig::default()
                },
            ),
            reporter.clone(),
            ledger.clone(),
        ));
        let sync = DeploymentSync::new(
            SyncConfig {
                environment: ENV.into(),
                skip_repos: vec!["draughtsman".into()],
                catalogs: CatalogPolicy::default(),
                retry,
            },
            Reconciler::new(store.clone() as Arc<dyn AppStore>),
            tracker,
            reporter,
            ledger,
        );
        let state = AppState {
            decoder: EventDecoder::new(SECRET),
            sync: Arc::new(sync),
        };

        Self {
            router: router(state, request_timeout),
            store,
            api,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn delivery(event_type: &str, body: &serde_json::Value) -> Request<Body> {
    let body = serde_json::to_vec(body).unwrap();
    let signature = EventDecoder::new(SECRET).sign(&body);
    Request::post("/")
        .header(EVENT_HEADER, event_type)
        .header(SIGNATURE_HEADER, signature)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub fn deployment_body(repo: &str, environment: &str, payload: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "deployment": {
            "id": 42,
            "ref": "v1.2.3",
            "environment": environment,
            "payload": payload
        },
        "repository": {
            "name": repo,
            "owner": { "login": "giantswarm" }
        }
    })
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
