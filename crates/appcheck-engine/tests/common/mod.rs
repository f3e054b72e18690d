#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use appcheck_core::models::app::{AppResource, AppSpec, AppStatus, KubeConfig, ReleaseInfo};
use appcheck_core::models::event::{DeploymentEvent, DeploymentRequest};
use appcheck_core::models::report::{DeploymentState, DeploymentStatusReport};
use appcheck_core::naming::CatalogPolicy;
use appcheck_engine::{
    Controller, ControllerConfig, DeploymentSync, Ledger, Reconciler, RetryPolicy, StatusReporter,
    StatusWatcher, SyncConfig, Tracker, WaitStrategy, WatchConfig,
};
use appcheck_github::models::{Deployment, DeploymentQuery, Hook, HookConfig, NewDeployment, NewHook};
use appcheck_github::{BoxFuture, DeploymentApi, GithubError};
use appcheck_store::{AppStore, MemoryAppStore};

pub const ENV: &str = "ginger";
pub const ORG: &str = "giantswarm";
pub const NAMESPACE: &str = "giantswarm";
pub const WINDOW: Duration = Duration::from_secs(300);
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatus {
    pub owner: String,
    pub repo: String,
    pub deployment_id: i64,
    pub report: DeploymentStatusReport,
}

#[derive(Default)]
struct ApiState {
    statuses: Vec<RecordedStatus>,
    deployments: Vec<(String, Deployment)>,
    hooks: Vec<Hook>,
    next_id: i64,
    fail_statuses: usize,
    slow_statuses: Option<(DeploymentState, Duration)>,
    calls: usize,
}

/// Records every call; deployments and hooks live in memory.
#[derive(Default)]
pub struct RecordingApi {
    state: Mutex<ApiState>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<RecordedStatus> {
        self.state.lock().unwrap().statuses.clone()
    }

    pub fn states(&self) -> Vec<DeploymentState> {
        self.statuses().into_iter().map(|s| s.report.state).collect()
    }

    pub fn last_status(&self) -> Option<RecordedStatus> {
        self.statuses().pop()
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn add_deployment(&self, repo: &str, git_ref: &str, environment: &str) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = 1000 + state.next_id;
        state.deployments.push((
            repo.to_string(),
            Deployment {
                id,
                git_ref: git_ref.to_string(),
                environment: environment.to_string(),
                payload: serde_json::Value::Null,
            },
        ));
        id
    }

    pub fn deployments(&self, repo: &str) -> Vec<Deployment> {
        self.state
            .lock()
            .unwrap()
            .deployments
            .iter()
            .filter(|(r, _)| r == repo)
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub fn hooks(&self) -> Vec<Hook> {
        self.state.lock().unwrap().hooks.clone()
    }

    pub fn add_hook(&self, url: &str) {
        self.add_hook_with(url, true, &["deployment"]);
    }

    pub fn add_hook_with(&self, url: &str, active: bool, events: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.hooks.push(Hook {
            id,
            name: "web".into(),
            active,
            events: events.iter().map(|e| e.to_string()).collect(),
            config: HookConfig {
                url: Some(url.into()),
                content_type: Some("json".into()),
                secret: None,
            },
        });
    }

    /// Make every submission of `state` take `delay` before it is recorded.
    pub fn slow_statuses(&self, state: DeploymentState, delay: Duration) {
        self.state.lock().unwrap().slow_statuses = Some((state, delay));
    }

    /// Fail the next `n` status submissions with a 503.
    pub fn fail_next_statuses(&self, n: usize) {
        self.state.lock().unwrap().fail_statuses = n;
    }
}

impl DeploymentApi for RecordingApi {
    fn create_deployment_status(
        &self,
        owner: &str,
        repo: &str,
        deployment_id: i64,
        report: &DeploymentStatusReport,
    ) -> BoxFuture<'_, Result<(), GithubError>> {
        let recorded = RecordedStatus {
            owner: owner.to_string(),
            repo: repo.to_string(),
            deployment_id,
            report: report.clone(),
        };
        Box::pin(async move {
            let slow = self.state.lock().unwrap().slow_statuses;
            if let Some((slow_state, delay)) = slow {
                if slow_state == recorded.report.state {
                    tokio::time::sleep(delay).await;
                }
            }
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            if state.fail_statuses > 0 {
                state.fail_statuses -= 1;
                return Err(GithubError::Status {
                    operation: "create deployment status",
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            state.statuses.push(recorded);
            Ok(())
        })
    }

    fn list_deployments(
        &self,
        _owner: &str,
        repo: &str,
        query: &DeploymentQuery,
    ) -> BoxFuture<'_, Result<Vec<Deployment>, GithubError>> {
        let repo = repo.to_string();
        let query = query.clone();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            Ok(state
                .deployments
                .iter()
                .filter(|(r, _)| *r == repo)
                .map(|(_, d)| d)
                .filter(|d| query.environment.as_ref().is_none_or(|e| *e == d.environment))
                .filter(|d| query.git_ref.as_ref().is_none_or(|g| *g == d.git_ref))
                .cloned()
                .collect())
        })
    }

    fn create_deployment(
        &self,
        _owner: &str,
        repo: &str,
        deployment: &NewDeployment,
    ) -> BoxFuture<'_, Result<Deployment, GithubError>> {
        let repo = repo.to_string();
        let deployment = deployment.clone();
        Box::pin(async move {
            self.state.lock().unwrap().calls += 1;
            let id = self.add_deployment(&repo, &deployment.git_ref, &deployment.environment);
            Ok(Deployment {
                id,
                git_ref: deployment.git_ref,
                environment: deployment.environment,
                payload: serde_json::Value::Null,
            })
        })
    }

    fn list_org_hooks(&self, _org: &str) -> BoxFuture<'_, Result<Vec<Hook>, GithubError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            Ok(state.hooks.clone())
        })
    }

    fn create_org_hook(
        &self,
        _org: &str,
        hook: &NewHook,
    ) -> BoxFuture<'_, Result<Hook, GithubError>> {
        let hook = hook.clone();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            state.next_id += 1;
            let created = Hook {
                id: state.next_id,
                name: hook.name,
                active: hook.active,
                events: hook.events,
                config: hook.config,
            };
            state.hooks.push(created.clone());
            Ok(created)
        })
    }
}

pub struct Harness {
    pub store: Arc<MemoryAppStore>,
    pub api: Arc<RecordingApi>,
    pub ledger: Arc<Ledger>,
    pub tracker: Arc<Tracker>,
    pub reporter: Arc<StatusReporter>,
    pub retry: RetryPolicy,
}

impl Harness {
    pub fn new(strategy: WaitStrategy) -> Self {
        Self::with_config(WatchConfig {
            strategy,
            window: WINDOW,
            poll_interval: POLL_INTERVAL,
            max_resubscribes: 3,
        })
    }

    pub fn with_config(config: WatchConfig) -> Self {
        let store = Arc::new(MemoryAppStore::new());
        let api = Arc::new(RecordingApi::new());
        let ledger = Arc::new(Ledger::new());
        let retry = RetryPolicy {
            delay: Duration::from_millis(10),
            max_attempts: 3,
        };
        let reporter = Arc::new(StatusReporter::new(
            api.clone() as Arc<dyn DeploymentApi>,
            ENV,
            retry,
        ));
        let watcher = StatusWatcher::new(store.clone() as Arc<dyn AppStore>, config);
        let tracker = Arc::new(Tracker::new(watcher, reporter.clone(), ledger.clone()));
        Self {
            store,
            api,
            ledger,
            tracker,
            reporter,
            retry,
        }
    }

    pub fn sync(&self) -> DeploymentSync {
        self.sync_with(SyncConfig {
            environment: ENV.into(),
            skip_repos: vec!["draughtsman".into()],
            catalogs: CatalogPolicy::default(),
            retry: self.retry,
        })
    }

    pub fn sync_with(&self, config: SyncConfig) -> DeploymentSync {
        DeploymentSync::new(
            config,
            Reconciler::new(self.store.clone() as Arc<dyn AppStore>),
            self.tracker.clone(),
            self.reporter.clone(),
            self.ledger.clone(),
        )
    }

    pub fn controller(&self) -> Controller {
        self.controller_on(self.store.clone() as Arc<dyn AppStore>)
    }

    /// A controller reading through `store` instead of the harness store.
    pub fn controller_on(&self, store: Arc<dyn AppStore>) -> Controller {
        Controller::new(
            ControllerConfig {
                namespace: NAMESPACE.into(),
                org: ORG.into(),
                environment: ENV.into(),
                repoll_interval: Duration::from_secs(60),
                max_repoll_attempts: 3,
                retry: self.retry,
            },
            store,
            self.api.clone() as Arc<dyn DeploymentApi>,
            self.tracker.clone(),
            self.ledger.clone(),
        )
    }
}

pub fn request(repo: &str, git_ref: &str, payload: serde_json::Value) -> DeploymentRequest {
    DeploymentRequest::new(DeploymentEvent {
        repo: repo.into(),
        owner: ORG.into(),
        git_ref: git_ref.into(),
        environment: ENV.into(),
        deployment_id: 42,
        payload,
    })
    .unwrap()
}

pub fn app(name: &str, app_name: &str, version: &str) -> AppResource {
    AppResource {
        name: name.into(),
        namespace: NAMESPACE.into(),
        revision: 0,
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        spec: AppSpec {
            name: app_name.into(),
            namespace: NAMESPACE.into(),
            catalog: "control-plane-catalog".into(),
            version: version.into(),
            kube_config: KubeConfig { in_cluster: true },
        },
        status: AppStatus::default(),
    }
}

pub fn status(release: &str, version: &str, reason: &str, deployed_at: Option<&str>) -> AppStatus {
    AppStatus {
        release: ReleaseInfo {
            status: release.into(),
            reason: reason.into(),
            last_deployed: deployed_at.map(|t| t.parse().unwrap()),
        },
        version: version.into(),
    }
}

/// Let other tasks run until `cond` holds. Sleeps rather than yields so a
/// paused clock can advance to pending timers.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
