//! The resource-watch-triggered direction.
//!
//! Follows every App in one namespace. New or changed Apps get an upstream
//! deployment (found or created) and are tracked to a terminal status;
//! deleted Apps mark their deployment inactive. Apps that did not settle in
//! time are re-read on a timer rather than by relabelling them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryFutureExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use appcheck_core::keys;
use appcheck_core::models::app::{AppKey, AppResource};
use appcheck_core::models::report::DeploymentState;
use appcheck_core::naming;
use appcheck_github::DeploymentApi;
use appcheck_github::models::{Deployment, DeploymentQuery, NewDeployment};
use appcheck_store::{AppStore, LabelPatch, StoreError, WatchEvent, WatchOptions};

use crate::error::{EngineError, format_err_chain};
use crate::ledger::Ledger;
use crate::report::ReportTarget;
use crate::retry::{RetryPolicy, with_retry};
use crate::track::{TrackOutcome, Tracker, Trigger};

/// Server-side lifetime of one watch subscription.
const WATCH_TIMEOUT: Duration = Duration::from_secs(290);

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub namespace: String,
    /// Organization owning the app repositories.
    pub org: String,
    pub environment: String,
    pub repoll_interval: Duration,
    pub max_repoll_attempts: usize,
    pub retry: RetryPolicy,
}

pub struct Controller {
    config: ControllerConfig,
    store: Arc<dyn AppStore>,
    api: Arc<dyn DeploymentApi>,
    tracker: Arc<Tracker>,
    ledger: Arc<Ledger>,
    /// Apps that have not settled yet, with the passes spent on them.
    stuck: HashMap<AppKey, usize>,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        store: Arc<dyn AppStore>,
        api: Arc<dyn DeploymentApi>,
        tracker: Arc<Tracker>,
        ledger: Arc<Ledger>,
    ) -> Self {
        Self {
            config,
            store,
            api,
            tracker,
            ledger,
            stuck: HashMap::new(),
        }
    }

    /// Passes spent on an App that has not settled yet.
    pub fn attempts(&self, key: &AppKey) -> Option<usize> {
        self.stuck.get(key).copied()
    }

    /// Run until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
        let mut cursor = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            cursor = self.initial_cursor() => cursor?,
        };
        tracing::info!(
            namespace = %self.config.namespace,
            revision = cursor,
            "controller started"
        );

        let mut repoll = tokio::time::interval(self.config.repoll_interval);
        repoll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        repoll.tick().await;

        'subscribe: loop {
            let options = WatchOptions::default()
                .labels(keys::legacy_retry_exclusion())
                .since(cursor)
                .timeout(WATCH_TIMEOUT);

            let opened = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                opened = self.store.watch(&self.config.namespace, &options) => opened,
            };
            let mut stream = match opened {
                Ok(stream) => stream,
                Err(StoreError::Expired(_)) => {
                    cursor = self.initial_cursor().await?;
                    continue 'subscribe;
                }
                Err(err) => {
                    tracing::warn!(error = %format_err_chain(&err), "opening watch failed");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.config.retry.delay) => {}
                    }
                    continue 'subscribe;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = repoll.tick() => {
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(()),
                            _ = self.repoll() => {}
                        }
                    }
                    next = stream.next() => match next {
                        None => {
                            tracing::debug!(revision = cursor, "watch closed, re-subscribing");
                            continue 'subscribe;
                        }
                        Some(Ok(event)) => {
                            cursor = cursor.max(event.revision());
                            tokio::select! {
                                _ = cancel.cancelled() => return Ok(()),
                                handled = self.handle_event(event) => {
                                    if let Err(err) = handled {
                                        tracing::warn!(
                                            error = %format_err_chain(&err),
                                            "controller pass failed"
                                        );
                                    }
                                }
                            }
                        }
                        Some(Err(StoreError::Expired(_))) => {
                            tracing::info!(revision = cursor, "watch cursor expired, re-listing");
                            cursor = self.initial_cursor().await?;
                            continue 'subscribe;
                        }
                        Some(Err(err)) => {
                            tracing::warn!(error = %format_err_chain(&err), "watch stream error");
                            continue 'subscribe;
                        }
                    }
                }
            }
        }
    }

    /// Highest revision across the namespace. Also strips the legacy retry
    /// label from Apps that still carry it so the watch can see them again.
    pub async fn initial_cursor(&self) -> Result<u64, EngineError> {
        let apps = with_retry(&self.config.retry, "list apps", || {
            self.store
                .list(&self.config.namespace)
                .map_err(EngineError::from)
        })
        .await?;

        let cursor = apps.iter().map(|app| app.revision).max().unwrap_or(0);

        for app in apps.iter().filter(|a| a.labels.contains_key(keys::LEGACY_RETRY_LABEL)) {
            if let Err(err) = self.remove_legacy_label(&app.key()).await {
                tracing::warn!(
                    app = %app.key(),
                    error = %format_err_chain(&err),
                    "removing legacy retry label failed"
                );
            }
        }

        Ok(cursor)
    }

    pub async fn handle_event(&mut self, event: WatchEvent) -> Result<(), EngineError> {
        match event {
            WatchEvent::Bookmark { .. } => Ok(()),
            WatchEvent::Added(app) | WatchEvent::Modified(app) => {
                let key = app.key();
                if self.ledger.is_in_flight(&key) {
                    tracing::debug!(app = %key, "app is being handled by a webhook pass");
                    return Ok(());
                }
                if !self.ledger.should_process(&key, app.revision) {
                    tracing::debug!(app = %key, revision = app.revision, "already processed");
                    return Ok(());
                }
                self.process(&app).await
            }
            WatchEvent::Deleted(app) => {
                let key = app.key();
                let result = self.deactivate(&app).await;
                self.ledger.remove(&key);
                self.stuck.remove(&key);
                result
            }
        }
    }

    /// Re-read every App that has not settled and track it again.
    pub async fn repoll(&mut self) {
        let keys: Vec<AppKey> = self.stuck.keys().cloned().collect();
        for key in keys {
            match self.store.get(&key).await {
                Ok(Some(app)) => {
                    tracing::info!(app = %key, revision = app.revision, "re-polling unsettled app");
                    if let Err(err) = self.process(&app).await {
                        tracing::warn!(
                            app = %key,
                            error = %format_err_chain(&err),
                            "re-poll pass failed"
                        );
                    }
                }
                Ok(None) => {
                    self.stuck.remove(&key);
                }
                Err(err) => {
                    tracing::warn!(app = %key, error = %format_err_chain(&err), "re-poll read failed");
                }
            }
        }
    }

    async fn process(&mut self, app: &AppResource) -> Result<(), EngineError> {
        let key = app.key();
        let deployment = self.find_or_create_deployment(app).await?;
        let target = ReportTarget::new(&self.config.org, &app.spec.name, deployment.id);

        let outcome = self
            .tracker
            .settle_or_track(Trigger::Controller, app, &target)
            .await?;

        match outcome {
            TrackOutcome::Succeeded { .. } => {
                self.stuck.remove(&key);
                if app.labels.contains_key(keys::LEGACY_RETRY_LABEL) {
                    let revision = self.remove_legacy_label(&key).await?;
                    self.ledger.record(&key, revision);
                }
            }
            TrackOutcome::Failed { .. } => {
                self.stuck.remove(&key);
            }
            TrackOutcome::TimedOut | TrackOutcome::Aborted { .. } => {
                let attempts = self.stuck.entry(key.clone()).or_insert(0);
                *attempts += 1;
                if *attempts >= self.config.max_repoll_attempts {
                    tracing::warn!(app = %key, attempts = *attempts, "giving up on unsettled app");
                    self.stuck.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn deactivate(&self, app: &AppResource) -> Result<(), EngineError> {
        let Some(deployment) = self.find_deployment(app).await? else {
            tracing::debug!(app = %app.key(), "no deployment to deactivate");
            return Ok(());
        };
        let target = ReportTarget::new(&self.config.org, &app.spec.name, deployment.id);
        self.tracker
            .reporter()
            .report(
                &target,
                DeploymentState::Inactive,
                &format!("app {} was deleted", app.name),
            )
            .await
    }

    async fn find_deployment(&self, app: &AppResource) -> Result<Option<Deployment>, EngineError> {
        let query = DeploymentQuery {
            environment: Some(self.config.environment.clone()),
            git_ref: Some(naming::deployment_ref(&app.spec.version)?),
        };
        let deployments = with_retry(&self.config.retry, "list deployments", || {
            self.api
                .list_deployments(&self.config.org, &app.spec.name, &query)
                .map_err(EngineError::from)
        })
        .await?;
        Ok(deployments.into_iter().next())
    }

    async fn find_or_create_deployment(&self, app: &AppResource) -> Result<Deployment, EngineError> {
        if let Some(deployment) = self.find_deployment(app).await? {
            return Ok(deployment);
        }

        let request = NewDeployment::unchecked(
            naming::deployment_ref(&app.spec.version)?,
            &self.config.environment,
        );
        tracing::info!(
            app = %app.key(),
            repo = %app.spec.name,
            git_ref = %request.git_ref,
            "creating deployment"
        );
        with_retry(&self.config.retry, "create deployment", || {
            self.api
                .create_deployment(&self.config.org, &app.spec.name, &request)
                .map_err(EngineError::from)
        })
        .await
    }

    async fn remove_legacy_label(&self, key: &AppKey) -> Result<u64, EngineError> {
        let mut patch = LabelPatch::new();
        patch.insert(keys::LEGACY_RETRY_LABEL.to_string(), None);
        let patched = self.store.patch_labels(key, &patch).await?;
        tracing::info!(app = %key, revision = patched.revision, "removed legacy retry label");
        Ok(patched.revision)
    }
}
