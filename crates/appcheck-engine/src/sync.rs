//! The webhook-triggered pass: deployment request in, status reports out.

use std::fmt;
use std::sync::Arc;

use appcheck_core::models::event::DeploymentRequest;
use appcheck_core::models::report::DeploymentState;
use appcheck_core::naming::{self, CatalogPolicy};

use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::reconcile::{ReconcileAction, Reconciler};
use crate::report::{ReportTarget, StatusReporter};
use crate::retry::{RetryPolicy, with_retry};
use crate::track::{TrackOutcome, Tracker, Trigger};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Installation environment. Events for other environments are ignored.
    pub environment: String,
    /// Repositories whose deployments this service never handles.
    pub skip_repos: Vec<String>,
    pub catalogs: CatalogPolicy,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OtherEnvironment,
    SkippedRepo,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::OtherEnvironment => "deployment is for another environment",
            Self::SkippedRepo => "repository is excluded",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Ignored(IgnoreReason),
    Tracked {
        action: ReconcileAction,
        outcome: TrackOutcome,
    },
}

pub struct DeploymentSync {
    config: SyncConfig,
    reconciler: Reconciler,
    tracker: Arc<Tracker>,
    reporter: Arc<StatusReporter>,
    ledger: Arc<Ledger>,
}

impl DeploymentSync {
    pub fn new(
        config: SyncConfig,
        reconciler: Reconciler,
        tracker: Arc<Tracker>,
        reporter: Arc<StatusReporter>,
        ledger: Arc<Ledger>,
    ) -> Self {
        Self {
            config,
            reconciler,
            tracker,
            reporter,
            ledger,
        }
    }

    /// Run one deployment request to completion.
    ///
    /// Returns once a terminal status has been reported or the wait was
    /// aborted, so the caller's latency is bounded by the wait window.
    pub async fn handle(&self, request: &DeploymentRequest) -> Result<SyncOutcome, EngineError> {
        let event = &request.event;

        if event.environment != self.config.environment {
            tracing::debug!(
                repo = %event.repo,
                environment = %event.environment,
                "deployment is for another environment"
            );
            return Ok(SyncOutcome::Ignored(IgnoreReason::OtherEnvironment));
        }
        if self.config.skip_repos.iter().any(|r| *r == event.repo) {
            tracing::info!(repo = %event.repo, "skipping deployment for excluded repository");
            return Ok(SyncOutcome::Ignored(IgnoreReason::SkippedRepo));
        }

        let desired = naming::desired_app(&self.config.catalogs, request)?;
        let key = desired.key();
        let target = ReportTarget::new(&event.owner, &event.repo, event.deployment_id);

        tracing::info!(
            app = %key,
            repo = %event.repo,
            git_ref = %event.git_ref,
            deployment_id = event.deployment_id,
            version = %desired.version,
            catalog = %desired.catalog,
            "handling deployment"
        );

        // Keep the controller off this App until the pass is over.
        let _claim = self.ledger.claim(&key);

        let reconciled = with_retry(&self.config.retry, "reconcile app", || {
            self.reconciler.reconcile(&desired)
        })
        .await?;

        self.reporter
            .report(
                &target,
                DeploymentState::InProgress,
                &format!("app {} {}", key.name, reconciled.action),
            )
            .await?;

        let outcome = match reconciled.action {
            ReconcileAction::Unchanged => {
                self.tracker
                    .settle_or_track(Trigger::Webhook, &reconciled.app, &target)
                    .await?
            }
            ReconcileAction::Created | ReconcileAction::Updated => {
                self.tracker
                    .track(Trigger::Webhook, &key, &reconciled.baseline, &target)
                    .await?
            }
        };

        Ok(SyncOutcome::Tracked {
            action: reconciled.action,
            outcome,
        })
    }
}
