//! Wait-and-report shared by the webhook flow and the controller.

use std::fmt;
use std::sync::Arc;

use appcheck_core::models::app::{AppKey, AppResource};
use appcheck_core::models::report::DeploymentState;

use crate::error::{EngineError, format_err_chain};
use crate::ledger::Ledger;
use crate::reconcile::Baseline;
use crate::report::{ReportTarget, StatusReporter};
use crate::watch::{Observation, StatusWatcher, WaitOutcome, settled};

/// Which flow started the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Webhook,
    Controller,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Webhook => "webhook",
            Self::Controller => "controller",
        })
    }
}

/// How a tracked pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Succeeded { revision: u64 },
    Failed { reason: String },
    TimedOut,
    Aborted { reason: String },
}

pub struct Tracker {
    watcher: StatusWatcher,
    reporter: Arc<StatusReporter>,
    ledger: Arc<Ledger>,
}

impl Tracker {
    pub fn new(watcher: StatusWatcher, reporter: Arc<StatusReporter>, ledger: Arc<Ledger>) -> Self {
        Self {
            watcher,
            reporter,
            ledger,
        }
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    /// Wait for the App to settle after `baseline` and report the result.
    ///
    /// Every ending except `Aborted` produces exactly one terminal report.
    /// The ledger is written only for settled releases.
    pub async fn track(
        &self,
        trigger: Trigger,
        key: &AppKey,
        baseline: &Baseline,
        target: &ReportTarget,
    ) -> Result<TrackOutcome, EngineError> {
        let reporter = &self.reporter;
        let waited = self
            .watcher
            .wait(key, baseline, move |app: AppResource| async move {
                let reason = format!(
                    "waiting for app {} to be deployed, release status {:?}",
                    app.name, app.status.release.status
                );
                if let Err(err) = reporter
                    .report(target, DeploymentState::Pending, &reason)
                    .await
                {
                    tracing::warn!(
                        app = %app.key(),
                        error = %format_err_chain(&err),
                        "pending report failed"
                    );
                }
            })
            .await;

        match waited.outcome {
            WaitOutcome::Deployed => {
                self.succeed(trigger, key, waited.revision, target).await
            }
            WaitOutcome::Failed { reason } => {
                self.fail(trigger, key, waited.revision, target, reason).await
            }
            WaitOutcome::TimedOut => {
                let reason = EngineError::WaitTimeout {
                    key: key.to_string(),
                    after: self.watcher.config().window,
                }
                .to_string();
                tracing::warn!(app = %key, trigger = %trigger, "release did not settle in time");
                self.reporter
                    .report(target, DeploymentState::Failure, &reason)
                    .await?;
                Ok(TrackOutcome::TimedOut)
            }
            WaitOutcome::Aborted { reason } => {
                tracing::warn!(app = %key, trigger = %trigger, reason = %reason, "wait aborted");
                Ok(TrackOutcome::Aborted { reason })
            }
        }
    }

    /// Report right away if `app` has already settled at its requested
    /// version, otherwise [`track`](Self::track) it from its current state.
    pub async fn settle_or_track(
        &self,
        trigger: Trigger,
        app: &AppResource,
        target: &ReportTarget,
    ) -> Result<TrackOutcome, EngineError> {
        let key = app.key();
        match settled(app) {
            Observation::Deployed => self.succeed(trigger, &key, app.revision, target).await,
            Observation::Failed { reason } => {
                self.fail(trigger, &key, app.revision, target, reason).await
            }
            Observation::Watching => self.track(trigger, &key, &Baseline::of(app), target).await,
        }
    }

    async fn succeed(
        &self,
        trigger: Trigger,
        key: &AppKey,
        revision: u64,
        target: &ReportTarget,
    ) -> Result<TrackOutcome, EngineError> {
        tracing::info!(app = %key, trigger = %trigger, revision, "release deployed");
        self.reporter
            .report(
                target,
                DeploymentState::Success,
                &format!("app {} deployed", key.name),
            )
            .await?;
        self.ledger.record(key, revision);
        Ok(TrackOutcome::Succeeded { revision })
    }

    async fn fail(
        &self,
        trigger: Trigger,
        key: &AppKey,
        revision: u64,
        target: &ReportTarget,
        reason: String,
    ) -> Result<TrackOutcome, EngineError> {
        tracing::warn!(app = %key, trigger = %trigger, revision, reason = %reason, "release failed");
        self.reporter
            .report(target, DeploymentState::Failure, &reason)
            .await?;
        self.ledger.record(key, revision);
        Ok(TrackOutcome::Failed { reason })
    }
}
