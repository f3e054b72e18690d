//! Create-or-update of the desired App against the store.

use std::fmt;
use std::sync::Arc;

use appcheck_core::models::app::{AppResource, DesiredApp};
use appcheck_store::{AppStore, StoreError};

use crate::error::EngineError;

/// Re-reads allowed when a write loses an optimistic-concurrency race.
const MAX_CONFLICT_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        })
    }
}

/// What the App looked like right after reconciliation. Waiting starts
/// here: notifications at or below `revision` are stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub revision: u64,
    pub last_deployed: Option<jiff::Timestamp>,
}

impl Baseline {
    pub fn of(app: &AppResource) -> Self {
        Self {
            revision: app.revision,
            last_deployed: app.status.release.last_deployed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub app: AppResource,
    pub action: ReconcileAction,
    pub baseline: Baseline,
}

/// Only the fields that carry deployment intent: name, spec and labels.
pub fn equals(current: &AppResource, desired: &AppResource) -> bool {
    current.name == desired.name
        && current.spec == desired.spec
        && current.labels == desired.labels
}

pub struct Reconciler {
    store: Arc<dyn AppStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn AppStore>) -> Self {
        Self { store }
    }

    /// Make the stored App match `desired`.
    ///
    /// Reads fresh state on every attempt. Updates carry the stored revision,
    /// so a concurrent writer causes a conflict and another read instead of
    /// a lost update.
    pub async fn reconcile(&self, desired: &DesiredApp) -> Result<Reconciled, EngineError> {
        let key = desired.key();
        let wanted = desired.to_resource();
        let mut last_conflict = None;

        for _ in 0..=MAX_CONFLICT_RETRIES {
            let current = self.store.get(&key).await?;

            let result = match current {
                None => {
                    tracing::info!(app = %key, version = %desired.version, "creating app");
                    self.store
                        .create(&wanted)
                        .await
                        .map(|app| (app, ReconcileAction::Created))
                }
                Some(current) if equals(&current, &wanted) => {
                    tracing::info!(app = %key, revision = current.revision, "app unchanged");
                    Ok((current, ReconcileAction::Unchanged))
                }
                Some(current) => {
                    tracing::info!(
                        app = %key,
                        from = %current.spec.version,
                        to = %desired.version,
                        "updating app"
                    );
                    let mut next = wanted.clone();
                    next.revision = current.revision;
                    next.annotations = current.annotations.clone();
                    next.annotations.extend(wanted.annotations.clone());
                    self.store
                        .update(&next)
                        .await
                        .map(|app| (app, ReconcileAction::Updated))
                }
            };

            match result {
                Ok((app, action)) => {
                    let baseline = Baseline::of(&app);
                    return Ok(Reconciled {
                        app,
                        action,
                        baseline,
                    });
                }
                Err(err) if err.is_conflict() => {
                    tracing::debug!(app = %key, error = %err, "write conflict, re-reading");
                    last_conflict = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(last_conflict
            .map(EngineError::from)
            .unwrap_or_else(|| {
                EngineError::from(StoreError::Conflict {
                    key: key.to_string(),
                    message: "conflict retries exhausted".into(),
                })
            }))
    }
}
