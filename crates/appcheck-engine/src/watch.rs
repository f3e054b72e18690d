//! Waiting for a release to reach a terminal state.
//!
//! Two strategies share one deadline and one status mapping. `Push` follows
//! a watch subscription on the App; `Poll` re-reads it on a fixed interval
//! and reports progress after every non-terminal read.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{Instant, sleep_until, timeout_at};

use appcheck_core::models::app::{AppKey, AppResource, ReleaseStatus};
use appcheck_store::{AppStore, StoreError, WatchEvent, WatchOptions};

use crate::error::format_err_chain;
use crate::reconcile::Baseline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    Push,
    Poll,
}

impl fmt::Display for WaitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Push => "push",
            Self::Poll => "poll",
        })
    }
}

impl FromStr for WaitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push" | "watch" => Ok(Self::Push),
            "poll" | "backoff" => Ok(Self::Poll),
            other => Err(format!("unknown wait strategy {other:?}, expected push or poll")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub strategy: WaitStrategy,
    /// Hard deadline for one wait.
    pub window: Duration,
    pub poll_interval: Duration,
    /// Times a closed push subscription is reopened before giving up.
    pub max_resubscribes: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            strategy: WaitStrategy::Push,
            window: Duration::from_secs(300),
            poll_interval: Duration::from_secs(10),
            max_resubscribes: 5,
        }
    }
}

/// Reading of one observed App.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Watching,
    Deployed,
    Failed { reason: String },
}

/// Map an observed App to an [`Observation`].
///
/// Under `Push`, `deployed` only counts once the release's last-deployed
/// time is newer than the baseline's. When the store does not expose that
/// timestamp, and always under `Poll`, the installed version must equal the
/// requested one instead.
pub fn classify(app: &AppResource, baseline: &Baseline, strategy: WaitStrategy) -> Observation {
    match app.release_status() {
        ReleaseStatus::Deployed => {
            let fresh = match (strategy, app.status.release.last_deployed) {
                (WaitStrategy::Push, Some(observed)) => {
                    baseline.last_deployed.is_none_or(|before| observed > before)
                }
                _ => app.status.version == app.spec.version,
            };
            if fresh {
                Observation::Deployed
            } else {
                Observation::Watching
            }
        }
        ReleaseStatus::Failed | ReleaseStatus::NotInstalled => Observation::Failed {
            reason: failure_reason(app),
        },
        ReleaseStatus::Pending | ReleaseStatus::Unknown => Observation::Watching,
    }
}

/// Whether an App is already settled, without reference to a baseline.
pub fn settled(app: &AppResource) -> Observation {
    classify(app, &Baseline::of(app), WaitStrategy::Poll)
}

fn failure_reason(app: &AppResource) -> String {
    let reason = app.status.release.reason.trim();
    if reason.is_empty() {
        format!("release status is {}", app.status.release.status)
    } else {
        reason.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Deployed,
    Failed { reason: String },
    TimedOut,
    /// The subscription kept closing. Not evidence of a failed release.
    Aborted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    pub outcome: WaitOutcome,
    /// Highest revision observed while waiting.
    pub revision: u64,
}

impl WaitResult {
    fn new(outcome: WaitOutcome, revision: u64) -> Self {
        Self { outcome, revision }
    }
}

pub struct StatusWatcher {
    store: Arc<dyn AppStore>,
    config: WatchConfig,
}

impl StatusWatcher {
    pub fn new(store: Arc<dyn AppStore>, config: WatchConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Wait for the App at `key` to settle, starting after `baseline`.
    ///
    /// `on_pending` runs after each non-terminal read in the poll strategy.
    /// Everything, `on_pending` included, stops at the deadline.
    pub async fn wait<P, Fut>(
        &self,
        key: &AppKey,
        baseline: &Baseline,
        on_pending: P,
    ) -> WaitResult
    where
        P: FnMut(AppResource) -> Fut,
        Fut: Future<Output = ()>,
    {
        let deadline = Instant::now() + self.config.window;
        tracing::debug!(
            app = %key,
            strategy = %self.config.strategy,
            revision = baseline.revision,
            window_secs = self.config.window.as_secs(),
            "waiting for release"
        );

        match self.config.strategy {
            WaitStrategy::Push => self.push(key, baseline, deadline).await,
            WaitStrategy::Poll => self.poll(key, baseline, deadline, on_pending).await,
        }
    }

    async fn push(&self, key: &AppKey, baseline: &Baseline, deadline: Instant) -> WaitResult {
        let mut cursor = baseline.revision;
        let mut resubscribes = 0;

        loop {
            if Instant::now() >= deadline {
                return WaitResult::new(WaitOutcome::TimedOut, cursor);
            }

            let options = WatchOptions::named(&key.name)
                .since(cursor)
                .timeout(deadline.saturating_duration_since(Instant::now()));

            let opened = self.store.watch(&key.namespace, &options);
            let opened = match timeout_at(deadline, opened).await {
                Err(_) => return WaitResult::new(WaitOutcome::TimedOut, cursor),
                Ok(opened) => opened,
            };

            match opened {
                Ok(mut stream) => loop {
                    let next = match timeout_at(deadline, stream.next()).await {
                        Err(_) => return WaitResult::new(WaitOutcome::TimedOut, cursor),
                        Ok(next) => next,
                    };

                    match next {
                        None => break,
                        Some(Ok(WatchEvent::Bookmark { revision })) => {
                            cursor = cursor.max(revision);
                        }
                        Some(Ok(WatchEvent::Deleted(app))) => {
                            return WaitResult::new(
                                WaitOutcome::Failed {
                                    reason: format!("app {} was deleted", app.name),
                                },
                                app.revision,
                            );
                        }
                        Some(Ok(WatchEvent::Added(app) | WatchEvent::Modified(app))) => {
                            if app.revision <= baseline.revision {
                                continue;
                            }
                            cursor = cursor.max(app.revision);
                            let observation = classify(&app, baseline, WaitStrategy::Push);
                            if let Some(outcome) = terminal(observation) {
                                return WaitResult::new(outcome, cursor);
                            }
                        }
                        Some(Err(StoreError::Expired(_))) => {
                            // Our cursor is gone; read the current object and
                            // continue from its revision.
                            let reread = match timeout_at(deadline, self.store.get(key)).await {
                                Err(_) => return WaitResult::new(WaitOutcome::TimedOut, cursor),
                                Ok(reread) => reread,
                            };
                            match reread {
                                Ok(Some(app)) => {
                                    if app.revision > baseline.revision {
                                        cursor = cursor.max(app.revision);
                                        if let Some(outcome) =
                                            terminal(classify(&app, baseline, WaitStrategy::Push))
                                        {
                                            return WaitResult::new(outcome, cursor);
                                        }
                                    }
                                }
                                Ok(None) => {
                                    return WaitResult::new(
                                        WaitOutcome::Failed {
                                            reason: format!("app {} was deleted", key.name),
                                        },
                                        cursor,
                                    );
                                }
                                Err(err) => {
                                    tracing::warn!(
                                        app = %key,
                                        error = %format_err_chain(&err),
                                        "re-read after expired cursor failed"
                                    );
                                }
                            }
                            break;
                        }
                        Some(Err(err)) => {
                            tracing::warn!(
                                app = %key,
                                error = %format_err_chain(&err),
                                "watch stream error"
                            );
                            break;
                        }
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        app = %key,
                        error = %format_err_chain(&err),
                        "opening watch failed"
                    );
                    let retry_at = (Instant::now() + self.config.poll_interval).min(deadline);
                    sleep_until(retry_at).await;
                }
            }

            if Instant::now() >= deadline {
                return WaitResult::new(WaitOutcome::TimedOut, cursor);
            }

            resubscribes += 1;
            if resubscribes > self.config.max_resubscribes {
                tracing::warn!(app = %key, resubscribes, "watch kept closing, giving up");
                return WaitResult::new(
                    WaitOutcome::Aborted {
                        reason: format!(
                            "watch closed {resubscribes} times before the release settled"
                        ),
                    },
                    cursor,
                );
            }
            tracing::info!(app = %key, revision = cursor, "watch closed early, re-subscribing");
        }
    }

    async fn poll<P, Fut>(
        &self,
        key: &AppKey,
        baseline: &Baseline,
        deadline: Instant,
        mut on_pending: P,
    ) -> WaitResult
    where
        P: FnMut(AppResource) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut cursor = baseline.revision;

        loop {
            match timeout_at(deadline, self.store.get(key)).await {
                Err(_) => return WaitResult::new(WaitOutcome::TimedOut, cursor),
                Ok(Ok(Some(app))) => {
                    cursor = cursor.max(app.revision);
                    if let Some(outcome) = terminal(classify(&app, baseline, WaitStrategy::Poll)) {
                        return WaitResult::new(outcome, cursor);
                    }
                    tracing::debug!(
                        app = %key,
                        status = %app.status.release.status,
                        "release not settled"
                    );
                    if timeout_at(deadline, on_pending(app)).await.is_err() {
                        return WaitResult::new(WaitOutcome::TimedOut, cursor);
                    }
                }
                Ok(Ok(None)) => {
                    return WaitResult::new(
                        WaitOutcome::Failed {
                            reason: format!("app {} was deleted", key.name),
                        },
                        cursor,
                    );
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        app = %key,
                        error = %format_err_chain(&err),
                        "reading app failed"
                    );
                }
            }

            let next = Instant::now() + self.config.poll_interval;
            if next >= deadline {
                sleep_until(deadline).await;
                return WaitResult::new(WaitOutcome::TimedOut, cursor);
            }
            sleep_until(next).await;
        }
    }
}

fn terminal(observation: Observation) -> Option<WaitOutcome> {
    match observation {
        Observation::Watching => None,
        Observation::Deployed => Some(WaitOutcome::Deployed),
        Observation::Failed { reason } => Some(WaitOutcome::Failed { reason }),
    }
}
