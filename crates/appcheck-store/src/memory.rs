//! In-memory App store.
//!
//! Keeps every App in a map behind a mutex and a global revision counter
//! that is bumped on each write, so revisions behave like the cluster's
//! resource versions. Writes are recorded in a history log for watch replay
//! and fanned out to live watchers over a broadcast channel.

use std::collections::BTreeMap;
use std::sync::Mutex;

use futures::{StreamExt, stream};
use tokio::sync::broadcast;

use appcheck_core::models::app::{AppKey, AppResource, AppStatus};

use crate::error::StoreError;
use crate::selector::LabelSelector;
use crate::store::{AppStore, BoxFuture, LabelPatch, WatchEvent, WatchOptions, WatchStream};

const CHANNEL_CAPACITY: usize = 1024;

/// Number of calls made through the [`AppStore`] trait, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub get: usize,
    pub create: usize,
    pub update: usize,
    pub patch_labels: usize,
    pub list: usize,
    pub watch: usize,
}

impl StoreCalls {
    pub fn total(&self) -> usize {
        self.get + self.create + self.update + self.patch_labels + self.list + self.watch
    }

    pub fn writes(&self) -> usize {
        self.create + self.update + self.patch_labels
    }
}

struct Inner {
    apps: BTreeMap<AppKey, AppResource>,
    revision: u64,
    history: Vec<WatchEvent>,
    /// Watches starting before this revision fail with `Expired`.
    compacted: u64,
    events: broadcast::Sender<WatchEvent>,
    fail_next: usize,
    calls: StoreCalls,
}

impl Inner {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn publish(&mut self, event: WatchEvent) {
        self.history.push(event.clone());
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn take_failure(&mut self) -> Result<(), StoreError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

pub struct MemoryAppStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryAppStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAppStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                apps: BTreeMap::new(),
                revision: 0,
                history: Vec::new(),
                compacted: 0,
                events,
                fail_next: 0,
                calls: StoreCalls::default(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert an App directly, bypassing call counters and fault injection.
    pub fn seed(&self, mut app: AppResource) -> AppResource {
        let mut inner = self.lock();
        app.revision = inner.next_revision();
        inner.apps.insert(app.key(), app.clone());
        inner.publish(WatchEvent::Added(app.clone()));
        app
    }

    /// Current revision counter.
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Replace an App's status the way the operator would.
    pub fn set_status(&self, key: &AppKey, status: AppStatus) -> Result<AppResource, StoreError> {
        let mut inner = self.lock();
        let revision = inner.next_revision();
        let app = inner
            .apps
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })?;
        app.status = status;
        app.revision = revision;
        let app = app.clone();
        inner.publish(WatchEvent::Modified(app.clone()));
        Ok(app)
    }

    pub fn delete(&self, key: &AppKey) -> Result<AppResource, StoreError> {
        let mut inner = self.lock();
        let mut app = inner.apps.remove(key).ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })?;
        app.revision = inner.next_revision();
        inner.publish(WatchEvent::Deleted(app.clone()));
        Ok(app)
    }

    /// Close every open watch stream.
    pub fn disconnect_watchers(&self) {
        let mut inner = self.lock();
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        inner.events = events;
    }

    /// Forget history up to the current revision. Later watches starting
    /// from an older revision fail with `Expired`.
    pub fn compact(&self) {
        let mut inner = self.lock();
        inner.compacted = inner.revision;
        inner.history.clear();
    }

    /// Fail the next `n` trait calls with `Unavailable`.
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    pub fn calls(&self) -> StoreCalls {
        self.lock().calls
    }

    pub fn snapshot(&self, key: &AppKey) -> Option<AppResource> {
        self.lock().apps.get(key).cloned()
    }
}

impl AppStore for MemoryAppStore {
    fn get(&self, key: &AppKey) -> BoxFuture<'_, Result<Option<AppResource>, StoreError>> {
        let key = key.clone();
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.get += 1;
            inner.take_failure()?;
            Ok(inner.apps.get(&key).cloned())
        })
    }

    fn create(&self, app: &AppResource) -> BoxFuture<'_, Result<AppResource, StoreError>> {
        let mut app = app.clone();
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.create += 1;
            inner.take_failure()?;

            let key = app.key();
            if inner.apps.contains_key(&key) {
                return Err(StoreError::AlreadyExists {
                    key: key.to_string(),
                });
            }

            app.revision = inner.next_revision();
            app.status = AppStatus::default();
            inner.apps.insert(key, app.clone());
            inner.publish(WatchEvent::Added(app.clone()));
            Ok(app)
        })
    }

    fn update(&self, app: &AppResource) -> BoxFuture<'_, Result<AppResource, StoreError>> {
        let app = app.clone();
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.update += 1;
            inner.take_failure()?;

            let key = app.key();
            let stored_revision = match inner.apps.get(&key) {
                Some(stored) => stored.revision,
                None => {
                    return Err(StoreError::NotFound {
                        key: key.to_string(),
                    });
                }
            };
            if app.revision != 0 && app.revision != stored_revision {
                return Err(StoreError::Conflict {
                    key: key.to_string(),
                    message: format!(
                        "stored revision is {stored_revision}, write carried {}",
                        app.revision
                    ),
                });
            }

            let revision = inner.next_revision();
            let updated = match inner.apps.get_mut(&key) {
                Some(stored) => {
                    stored.labels = app.labels;
                    stored.annotations = app.annotations;
                    stored.spec = app.spec;
                    stored.revision = revision;
                    stored.clone()
                }
                None => {
                    return Err(StoreError::NotFound {
                        key: key.to_string(),
                    });
                }
            };
            inner.publish(WatchEvent::Modified(updated.clone()));
            Ok(updated)
        })
    }

    fn patch_labels(
        &self,
        key: &AppKey,
        patch: &LabelPatch,
    ) -> BoxFuture<'_, Result<AppResource, StoreError>> {
        let key = key.clone();
        let patch = patch.clone();
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.patch_labels += 1;
            inner.take_failure()?;

            let revision = inner.next_revision();
            let app = inner
                .apps
                .get_mut(&key)
                .ok_or_else(|| StoreError::NotFound {
                    key: key.to_string(),
                })?;
            for (label, value) in patch {
                match value {
                    Some(value) => {
                        app.labels.insert(label, value);
                    }
                    None => {
                        app.labels.remove(&label);
                    }
                }
            }
            app.revision = revision;
            let app = app.clone();
            inner.publish(WatchEvent::Modified(app.clone()));
            Ok(app)
        })
    }

    fn list(&self, namespace: &str) -> BoxFuture<'_, Result<Vec<AppResource>, StoreError>> {
        let namespace = namespace.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.list += 1;
            inner.take_failure()?;
            Ok(inner
                .apps
                .values()
                .filter(|app| app.namespace == namespace)
                .cloned()
                .collect())
        })
    }

    fn watch(
        &self,
        namespace: &str,
        options: &WatchOptions,
    ) -> BoxFuture<'_, Result<WatchStream, StoreError>> {
        let namespace = namespace.to_string();
        let options = options.clone();
        Box::pin(async move {
            let selector = match &options.label_selector {
                Some(raw) => LabelSelector::parse(raw)?,
                None => LabelSelector::default(),
            };
            let filter = WatchFilter {
                namespace,
                name: options.name.clone(),
                selector,
            };

            let (replay, receiver) = {
                let mut inner = self.lock();
                inner.calls.watch += 1;
                inner.take_failure()?;

                let replay: Vec<WatchEvent> = match options.since_revision {
                    Some(since) if since < inner.compacted => {
                        return Err(StoreError::Expired(format!(
                            "revision {since} is older than {}",
                            inner.compacted
                        )));
                    }
                    Some(since) => inner
                        .history
                        .iter()
                        .filter(|e| e.revision() > since)
                        .cloned()
                        .collect(),
                    // No cursor: start with the current state.
                    None => inner.apps.values().cloned().map(WatchEvent::Added).collect(),
                };
                (replay, inner.events.subscribe())
            };

            let live = stream::unfold(receiver, |mut rx| async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => return Some((event, rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "memory watcher lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            });

            let events = stream::iter(replay)
                .chain(live)
                .filter(move |event| futures::future::ready(filter.matches(event)))
                .map(Ok);

            let stream = match options.timeout {
                Some(timeout) => events.take_until(tokio::time::sleep(timeout)).boxed(),
                None => events.boxed(),
            };
            Ok(stream)
        })
    }
}

struct WatchFilter {
    namespace: String,
    name: Option<String>,
    selector: LabelSelector,
}

impl WatchFilter {
    fn matches(&self, event: &WatchEvent) -> bool {
        let Some(app) = event.app() else {
            return true;
        };
        app.namespace == self.namespace
            && self.name.as_ref().is_none_or(|n| *n == app.name)
            && self.selector.matches(&app.labels)
    }
}
