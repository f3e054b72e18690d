use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::stream::BoxStream;

use appcheck_core::models::app::{AppKey, AppResource};

use crate::error::StoreError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Change notifications for one watch subscription. Ends when the
/// subscription's timeout elapses or the server closes it.
pub type WatchStream = BoxStream<'static, Result<WatchEvent, StoreError>>;

/// Label changes to apply. `None` removes the label.
pub type LabelPatch = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(AppResource),
    Modified(AppResource),
    Deleted(AppResource),
    /// Progress marker with no object change.
    Bookmark { revision: u64 },
}

impl WatchEvent {
    pub fn revision(&self) -> u64 {
        match self {
            Self::Added(app) | Self::Modified(app) | Self::Deleted(app) => app.revision,
            Self::Bookmark { revision } => *revision,
        }
    }

    pub fn app(&self) -> Option<&AppResource> {
        match self {
            Self::Added(app) | Self::Modified(app) | Self::Deleted(app) => Some(app),
            Self::Bookmark { .. } => None,
        }
    }
}

/// Filter and cursor for a watch subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Only notify for the App with this name.
    pub name: Option<String>,
    /// Label selector, e.g. `!retry_reconciliation`.
    pub label_selector: Option<String>,
    /// Only notify for changes after this revision.
    pub since_revision: Option<u64>,
    /// Close the subscription after this long.
    pub timeout: Option<Duration>,
}

impl WatchOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn since(mut self, revision: u64) -> Self {
        self.since_revision = Some(revision);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }
}

/// Access to App resources.
///
/// Methods return boxed futures for dyn compatibility.
pub trait AppStore: Send + Sync {
    /// Fetch one App. `Ok(None)` if it doesn't exist.
    fn get(&self, key: &AppKey) -> BoxFuture<'_, Result<Option<AppResource>, StoreError>>;

    /// Create an App. Returns the stored object with its revision.
    fn create(&self, app: &AppResource) -> BoxFuture<'_, Result<AppResource, StoreError>>;

    /// Replace an App's metadata and spec. A non-zero `app.revision` is the
    /// concurrency token: the write fails with `Conflict` if the stored
    /// revision differs.
    fn update(&self, app: &AppResource) -> BoxFuture<'_, Result<AppResource, StoreError>>;

    /// Add, change, or remove labels on an App.
    fn patch_labels(
        &self,
        key: &AppKey,
        patch: &LabelPatch,
    ) -> BoxFuture<'_, Result<AppResource, StoreError>>;

    /// All Apps in a namespace.
    fn list(&self, namespace: &str) -> BoxFuture<'_, Result<Vec<AppResource>, StoreError>>;

    /// Subscribe to changes of Apps in a namespace.
    fn watch(
        &self,
        namespace: &str,
        options: &WatchOptions,
    ) -> BoxFuture<'_, Result<WatchStream, StoreError>>;
}
