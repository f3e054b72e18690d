use futures::StreamExt;
use kube::api::{
    Api, DynamicObject, ListParams, Patch, PatchParams, PostParams, WatchEvent as KubeWatchEvent,
    WatchParams,
};
use kube::core::{ApiResource, GroupVersionKind};
use kube::Client;
use serde_json::json;

use appcheck_core::keys;
use appcheck_core::models::app::{AppKey, AppResource, AppSpec, AppStatus};

use crate::error::StoreError;
use crate::store::{AppStore, BoxFuture, LabelPatch, WatchEvent, WatchOptions, WatchStream};

/// Watch requests longer than this are rejected by the API server.
const MAX_WATCH_TIMEOUT_SECS: u64 = 290;

/// App resources in a Kubernetes cluster, accessed as dynamic objects.
pub struct KubeAppStore {
    client: Client,
    resource: ApiResource,
}

impl KubeAppStore {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(keys::API_GROUP, keys::API_VERSION, keys::KIND);
        Self {
            client,
            resource: ApiResource::from_gvk_with_plural(&gvk, keys::PLURAL),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

impl AppStore for KubeAppStore {
    fn get(&self, key: &AppKey) -> BoxFuture<'_, Result<Option<AppResource>, StoreError>> {
        let key = key.clone();
        Box::pin(async move {
            let obj = self
                .api(&key.namespace)
                .get_opt(&key.name)
                .await
                .map_err(|e| map_kube_error(e, &key))?;
            obj.map(to_app).transpose()
        })
    }

    fn create(&self, app: &AppResource) -> BoxFuture<'_, Result<AppResource, StoreError>> {
        let app = app.clone();
        Box::pin(async move {
            let mut obj = to_dynamic(&app, &self.resource)?;
            obj.metadata.resource_version = None;

            let created = self
                .api(&app.namespace)
                .create(&PostParams::default(), &obj)
                .await
                .map_err(|e| map_kube_error(e, &app.key()))?;

            tracing::debug!(app = %app.key(), "app resource created");
            to_app(created)
        })
    }

    fn update(&self, app: &AppResource) -> BoxFuture<'_, Result<AppResource, StoreError>> {
        let app = app.clone();
        Box::pin(async move {
            let obj = to_dynamic(&app, &self.resource)?;

            let updated = self
                .api(&app.namespace)
                .replace(&app.name, &PostParams::default(), &obj)
                .await
                .map_err(|e| map_kube_error(e, &app.key()))?;

            tracing::debug!(app = %app.key(), "app resource updated");
            to_app(updated)
        })
    }

    fn patch_labels(
        &self,
        key: &AppKey,
        patch: &LabelPatch,
    ) -> BoxFuture<'_, Result<AppResource, StoreError>> {
        let key = key.clone();
        let body = json!({ "metadata": { "labels": patch } });
        Box::pin(async move {
            let patched = self
                .api(&key.namespace)
                .patch(&key.name, &PatchParams::default(), &Patch::Merge(&body))
                .await
                .map_err(|e| map_kube_error(e, &key))?;
            to_app(patched)
        })
    }

    fn list(&self, namespace: &str) -> BoxFuture<'_, Result<Vec<AppResource>, StoreError>> {
        let namespace = namespace.to_string();
        Box::pin(async move {
            let list = self
                .api(&namespace)
                .list(&ListParams::default())
                .await
                .map_err(|e| map_kube_error(e, &AppKey::new(&namespace, "*")))?;
            list.items.into_iter().map(to_app).collect()
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
            let mut params = WatchParams::default();
            if let Some(name) = &options.name {
                params = params.fields(&format!("metadata.name={name}"));
            }
            if let Some(selector) = &options.label_selector {
                params = params.labels(selector);
            }
            if let Some(timeout) = options.timeout {
                let secs = timeout.as_secs().clamp(1, MAX_WATCH_TIMEOUT_SECS);
                params = params.timeout(secs as u32);
            }
            let since = options
                .since_revision
                .map(|r| r.to_string())
                .unwrap_or_else(|| "0".to_string());

            let key = AppKey::new(&namespace, options.name.as_deref().unwrap_or("*"));
            let stream = self
                .api(&namespace)
                .watch(&params, &since)
                .await
                .map_err(|e| map_kube_error(e, &key))?;

            let mapped = stream.map(move |item| match item {
                Ok(KubeWatchEvent::Added(obj)) => to_app(obj).map(WatchEvent::Added),
                Ok(KubeWatchEvent::Modified(obj)) => to_app(obj).map(WatchEvent::Modified),
                Ok(KubeWatchEvent::Deleted(obj)) => to_app(obj).map(WatchEvent::Deleted),
                Ok(KubeWatchEvent::Bookmark(bookmark)) => Ok(WatchEvent::Bookmark {
                    revision: parse_revision(Some(&bookmark.metadata.resource_version))?,
                }),
                Ok(KubeWatchEvent::Error(resp)) if resp.code == 410 => {
                    Err(StoreError::Expired(resp.message))
                }
                Ok(KubeWatchEvent::Error(resp)) => Err(StoreError::Unavailable(format!(
                    "watch error {}: {}",
                    resp.code, resp.message
                ))),
                Err(e) => Err(map_kube_error(e, &key)),
            });

            Ok(mapped.boxed())
        })
    }
}

/// Convert a dynamic App object into the domain type.
pub fn to_app(obj: DynamicObject) -> Result<AppResource, StoreError> {
    let name = obj
        .metadata
        .name
        .ok_or_else(|| StoreError::Invalid("app object has no name".into()))?;
    let revision = parse_revision(obj.metadata.resource_version.as_deref())?;

    let spec: AppSpec = match obj.data.get("spec") {
        Some(spec) => serde_json::from_value(spec.clone())?,
        None => return Err(StoreError::Invalid(format!("app {name} has no spec"))),
    };
    let status: AppStatus = match obj.data.get("status") {
        Some(status) if !status.is_null() => serde_json::from_value(status.clone())?,
        _ => AppStatus::default(),
    };

    Ok(AppResource {
        name,
        namespace: obj.metadata.namespace.unwrap_or_default(),
        revision,
        labels: obj.metadata.labels.unwrap_or_default(),
        annotations: obj.metadata.annotations.unwrap_or_default(),
        spec,
        status,
    })
}

/// Render a domain App as a dynamic object. Status is never written; it is
/// owned by the operator.
pub fn to_dynamic(app: &AppResource, resource: &ApiResource) -> Result<DynamicObject, StoreError> {
    let mut obj = DynamicObject::new(&app.name, resource).within(&app.namespace);
    obj.metadata.labels = Some(app.labels.clone());
    obj.metadata.annotations = Some(app.annotations.clone());
    if app.revision > 0 {
        obj.metadata.resource_version = Some(app.revision.to_string());
    }
    obj.data = json!({ "spec": serde_json::to_value(&app.spec)? });
    Ok(obj)
}

fn parse_revision(raw: Option<&str>) -> Result<u64, StoreError> {
    match raw {
        None | Some("") => Ok(0),
        Some(v) => v
            .parse()
            .map_err(|_| StoreError::Invalid(format!("non-numeric resource version {v:?}"))),
    }
}

fn map_kube_error(err: kube::Error, key: &AppKey) -> StoreError {
    match err {
        kube::Error::Api(resp) => match resp.code {
            404 => StoreError::NotFound {
                key: key.to_string(),
            },
            409 if resp.reason == "AlreadyExists" => StoreError::AlreadyExists {
                key: key.to_string(),
            },
            409 => StoreError::Conflict {
                key: key.to_string(),
                message: resp.message,
            },
            410 => StoreError::Expired(resp.message),
            400 | 422 => StoreError::Invalid(resp.message),
            _ => StoreError::Unavailable(format!("{} ({})", resp.message, resp.code)),
        },
        other => StoreError::Unavailable(other.to_string()),
    }
}
