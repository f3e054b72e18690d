use std::collections::BTreeMap;
use std::time::Duration;

use futures::StreamExt;

use appcheck_core::models::app::{AppKey, AppResource, AppSpec, AppStatus, KubeConfig, ReleaseInfo};
use appcheck_store::{AppStore, LabelPatch, MemoryAppStore, StoreError, WatchEvent, WatchOptions};

fn app(name: &str, version: &str) -> AppResource {
    AppResource {
        name: name.into(),
        namespace: "giantswarm".into(),
        revision: 0,
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        spec: AppSpec {
            name: "myapp".into(),
            namespace: "giantswarm".into(),
            catalog: "control-plane-catalog".into(),
            version: version.into(),
            kube_config: KubeConfig { in_cluster: true },
        },
        status: AppStatus::default(),
    }
}

fn deployed(version: &str) -> AppStatus {
    AppStatus {
        release: ReleaseInfo {
            status: "deployed".into(),
            reason: String::new(),
            last_deployed: None,
        },
        version: version.into(),
    }
}

#[tokio::test]
async fn create_assigns_increasing_revisions() {
    let store = MemoryAppStore::new();

    let first = store.create(&app("a", "1.0.0")).await.unwrap();
    let second = store.create(&app("b", "1.0.0")).await.unwrap();

    assert!(first.revision > 0);
    assert!(second.revision > first.revision);
    assert_eq!(store.calls().create, 2);
}

#[tokio::test]
async fn create_rejects_existing_app() {
    let store = MemoryAppStore::new();
    store.create(&app("a", "1.0.0")).await.unwrap();

    let err = store.create(&app("a", "2.0.0")).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
    assert!(err.is_conflict());
}

#[tokio::test]
async fn update_with_stale_revision_conflicts() {
    let store = MemoryAppStore::new();
    let created = store.create(&app("a", "1.0.0")).await.unwrap();
    store
        .set_status(&created.key(), deployed("1.0.0"))
        .unwrap();

    let mut stale = created.clone();
    stale.spec.version = "2.0.0".into();
    let err = store.update(&stale).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));

    let current = store.get(&created.key()).await.unwrap().unwrap();
    let mut fresh = current.clone();
    fresh.spec.version = "2.0.0".into();
    let updated = store.update(&fresh).await.unwrap();
    assert_eq!(updated.spec.version, "2.0.0");
    assert!(updated.revision > current.revision);
}

#[tokio::test]
async fn update_preserves_status() {
    let store = MemoryAppStore::new();
    let created = store.create(&app("a", "1.0.0")).await.unwrap();
    let with_status = store
        .set_status(&created.key(), deployed("1.0.0"))
        .unwrap();

    let mut next = with_status.clone();
    next.status = AppStatus::default();
    next.spec.version = "1.1.0".into();
    let updated = store.update(&next).await.unwrap();

    assert_eq!(updated.status, deployed("1.0.0"));
}

#[tokio::test]
async fn update_of_missing_app_is_not_found() {
    let store = MemoryAppStore::new();
    let err = store.update(&app("ghost", "1.0.0")).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn patch_labels_adds_and_removes() {
    let store = MemoryAppStore::new();
    let mut seeded = app("a", "1.0.0");
    seeded.labels.insert("retry_reconciliation".into(), "1".into());
    let seeded = store.seed(seeded);

    let mut patch = LabelPatch::new();
    patch.insert("retry_reconciliation".into(), None);
    patch.insert("team".into(), Some("honeybadger".into()));
    let patched = store.patch_labels(&seeded.key(), &patch).await.unwrap();

    assert!(!patched.labels.contains_key("retry_reconciliation"));
    assert_eq!(patched.labels.get("team").map(String::as_str), Some("honeybadger"));
    assert!(patched.revision > seeded.revision);
}

#[tokio::test]
async fn list_is_scoped_to_namespace() {
    let store = MemoryAppStore::new();
    store.seed(app("a", "1.0.0"));
    let mut other = app("b", "1.0.0");
    other.namespace = "default".into();
    store.seed(other);

    let listed = store.list("giantswarm").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "a");
}

#[tokio::test]
async fn injected_failures_are_transient() {
    let store = MemoryAppStore::new();
    store.fail_next(1);

    let err = store.get(&AppKey::new("giantswarm", "a")).await.unwrap_err();
    assert!(err.is_transient());
    assert!(store.get(&AppKey::new("giantswarm", "a")).await.is_ok());
}

#[tokio::test]
async fn watch_replays_changes_after_revision() {
    let store = MemoryAppStore::new();
    let created = store.seed(app("a", "1.0.0"));
    let modified = store.set_status(&created.key(), deployed("1.0.0")).unwrap();

    let mut stream = store
        .watch("giantswarm", &WatchOptions::named("a").since(created.revision))
        .await
        .unwrap();

    let event = stream.next().await.unwrap().unwrap();
    assert_eq!(event, WatchEvent::Modified(modified));
}

#[tokio::test]
async fn watch_without_cursor_starts_from_current_state() {
    let store = MemoryAppStore::new();
    store.seed(app("a", "1.0.0"));
    store.seed(app("b", "1.0.0"));

    let mut stream = store
        .watch("giantswarm", &WatchOptions::default())
        .await
        .unwrap();

    let names: Vec<String> = vec![
        stream.next().await.unwrap().unwrap(),
        stream.next().await.unwrap().unwrap(),
    ]
    .into_iter()
    .filter_map(|e| e.app().map(|a| a.name.clone()))
    .collect();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn watch_delivers_live_events_for_named_app_only() {
    let store = MemoryAppStore::new();
    let a = store.seed(app("a", "1.0.0"));
    let b = store.seed(app("b", "1.0.0"));

    let mut stream = store
        .watch("giantswarm", &WatchOptions::named("a").since(store.revision()))
        .await
        .unwrap();

    store.set_status(&b.key(), deployed("1.0.0")).unwrap();
    let changed = store.set_status(&a.key(), deployed("1.0.0")).unwrap();

    let event = stream.next().await.unwrap().unwrap();
    assert_eq!(event.app().map(|a| a.name.as_str()), Some("a"));
    assert_eq!(event.revision(), changed.revision);
}

#[tokio::test]
async fn watch_applies_label_selector() {
    let store = MemoryAppStore::new();
    let mut labelled = app("retrying", "1.0.0");
    labelled.labels.insert("retry_reconciliation".into(), "1".into());
    store.seed(labelled);
    store.seed(app("plain", "1.0.0"));

    let mut stream = store
        .watch(
            "giantswarm",
            &WatchOptions::default()
                .since(0)
                .labels("!retry_reconciliation"),
        )
        .await
        .unwrap();

    let event = stream.next().await.unwrap().unwrap();
    assert_eq!(event.app().map(|a| a.name.as_str()), Some("plain"));
}

#[tokio::test]
async fn watch_reports_deletion() {
    let store = MemoryAppStore::new();
    let a = store.seed(app("a", "1.0.0"));

    let mut stream = store
        .watch("giantswarm", &WatchOptions::named("a").since(a.revision))
        .await
        .unwrap();
    store.delete(&a.key()).unwrap();

    let event = stream.next().await.unwrap().unwrap();
    assert!(matches!(event, WatchEvent::Deleted(ref gone) if gone.name == "a"));
}

#[tokio::test(start_paused = true)]
async fn watch_ends_when_timeout_elapses() {
    let store = MemoryAppStore::new();
    store.seed(app("a", "1.0.0"));

    let mut stream = store
        .watch(
            "giantswarm",
            &WatchOptions::named("a")
                .since(store.revision())
                .timeout(Duration::from_secs(30)),
        )
        .await
        .unwrap();

    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn disconnect_closes_open_watches() {
    let store = MemoryAppStore::new();
    store.seed(app("a", "1.0.0"));

    let mut stream = store
        .watch("giantswarm", &WatchOptions::named("a").since(store.revision()))
        .await
        .unwrap();
    store.disconnect_watchers();

    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn watch_from_compacted_revision_expires() {
    let store = MemoryAppStore::new();
    let a = store.seed(app("a", "1.0.0"));
    store.set_status(&a.key(), deployed("1.0.0")).unwrap();
    store.compact();

    let err = match store
        .watch("giantswarm", &WatchOptions::default().since(a.revision))
        .await
    {
        Ok(_) => panic!("expected an expired cursor"),
        Err(err) => err,
    };
    assert!(matches!(err, StoreError::Expired(_)));
}
