use std::time::Duration;

use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::bus::MockNotificationSink;
use crate::model::Document;
use crate::storage::MemoryGraphStore;

fn fast_config(max_polls: usize) -> NotifierConfig {
    NotifierConfig {
        enabled: true,
        poll_interval_ms: 5,
        max_polls,
    }
}

fn doc(key: &str) -> Document {
    match json!({ "_key": key }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn applied(key: &str, action: Action) -> Applied {
    Applied {
        key: key.to_string(),
        action,
        collection: "ls_node".to_string(),
    }
}

struct Fixture {
    store: Arc<MemoryGraphStore>,
    sink: Arc<MockNotificationSink>,
    stop_tx: watch::Sender<bool>,
    notifier: CompletionNotifier,
}

fn fixture(max_polls: usize) -> Fixture {
    let store = Arc::new(MemoryGraphStore::with_collections(["ls_node"]));
    let sink = Arc::new(MockNotificationSink::new());
    let (stop_tx, stop_rx) = watch::channel(false);
    let notifier = CompletionNotifier::new(
        store.clone(),
        sink.clone(),
        &fast_config(max_polls),
        stop_rx,
    );
    Fixture {
        store,
        sink,
        stop_tx,
        notifier,
    }
}

#[tokio::test]
async fn test_publishes_once_document_is_readable() {
    let f = fixture(3);
    f.store.create_document("ls_node", doc("n1")).await.unwrap();

    assert_ok!(f.notifier.deliver(&applied("n1", Action::Add)).await);

    let published = f.sink.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key, "n1");
    assert_eq!(published[0].id, "ls_node/n1");
    assert_eq!(published[0].action, Action::Add);
}

#[tokio::test]
async fn test_removal_waits_for_absence() {
    let f = fixture(3);

    assert_ok!(f.notifier.deliver(&applied("gone", Action::Del)).await);
    assert_eq!(f.sink.published_count().await, 1);

    f.store.create_document("ls_node", doc("still")).await.unwrap();
    let err = assert_err!(f.notifier.deliver(&applied("still", Action::Del)).await);
    assert!(matches!(err, NotifyError::NotVisible(_)));
    assert_eq!(f.sink.published_count().await, 1);
}

#[tokio::test]
async fn test_gives_up_after_bounded_polls() {
    let f = fixture(2);
    let err = assert_err!(f.notifier.confirm("ls_node", "never", Action::Update).await);
    assert!(matches!(err, NotifyError::NotVisible(id) if id == "ls_node/never"));
}

#[tokio::test]
async fn test_background_notification_sees_late_write() {
    let f = fixture(50);
    let handle = f.notifier.notify(&applied("late", Action::Add));

    tokio::time::sleep(Duration::from_millis(20)).await;
    f.store.create_document("ls_node", doc("late")).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(f.sink.published_count().await, 1);
}

#[tokio::test]
async fn test_stop_abandons_pending_notifications() {
    let f = fixture(1000);
    let handle = f.notifier.notify(&applied("pending", Action::Add));

    f.stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(f.sink.published_count().await, 0);
}

#[tokio::test]
async fn test_sink_failure_is_reported() {
    let f = fixture(3);
    f.store.create_document("ls_node", doc("n1")).await.unwrap();
    f.sink.set_fail_on_publish(true).await;

    let err = assert_err!(f.notifier.deliver(&applied("n1", Action::Update)).await);
    assert!(matches!(err, NotifyError::Publish(_)));
}

#[tokio::test]
async fn test_store_outage_is_polled_through() {
    let f = fixture(50);
    f.store.create_document("ls_node", doc("n1")).await.unwrap();
    f.store.set_fail_on_query(true).await;

    let store = f.store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.set_fail_on_query(false).await;
    });

    assert_ok!(f.notifier.deliver(&applied("n1", Action::Add)).await);
    assert_eq!(f.sink.published_count().await, 1);
}
