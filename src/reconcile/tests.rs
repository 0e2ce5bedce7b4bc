use serde_json::{json, Value};

use super::*;
use crate::storage::MemoryGraphStore;

fn edge(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("edge must be an object"),
    }
}

fn marked(key: &str) -> Document {
    edge(json!({
        "_key": key,
        "_from": "igp_node/a",
        "_to": "igp_node/b",
        "protocol_id": 2
    }))
}

fn unmarked(key: &str) -> Document {
    edge(json!({
        "_key": key,
        "_from": "bgp_node/a",
        "_to": "bgp_node/b",
        "protocol": "BGP_ebgp_public"
    }))
}

fn fixture() -> (Arc<MemoryGraphStore>, Reconciler) {
    let collections = Collections::default();
    let store = Arc::new(MemoryGraphStore::with_collections(collections.all()));
    let reconciler = Reconciler::new(store.clone(), &collections, &ReconcileConfig::default());
    (store, reconciler)
}

async fn keys(store: &MemoryGraphStore, collection: &str) -> Vec<String> {
    store
        .documents(collection)
        .await
        .iter()
        .filter_map(|d| doc_key(d).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_copies_missing_and_preserves_unmarked() {
    let (store, reconciler) = fixture();
    for key in ["A", "B", "C"] {
        store.create_document("igpv4_graph", marked(key)).await.unwrap();
    }
    for key in ["A", "B"] {
        store.create_document("ipv4_graph", marked(key)).await.unwrap();
    }
    store.create_document("ipv4_graph", unmarked("D")).await.unwrap();

    let report = reconciler.run_once().await.unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 0);
    assert_eq!(keys(&store, "ipv4_graph").await, vec!["A", "B", "C", "D"]);
}

#[tokio::test]
async fn test_removes_stale_marked_edges() {
    let (store, reconciler) = fixture();
    store.create_document("igpv6_graph", marked("A")).await.unwrap();
    store.create_document("ipv6_graph", marked("A")).await.unwrap();
    store.create_document("ipv6_graph", marked("stale")).await.unwrap();

    let report = reconciler.run_once().await.unwrap();

    assert_eq!(report.removed, 1);
    assert_eq!(keys(&store, "ipv6_graph").await, vec!["A"]);
}

#[tokio::test]
async fn test_copied_edge_gets_derived_identity() {
    let (store, reconciler) = fixture();
    store.create_document("igpv4_graph", marked("C")).await.unwrap();

    reconciler.run_once().await.unwrap();

    let copied = store.read_document("ipv4_graph", "C").await.unwrap().unwrap();
    assert_eq!(copied.get("_id"), Some(&json!("ipv4_graph/C")));
    assert_eq!(copied.get("_from"), Some(&json!("igp_node/a")));
    assert_eq!(copied.get("protocol_id"), Some(&json!(2)));
}

#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    let (store, reconciler) = fixture();
    store.create_document("igpv4_graph", marked("A")).await.unwrap();

    let first = reconciler.run_once().await.unwrap();
    let second = reconciler.run_once().await.unwrap();

    assert_eq!(first.added, 1);
    assert_eq!((second.added, second.updated, second.removed), (0, 0, 0));
    assert!(second.finished_at >= second.started_at);
}

#[tokio::test]
async fn test_changed_source_edge_overwrites_copy() {
    let (store, reconciler) = fixture();
    let mut source = marked("A");
    source.insert("igp_metric".to_string(), json!(10));
    store.create_document("igpv4_graph", source).await.unwrap();
    reconciler.run_once().await.unwrap();

    let mut patch = Document::new();
    patch.insert("igp_metric".to_string(), json!(99));
    store.update_document("igpv4_graph", "A", patch).await.unwrap();
    let report = reconciler.run_once().await.unwrap();

    assert_eq!((report.added, report.updated, report.removed), (0, 1, 0));
    let copy = store.read_document("ipv4_graph", "A").await.unwrap().unwrap();
    assert_eq!(copy.get("igp_metric"), Some(&json!(99)));
    assert_eq!(copy.get("_id"), Some(&json!("ipv4_graph/A")));

    let settled = reconciler.run_once().await.unwrap();
    assert_eq!(settled.updated, 0);
}

#[tokio::test]
async fn test_failed_pass_returns_to_idle() {
    let (store, reconciler) = fixture();
    store.set_fail_on_query(true).await;

    assert!(reconciler.run_once().await.is_err());
    assert_eq!(reconciler.state(), ReconcileState::Idle);

    store.set_fail_on_query(false).await;
    assert!(reconciler.run_once().await.is_ok());
}

#[tokio::test]
async fn test_background_loop_repairs_and_stops() {
    let collections = Collections::default();
    let store = Arc::new(MemoryGraphStore::with_collections(collections.all()));
    store.create_document("igpv4_graph", marked("A")).await.unwrap();

    let config = ReconcileConfig {
        interval_secs: 1,
        ..ReconcileConfig::default()
    };
    let reconciler = Reconciler::new(store.clone(), &collections, &config);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = reconciler.spawn(stop_rx);

    tokio::time::timeout(std::time::Duration::from_secs(3), async {
        while store.count("ipv4_graph").await == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    stop_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}
