//! Ordering, convergence and notification behavior of the running engine.

use std::time::Duration;

use topology_sync::model::{doc_str, Action};

use crate::common::{link, node, node_key, Engine};

/// Updates for one key land in arrival order even with spare workers.
#[tokio::test]
async fn test_same_key_updates_apply_in_order() {
    let engine = Engine::start();

    let records = (0..20)
        .map(|i| {
            let mut payload = node("update", 2, "r1");
            payload["name"] = format!("rev-{}", i).into();
            ("ls_node", payload)
        })
        .collect();
    let report = engine.apply(records).await;
    assert_eq!(report.decoded, 20);

    let source = engine.doc("ls_node", &node_key(2, "r1")).await.unwrap();
    assert_eq!(doc_str(&source, "name"), Some("rev-19"));
    let vertex = engine.doc("igp_node", &node_key(2, "r1")).await.unwrap();
    assert_eq!(doc_str(&vertex, "name"), Some("rev-19"));

    let stats = engine.stats();
    assert_eq!(stats.applied, 20);
    assert_eq!(stats.dropped, 0);
    engine.shutdown().await;
}

/// Replaying the same add leaves a single document per collection.
#[tokio::test]
async fn test_duplicate_add_converges() {
    let engine = Engine::start();

    engine
        .apply(vec![("ls_node", node("add", 2, "r1"))])
        .await;
    engine
        .apply(vec![("ls_node", node("add", 2, "r1"))])
        .await;

    assert_eq!(engine.keys("ls_node").await, vec![node_key(2, "r1")]);
    assert_eq!(engine.keys("igp_node").await, vec![node_key(2, "r1")]);

    let notifications = engine.notifications(2).await;
    let actions: Vec<Action> = notifications.iter().map(|n| n.action).collect();
    assert!(actions.contains(&Action::Add));
    assert!(actions.contains(&Action::Update));
    engine.shutdown().await;
}

/// A link that arrives before its routers is parked and retried by the sweep.
#[tokio::test]
async fn test_early_link_resolves_after_nodes_arrive() {
    let engine = Engine::start();

    engine
        .ingest(vec![("ls_link", link("add", 2, "r1", "r2"))])
        .await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.stats().requeued == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("link was not parked");
    assert!(engine.keys("igpv4_graph").await.is_empty());

    engine
        .apply(vec![
            ("ls_node", node("add", 2, "r1")),
            ("ls_node", node("add", 2, "r2")),
        ])
        .await;

    let edges = engine.store.documents("igpv4_graph").await;
    assert_eq!(edges.len(), 1);
    assert_eq!(
        doc_str(&edges[0], "_from"),
        Some(format!("igp_node/{}", node_key(2, "r1")).as_str())
    );
    assert_eq!(
        doc_str(&edges[0], "_to"),
        Some(format!("igp_node/{}", node_key(2, "r2")).as_str())
    );
    engine.shutdown().await;
}

/// Every applied update is announced once it is visible in the store.
#[tokio::test]
async fn test_notifications_carry_document_identity() {
    let engine = Engine::start();

    engine
        .apply(vec![("ls_node", node("add", 2, "r1"))])
        .await;
    let notifications = engine.notifications(1).await;
    assert_eq!(notifications[0].key, node_key(2, "r1"));
    assert_eq!(notifications[0].id, format!("ls_node/{}", node_key(2, "r1")));
    assert_eq!(notifications[0].action, Action::Add);

    engine
        .apply(vec![("ls_node", node("del", 2, "r1"))])
        .await;
    let notifications = engine.notifications(2).await;
    assert!(notifications
        .iter()
        .any(|n| n.action == Action::Del && n.key == node_key(2, "r1")));
    assert!(engine.doc("igp_node", &node_key(2, "r1")).await.is_none());
    engine.shutdown().await;
}

/// Undecodable input is dropped at the boundary and never reaches the store.
#[tokio::test]
async fn test_malformed_records_are_dropped() {
    let engine = Engine::start();

    let mut bad_action = node("replace", 2, "r1");
    bad_action["name"] = "ignored".into();
    let missing_field = serde_json::json!({ "action": "add", "igp_router_id": "r2" });

    let report = engine
        .apply(vec![
            ("ls_node", bad_action),
            ("ls_node", missing_field),
            ("ls_node", node("add", 2, "r3")),
        ])
        .await;

    assert_eq!(report.received, 3);
    assert_eq!(report.dropped, 2);
    assert_eq!(engine.keys("ls_node").await, vec![node_key(2, "r3")]);
    engine.shutdown().await;
}
