//! Derived topology produced by the running engine.

use serde_json::Value;

use topology_sync::config::ReconcileConfig;
use topology_sync::model::{doc_str, Action};
use topology_sync::reconcile::Reconciler;

use crate::common::{bgp_prefix, link, ls_prefix, node, node_key, peer, Engine};

#[tokio::test]
async fn test_dual_level_router_is_one_vertex() {
    let engine = Engine::start();

    engine
        .apply(vec![("ls_node", node("add", 1, "r1"))])
        .await;
    engine
        .apply(vec![("ls_node", node("add", 2, "r1"))])
        .await;

    // Both raw records are kept; only the derived vertex collapses.
    assert_eq!(
        engine.keys("ls_node").await,
        vec![node_key(1, "r1"), node_key(2, "r1")]
    );
    assert_eq!(engine.keys("igp_node").await, vec![node_key(2, "r1")]);
    let vertex = engine.doc("igp_node", &node_key(2, "r1")).await.unwrap();
    assert_eq!(doc_str(&vertex, "protocol"), Some("ISIS Level 1-2"));
    engine.shutdown().await;
}

#[tokio::test]
async fn test_loopback_folds_into_router() {
    let engine = Engine::start();

    engine
        .apply(vec![("ls_node", node("add", 2, "r1"))])
        .await;
    engine
        .apply(vec![
            ("ls_prefix", ls_prefix("add", 2, "r1", "10.0.0.1", 32)),
            ("ls_prefix", ls_prefix("add", 2, "r1", "10.9.0.0", 24)),
        ])
        .await;

    let vertex = engine.doc("igp_node", &node_key(2, "r1")).await.unwrap();
    let prefixes = vertex
        .get("prefixes")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    assert_eq!(prefixes, 1);
    // Only the transit prefix becomes a vertex with an edge pair.
    assert_eq!(engine.store.count("igpv4_graph").await, 2);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_session_classification_labels_edges() {
    let engine = Engine::start();

    engine
        .apply(vec![
            ("peer", peer("add", ("192.0.2.1", 100), ("192.0.2.2", 200))),
            ("peer", peer("add", ("192.0.2.3", 64512), ("192.0.2.4", 65000))),
            ("peer", peer("add", ("192.0.2.5", 300), ("192.0.2.6", 300))),
            ("peer", peer("add", ("192.0.2.7", 64600), ("192.0.2.8", 400))),
        ])
        .await;

    let label = |key: &str| {
        let store = engine.store.clone();
        let key = format!("{}_fwd", key);
        async move {
            store
                .documents("ipv4_graph")
                .await
                .into_iter()
                .find(|d| doc_str(d, "_key") == Some(key.as_str()))
                .and_then(|d| doc_str(&d, "protocol").map(str::to_string))
        }
    };

    assert_eq!(
        label("192.0.2.1_192.0.2.2").await.as_deref(),
        Some("BGP_ebgp_public")
    );
    assert_eq!(
        label("192.0.2.3_192.0.2.4").await.as_deref(),
        Some("BGP_ebgp_private")
    );
    assert_eq!(label("192.0.2.5_192.0.2.6").await, None);
    assert_eq!(
        label("192.0.2.7_192.0.2.8").await.as_deref(),
        Some("BGP_ebgp_hybrid")
    );
    // Three external sessions, two directed edges each.
    assert_eq!(engine.store.count("ipv4_graph").await, 6);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_reconciliation_tracks_igp_graph() {
    let engine = Engine::start();
    let reconciler = Reconciler::new(
        engine.store.clone(),
        &engine.collections,
        &ReconcileConfig::default(),
    );

    engine
        .apply(vec![
            ("ls_node", node("add", 2, "r1")),
            ("ls_node", node("add", 2, "r2")),
        ])
        .await;
    engine
        .apply(vec![
            ("ls_link", link("add", 2, "r1", "r2")),
            ("peer", peer("add", ("192.0.2.1", 100), ("192.0.2.2", 200))),
        ])
        .await;

    let first = reconciler.run_once().await.unwrap();
    assert_eq!(first.added, 1);
    let igp_edges = engine.keys("igpv4_graph").await;
    let unified = engine.keys("ipv4_graph").await;
    assert_eq!(unified.len(), 3);
    assert!(unified.contains(&igp_edges[0]));

    engine
        .apply(vec![("ls_link", link("del", 2, "r1", "r2"))])
        .await;
    let second = reconciler.run_once().await.unwrap();

    assert_eq!(second.removed, 1);
    assert_eq!(
        engine.keys("ipv4_graph").await,
        vec![
            "192.0.2.1_192.0.2.2_fwd".to_string(),
            "192.0.2.1_192.0.2.2_rev".to_string(),
        ]
    );
    engine.shutdown().await;
}

#[tokio::test]
async fn test_bgp_withdrawal_keeps_other_peers_advertisement() {
    let engine = Engine::start();

    engine
        .apply(vec![
            ("unicast_prefix_v4", bgp_prefix("add", "203.0.113.0", 24, ("192.0.2.1", 100), 300)),
            ("unicast_prefix_v4", bgp_prefix("add", "203.0.113.0", 24, ("192.0.2.2", 200), 300)),
        ])
        .await;
    assert_eq!(
        engine.keys("unicast_prefix_v4").await,
        vec![
            "203.0.113.0_24_192.0.2.1".to_string(),
            "203.0.113.0_24_192.0.2.2".to_string(),
        ]
    );
    assert_eq!(engine.keys("bgp_prefix_v4").await, vec!["203.0.113.0_24"]);
    assert_eq!(engine.store.count("ipv4_graph").await, 4);

    engine
        .apply(vec![(
            "unicast_prefix_v4",
            bgp_prefix("del", "203.0.113.0", 24, ("192.0.2.1", 100), 300),
        )])
        .await;

    assert_eq!(
        engine.keys("unicast_prefix_v4").await,
        vec!["203.0.113.0_24_192.0.2.2".to_string()]
    );
    assert_eq!(engine.keys("bgp_prefix_v4").await, vec!["203.0.113.0_24"]);
    assert_eq!(engine.store.count("ipv4_graph").await, 2);

    let notifications = engine.notifications(3).await;
    let removals: Vec<&str> = notifications
        .iter()
        .filter(|n| n.action == Action::Del)
        .map(|n| n.key.as_str())
        .collect();
    assert_eq!(removals, vec!["203.0.113.0_24_192.0.2.1"]);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_reconciliation_follows_link_metric_changes() {
    let engine = Engine::start();
    let reconciler = Reconciler::new(
        engine.store.clone(),
        &engine.collections,
        &ReconcileConfig::default(),
    );

    engine
        .apply(vec![
            ("ls_node", node("add", 2, "r1")),
            ("ls_node", node("add", 2, "r2")),
        ])
        .await;
    engine
        .apply(vec![("ls_link", link("add", 2, "r1", "r2"))])
        .await;
    reconciler.run_once().await.unwrap();

    let mut changed = link("update", 2, "r1", "r2");
    changed["igp_metric"] = 99.into();
    engine.apply(vec![("ls_link", changed)]).await;
    let report = reconciler.run_once().await.unwrap();

    assert_eq!(report.updated, 1);
    let edge_key = &engine.keys("igpv4_graph").await[0];
    let copy = engine.doc("ipv4_graph", edge_key).await.unwrap();
    assert_eq!(copy.get("igp_metric").and_then(Value::as_u64), Some(99));
    engine.shutdown().await;
}
