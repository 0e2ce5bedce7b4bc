use serde_json::{json, Value};

use super::*;

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("test document must be an object"),
    }
}

#[tokio::test]
async fn test_upsert_creates_then_updates() {
    let store = MemoryGraphStore::with_collections(["ls_node"]);

    let first = upsert(&store, "ls_node", doc(json!({"_key": "k", "name": "a"})))
        .await
        .unwrap();
    assert_eq!(first, Upserted::Created);

    let second = upsert(&store, "ls_node", doc(json!({"_key": "k", "name": "b"})))
        .await
        .unwrap();
    assert_eq!(second, Upserted::Updated);

    let stored = store.read_document("ls_node", "k").await.unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&json!("b")));
    assert_eq!(store.count("ls_node").await, 1);
}

#[tokio::test]
async fn test_upsert_without_key_fails() {
    let store = MemoryGraphStore::with_collections(["ls_node"]);
    let err = upsert(&store, "ls_node", doc(json!({"name": "a"})))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingKey));
}

#[tokio::test]
async fn test_ensure_keeps_existing_document() {
    let store = MemoryGraphStore::with_collections(["igp_domain"]);

    assert!(ensure(&store, "igp_domain", doc(json!({"_key": "d", "asn": 1})))
        .await
        .unwrap());
    assert!(!ensure(&store, "igp_domain", doc(json!({"_key": "d", "asn": 2})))
        .await
        .unwrap());

    let stored = store.read_document("igp_domain", "d").await.unwrap().unwrap();
    assert_eq!(stored.get("asn"), Some(&json!(1)));
}

#[tokio::test]
async fn test_remove_if_exists_is_idempotent() {
    let store = MemoryGraphStore::with_collections(["ls_link"]);
    store
        .create_document("ls_link", doc(json!({"_key": "l"})))
        .await
        .unwrap();

    assert!(remove_if_exists(&store, "ls_link", "l").await.unwrap());
    assert!(!remove_if_exists(&store, "ls_link", "l").await.unwrap());
}

#[tokio::test]
async fn test_remove_if_exists_propagates_store_errors() {
    let store = MemoryGraphStore::with_collections(["ls_link"]);
    store.set_fail_on_write(true).await;
    assert!(remove_if_exists(&store, "ls_link", "l").await.is_err());
}

#[test]
fn test_document_id_round_trip() {
    let id = document_id("igp_node", "2_0_49.0001_r1");
    assert_eq!(id, "igp_node/2_0_49.0001_r1");
    assert_eq!(key_of_id(&id), "2_0_49.0001_r1");
    assert_eq!(key_of_id("bare"), "bare");
}

#[test]
fn test_filter_conditions() {
    let d = doc(json!({"prefix": "10.0.0.0", "prefix_len": 24, "r_flag": null}));

    assert!(Filter::all().matches(&d));
    assert!(Filter::all().eq("prefix_len", 24).matches(&d));
    assert!(!Filter::all().eq("prefix_len", 32).matches(&d));
    assert!(Filter::all().ne("protocol_id", 2).matches(&d));
    assert!(!Filter::all().exists("r_flag").matches(&d));
    assert!(Filter::all().exists("prefix").matches(&d));
    assert!(Filter::all().eq_if(false, "prefix", "x").matches(&d));
    assert!(!Filter::all().eq_if(true, "prefix", "x").matches(&d));
}

#[tokio::test]
async fn test_bind_schema_reports_missing_collection() {
    let collections = Collections::default();
    let store = MemoryGraphStore::with_collections(collections.all());
    bind_schema(&store, &collections).await.unwrap();

    store.drop_collection(&collections.bgp_node).await;
    let err = bind_schema(&store, &collections).await.unwrap_err();
    assert!(matches!(err, StoreError::MissingCollection(name) if name == "bgp_node"));
}

#[test]
fn test_source_collection_per_record_type() {
    let collections = Collections::default();
    for record_type in crate::model::RecordType::ALL {
        assert_eq!(
            collections.source_for(record_type),
            record_type.topic_suffix()
        );
    }
}
