//! Shared engine harness for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;

use topology_sync::bus::{channel_transport, MockNotificationSink, Notification};
use topology_sync::classify::TopologyProcessor;
use topology_sync::config::{NotifierConfig, PipelineConfig};
use topology_sync::ingest::{run_ingest, IngestReport, IngestRouter};
use topology_sync::model::{doc_key, Document};
use topology_sync::notifier::CompletionNotifier;
use topology_sync::pipeline::{Dispatcher, DispatcherHandle, DispatcherSnapshot, StoreWorker};
use topology_sync::storage::{Collections, GraphStore, MemoryGraphStore};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// A running dispatcher over an in-memory store, wired like the binary.
pub struct Engine {
    pub store: Arc<MemoryGraphStore>,
    pub sink: Arc<MockNotificationSink>,
    pub collections: Collections,
    dispatcher: DispatcherHandle,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    dispatched: AtomicU64,
}

impl Engine {
    pub fn start() -> Self {
        let collections = Collections::default();
        let store = Arc::new(MemoryGraphStore::with_collections(collections.all()));
        let sink = Arc::new(MockNotificationSink::new());
        let (stop_tx, stop_rx) = watch::channel(false);

        let processor = TopologyProcessor::new(store.clone(), collections.clone());
        let notifier = CompletionNotifier::new(
            store.clone(),
            sink.clone(),
            &NotifierConfig {
                enabled: true,
                poll_interval_ms: 10,
                max_polls: 50,
            },
            stop_rx.clone(),
        );
        let pipeline = PipelineConfig {
            workers: 4,
            sweep_interval_ms: 20,
        };
        let dispatcher = Dispatcher::new(Arc::new(StoreWorker::new(processor)), &pipeline)
            .with_notifier(notifier)
            .spawn(stop_rx.clone());

        Self {
            store,
            sink,
            collections,
            dispatcher,
            stop_tx,
            stop_rx,
            dispatched: AtomicU64::new(0),
        }
    }

    /// Publish `records` as `(record type, payload)` pairs and consume them.
    pub async fn ingest(&self, records: Vec<(&str, Value)>) -> IngestReport {
        let (publisher, mut transport) = channel_transport(records.len().max(1));
        for (record_type, payload) in &records {
            publisher
                .send_json(format!("gobmp.parsed.{}", record_type), payload)
                .await
                .unwrap();
        }
        drop(publisher);

        let router = IngestRouter::new(self.dispatcher.submitter());
        let report = run_ingest(&mut transport, &router, self.stop_rx.clone())
            .await
            .unwrap();
        self.dispatched.fetch_add(report.decoded, Ordering::SeqCst);
        report
    }

    /// Ingest and wait until every update has been applied.
    pub async fn apply(&self, records: Vec<(&str, Value)>) -> IngestReport {
        let report = self.ingest(records).await;
        self.settle().await;
        report
    }

    /// Wait until every dispatched update is admitted and no work remains.
    pub async fn settle(&self) {
        let expected = self.dispatched.load(Ordering::SeqCst);
        tokio::time::timeout(SETTLE_TIMEOUT, async {
            loop {
                let stats = self.dispatcher.stats();
                if stats.submitted >= expected && stats.pending == 0 && stats.in_flight == 0 {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("engine did not settle");
    }

    pub fn stats(&self) -> DispatcherSnapshot {
        self.dispatcher.stats()
    }

    pub async fn notifications(&self, count: usize) -> Vec<Notification> {
        tokio::time::timeout(SETTLE_TIMEOUT, async {
            while self.sink.published_count().await < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("notifications not published");
        self.sink.published().await
    }

    pub async fn keys(&self, collection: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .store
            .documents(collection)
            .await
            .iter()
            .filter_map(|d| doc_key(d).map(str::to_string))
            .collect();
        keys.sort();
        keys
    }

    pub async fn doc(&self, collection: &str, key: &str) -> Option<Document> {
        self.store.read_document(collection, key).await.unwrap()
    }

    pub async fn shutdown(self) {
        self.stop_tx.send(true).unwrap();
        self.dispatcher.join().await;
    }
}

pub fn node(action: &str, protocol_id: u8, router: &str) -> Value {
    json!({
        "action": action,
        "igp_router_id": router,
        "router_id": format!("10.0.0.{}", router.trim_start_matches('r')),
        "domain_id": 0,
        "protocol_id": protocol_id,
        "area_id": "49.0001",
        "asn": 65000,
        "name": router
    })
}

pub fn link(action: &str, protocol_id: u8, local: &str, remote: &str) -> Value {
    json!({
        "action": action,
        "igp_router_id": local,
        "remote_igp_router_id": remote,
        "domain_id": 0,
        "protocol_id": protocol_id,
        "local_link_ip": "10.1.1.1",
        "remote_link_ip": "10.1.1.2",
        "igp_metric": 10
    })
}

pub fn ls_prefix(action: &str, protocol_id: u8, router: &str, prefix: &str, len: u8) -> Value {
    json!({
        "action": action,
        "igp_router_id": router,
        "domain_id": 0,
        "protocol_id": protocol_id,
        "prefix": prefix,
        "prefix_len": len
    })
}

pub fn peer(action: &str, local: (&str, u32), remote: (&str, u32)) -> Value {
    json!({
        "action": action,
        "local_bgp_id": local.0,
        "remote_bgp_id": remote.0,
        "local_asn": local.1,
        "remote_asn": remote.1,
        "local_ip": local.0,
        "remote_ip": remote.0
    })
}

/// Key the engine derives for a level/router pair built by [`node`].
pub fn node_key(protocol_id: u8, router: &str) -> String {
    format!("{}_0_49.0001_{}", protocol_id, router)
}


pub fn bgp_prefix(action: &str, prefix: &str, len: u8, peer: (&str, u32), origin_as: u32) -> Value {
    json!({
        "action": action,
        "prefix": prefix,
        "prefix_len": len,
        "peer_ip": peer.0,
        "peer_asn": peer.1,
        "origin_as": origin_as,
        "as_path": [peer.1, origin_as]
    })
}
