//! topology-sync: topology graph synchronizer
//!
//! Reads link-state and BGP records from the configured transport, applies
//! them to the graph store and derives the topology graphs.
//!
//! ## Architecture
//! ```text
//! [Transport] -> [Ingest] -> [Batch]      -> [StoreWorker] -> [Graph Store]
//!                        \-> [Dispatcher] -> [StoreWorker] -> [Graph Store]
//!                                  |
//!                                  v
//!                           [Notifier] -> [Notification Sink]
//!
//! [Reconciler] --(interval)--> [Graph Store]
//! ```
//!
//! ## Configuration
//! - TOPOLOGY_CONFIG: path to a YAML config file (or pass it as the first argument)
//! - TOPOLOGY_LOG: tracing filter (default: info)
//! - TOPOLOGY__MESSAGING__TYPE: `stdin` (default) or `kafka`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use topology_sync::batch::BatchProcessor;
use topology_sync::bus::{LinesTransport, LoggingSink, NotificationSink, Transport};
use topology_sync::classify::TopologyProcessor;
use topology_sync::config::{Config, MessagingConfig, TransportKind};
use topology_sync::ingest::{run_ingest, IngestRouter};
use topology_sync::notifier::CompletionNotifier;
use topology_sync::pipeline::{Dispatcher, DispatcherHandle, StoreWorker, UpdateHandler};
use topology_sync::reconcile::Reconciler;
use topology_sync::storage::{bind_schema, GraphStore, MemoryGraphStore};
use topology_sync::utils::bootstrap::{init_tracing, shutdown_signal};

fn build_transport(
    messaging: &MessagingConfig,
) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    match messaging.transport {
        TransportKind::Stdin => {
            info!("Reading records from stdin");
            Ok(Box::new(LinesTransport::stdin()))
        }
        #[cfg(feature = "kafka")]
        TransportKind::Kafka => Ok(Box::new(topology_sync::bus::KafkaTransport::new(
            &messaging.kafka,
        )?)),
        #[cfg(not(feature = "kafka"))]
        TransportKind::Kafka => Err("messaging.type 'kafka' requires the 'kafka' feature".into()),
    }
}

fn build_sink(
    #[cfg_attr(not(feature = "kafka"), allow(unused_variables))] messaging: &MessagingConfig,
) -> Result<Arc<dyn NotificationSink>, Box<dyn std::error::Error>> {
    #[cfg(feature = "kafka")]
    if messaging.transport == TransportKind::Kafka {
        return Ok(Arc::new(topology_sync::bus::KafkaNotificationSink::new(
            &messaging.kafka,
        )?));
    }
    Ok(Arc::new(LoggingSink))
}

/// Wait until the dispatcher has admitted `expected` updates and holds no
/// pending or in-flight work.
async fn drain(dispatcher: &DispatcherHandle, expected: u64) {
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    loop {
        ticker.tick().await;
        let stats = dispatcher.stats();
        if stats.submitted >= expected && stats.pending == 0 && stats.in_flight == 0 {
            return;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting topology-sync");

    let collections = config.collections.clone();
    let store: Arc<dyn GraphStore> =
        Arc::new(MemoryGraphStore::with_collections(collections.all()));

    if let Err(e) = bind_schema(store.as_ref(), &collections).await {
        error!(error = %e, "Graph schema is incomplete, refusing to start");
        std::process::exit(1);
    }

    let processor = TopologyProcessor::new(Arc::clone(&store), collections.clone());
    match processor.run_deduplication().await {
        Ok(collapsed) => info!(collapsed, "Startup deduplication complete"),
        Err(e) => warn!(error = %e, "Startup deduplication failed"),
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let handler: Arc<dyn UpdateHandler> = Arc::new(StoreWorker::new(processor));

    let mut dispatcher = Dispatcher::new(Arc::clone(&handler), &config.pipeline);
    if config.notifier.enabled {
        let sink = build_sink(&config.messaging)?;
        dispatcher = dispatcher.with_notifier(CompletionNotifier::new(
            Arc::clone(&store),
            sink,
            &config.notifier,
            stop_rx.clone(),
        ));
    }
    let dispatcher = dispatcher.spawn(stop_rx.clone());

    let reconciler = config.reconcile.enabled.then(|| {
        Reconciler::new(Arc::clone(&store), &collections, &config.reconcile).spawn(stop_rx.clone())
    });

    let mut router = IngestRouter::new(dispatcher.submitter());
    let batch = if config.batch.enabled {
        let batch = Arc::new(BatchProcessor::new(Arc::clone(&handler), &config.batch));
        batch.start().await?;
        router = router.with_batch(Arc::clone(&batch), config.batch.flush_interval());
        Some(batch)
    } else {
        None
    };

    let mut transport = build_transport(&config.messaging)?;

    let exhausted = tokio::select! {
        result = run_ingest(transport.as_mut(), &router, stop_rx.clone()) => match result {
            Ok(report) => {
                info!(
                    received = report.received,
                    dropped = report.dropped,
                    batched = report.batched,
                    "Input exhausted"
                );
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Ingest failed");
                None
            }
        },
        _ = shutdown_signal() => None,
    };

    info!("Shutting down");
    if let Some(batch) = &batch {
        batch.stop().await;
    }
    if let Some(report) = exhausted {
        let expected = report.decoded - report.batched;
        tokio::select! {
            _ = drain(&dispatcher, expected) => info!("Dispatcher drained"),
            _ = shutdown_signal() => warn!("Shutdown before dispatcher drained"),
        }
    }
    drop(router);
    let _ = stop_tx.send(true);
    dispatcher.join().await;
    if let Some(reconciler) = reconciler {
        if let Err(e) = reconciler.await {
            warn!(error = %e, "Reconciliation task ended abnormally");
        }
    }

    info!("topology-sync stopped");
    Ok(())
}
