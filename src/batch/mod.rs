//! Batch processor for high-volume link-state records.
//!
//! Node, link and prefix updates can bypass the key-serialized dispatcher.
//! Each category has a bounded channel and one worker task that accumulates
//! updates and flushes them when the batch is full or the flush timer fires,
//! whichever comes first. Records in a flush are applied one at a time and
//! counted individually. On stop every worker drains its channel and flushes
//! the partial batch before exiting.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::BatchConfig;
use crate::model::{GraphRecord, GraphUpdate, RecordType};
use crate::pipeline::UpdateHandler;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Result type for batch operations.
pub type Result<T> = std::result::Result<T, BatchError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("Batch processor not started")]
    NotStarted,

    #[error("Batch processor stopped")]
    Stopped,

    #[error("Batch queue full for {0}")]
    QueueFull(BatchCategory),

    #[error("Record type {0} is not batched")]
    Unsupported(RecordType),
}

/// Record categories handled by the batch path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchCategory {
    Node,
    Link,
    Prefix,
}

impl BatchCategory {
    pub const ALL: [BatchCategory; 3] = [BatchCategory::Node, BatchCategory::Link, BatchCategory::Prefix];

    pub fn of(record: &GraphRecord) -> Option<Self> {
        match record {
            GraphRecord::Node(_) => Some(BatchCategory::Node),
            GraphRecord::Link(_) => Some(BatchCategory::Link),
            GraphRecord::Prefix(_) => Some(BatchCategory::Prefix),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchCategory::Node => "node",
            BatchCategory::Link => "link",
            BatchCategory::Prefix => "prefix",
        }
    }
}

impl fmt::Display for BatchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct BatchCounters {
    processed: AtomicU64,
    errors: AtomicU64,
    pending: AtomicU64,
    flushes: AtomicU64,
}

/// Point-in-time batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: u64,
    pub errors: u64,
    /// Accepted but not yet applied.
    pub pending: u64,
    pub flushes: u64,
}

pub struct BatchProcessor {
    handler: Arc<dyn UpdateHandler>,
    batch_size: usize,
    flush_interval: Duration,
    capacity: usize,
    state: AtomicU8,
    senders: OnceLock<HashMap<BatchCategory, mpsc::Sender<GraphUpdate>>>,
    stop_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<BatchCounters>,
}

impl BatchProcessor {
    pub fn new(handler: Arc<dyn UpdateHandler>, config: &BatchConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            handler,
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval(),
            capacity: config.channel_capacity(),
            state: AtomicU8::new(STATE_IDLE),
            senders: OnceLock::new(),
            stop_tx,
            workers: Mutex::new(Vec::new()),
            counters: Arc::new(BatchCounters::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_RUNNING
    }

    /// Spawn one worker per category. Starting twice is a no-op.
    pub async fn start(&self) -> Result<()> {
        match self.state.compare_exchange(
            STATE_IDLE,
            STATE_RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(STATE_RUNNING) => return Ok(()),
            Err(_) => return Err(BatchError::Stopped),
        }

        let mut senders = HashMap::new();
        let mut workers = self.workers.lock().await;
        for category in BatchCategory::ALL {
            let (tx, rx) = mpsc::channel(self.capacity);
            senders.insert(category, tx);
            let worker = CategoryWorker {
                category,
                handler: Arc::clone(&self.handler),
                batch_size: self.batch_size,
                counters: Arc::clone(&self.counters),
            };
            workers.push(tokio::spawn(worker.run(
                rx,
                self.flush_interval,
                self.stop_tx.subscribe(),
            )));
        }
        if self.senders.set(senders).is_err() {
            // Only reachable if start raced itself past the state check.
            error!("Batch channels already initialized");
        }

        info!(
            batch_size = self.batch_size,
            flush_ms = self.flush_interval.as_millis() as u64,
            "Batch processor started"
        );
        Ok(())
    }

    /// Queue an update without waiting.
    pub fn submit(&self, update: GraphUpdate) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            STATE_IDLE => return Err(BatchError::NotStarted),
            STATE_STOPPED => return Err(BatchError::Stopped),
            _ => {}
        }
        let category = BatchCategory::of(&update.record)
            .ok_or_else(|| BatchError::Unsupported(update.record_type()))?;
        let sender = self
            .senders
            .get()
            .and_then(|senders| senders.get(&category))
            .ok_or(BatchError::NotStarted)?;

        // Counted before sending so a fast flush never sees it go negative.
        self.counters.pending.fetch_add(1, Ordering::Relaxed);
        let result = match sender.try_send(update) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(_)) => Err(BatchError::QueueFull(category)),
            Err(TrySendError::Closed(_)) => Err(BatchError::Stopped),
        };
        self.counters.pending.fetch_sub(1, Ordering::Relaxed);
        result
    }

    /// Stop accepting updates, flush what is queued, and wait for the workers.
    pub async fn stop(&self) {
        let previous = self.state.swap(STATE_STOPPED, Ordering::AcqRel);
        if previous == STATE_STOPPED {
            return;
        }
        let _ = self.stop_tx.send(true);

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for joined in futures::future::join_all(workers).await {
            if let Err(e) = joined {
                error!(error = %e, "Batch worker failed");
            }
        }
        let stats = self.stats();
        info!(
            processed = stats.processed,
            errors = stats.errors,
            "Batch processor stopped"
        );
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            pending: self.counters.pending.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
        }
    }
}

struct CategoryWorker {
    category: BatchCategory,
    handler: Arc<dyn UpdateHandler>,
    batch_size: usize,
    counters: Arc<BatchCounters>,
}

impl CategoryWorker {
    async fn run(
        self,
        mut rx: mpsc::Receiver<GraphUpdate>,
        flush_interval: Duration,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = stop.changed() => break,

                received = rx.recv() => match received {
                    Some(update) => {
                        batch.push(update);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => break,
                },

                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
            }
        }

        rx.close();
        while let Ok(update) = rx.try_recv() {
            batch.push(update);
            if batch.len() >= self.batch_size {
                self.flush(&mut batch).await;
            }
        }
        if !batch.is_empty() {
            self.flush(&mut batch).await;
        }
        debug!(category = %self.category, "Batch worker exited");
    }

    #[tracing::instrument(
        name = "batch.flush",
        skip_all,
        fields(category = %self.category, size = batch.len())
    )]
    async fn flush(&self, batch: &mut Vec<GraphUpdate>) {
        let mut failed = 0u64;
        for update in batch.drain(..) {
            match self.handler.apply(&update).await {
                Ok(_) => {
                    self.counters.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    failed += 1;
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %update.key(), error = %e, "Batched update failed");
                }
            }
            self.counters.pending.fetch_sub(1, Ordering::Relaxed);
        }
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        debug!(failed, "Flushed batch");
    }
}
