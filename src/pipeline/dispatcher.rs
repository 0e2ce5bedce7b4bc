//! Dispatch loop.
//!
//! One task owns the [`KeyRegistry`] and [`Backlog`]; it never awaits the
//! store. Workers run as separate tasks gated by a token semaphore and report
//! back over a completion channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::model::GraphUpdate;
use crate::notifier::CompletionNotifier;

use super::registry::{Backlog, KeyRegistry};
use super::worker::{UpdateHandler, WorkResult};
use super::{PipelineError, Result};

/// Counters shared between the dispatch loop and its handle.
#[derive(Debug, Default)]
struct DispatcherStats {
    submitted: AtomicU64,
    started: AtomicU64,
    applied: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
    backlogged: AtomicU64,
    pending: AtomicU64,
    in_flight: AtomicU64,
}

/// Point-in-time view of dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherSnapshot {
    pub submitted: u64,
    pub started: u64,
    pub applied: u64,
    pub requeued: u64,
    pub dropped: u64,
    /// Updates that had to wait for their key.
    pub backlogged: u64,
    /// Updates currently waiting in the backlog.
    pub pending: u64,
    pub in_flight: u64,
}

impl DispatcherStats {
    fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            backlogged: self.backlogged.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable, non-blocking entry point into a running dispatcher.
#[derive(Clone)]
pub struct Submitter {
    tx: mpsc::UnboundedSender<GraphUpdate>,
}

impl Submitter {
    pub fn submit(&self, update: GraphUpdate) -> Result<()> {
        self.tx.send(update).map_err(|_| PipelineError::Stopped)
    }
}

pub struct Dispatcher {
    handler: Arc<dyn UpdateHandler>,
    workers: usize,
    sweep_interval: Duration,
    notifier: Option<CompletionNotifier>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn UpdateHandler>, config: &PipelineConfig) -> Self {
        Self {
            handler,
            workers: config.worker_count(),
            sweep_interval: config.sweep_interval(),
            notifier: None,
        }
    }

    /// Announce every successful mutation through `notifier`.
    pub fn with_notifier(mut self, notifier: CompletionNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Start the dispatch loop. It runs until `stop` fires.
    pub fn spawn(self, stop: watch::Receiver<bool>) -> DispatcherHandle {
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(DispatcherStats::default());

        info!(
            workers = self.workers,
            sweep_ms = self.sweep_interval.as_millis() as u64,
            "Starting dispatcher"
        );

        let state = DispatchLoop {
            handler: self.handler,
            tokens: Arc::new(Semaphore::new(self.workers.max(1))),
            registry: KeyRegistry::new(),
            backlog: Backlog::new(),
            done_tx,
            in_flight: 0,
            stats: Arc::clone(&stats),
            notifier: self.notifier,
        };
        let join = tokio::spawn(state.run(submit_rx, done_rx, self.sweep_interval, stop));

        DispatcherHandle {
            submitter: Submitter { tx: submit_tx },
            stats,
            join,
        }
    }
}

pub struct DispatcherHandle {
    submitter: Submitter,
    stats: Arc<DispatcherStats>,
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn submit(&self, update: GraphUpdate) -> Result<()> {
        self.submitter.submit(update)
    }

    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    pub fn stats(&self) -> DispatcherSnapshot {
        self.stats.snapshot()
    }

    /// Wait for the dispatch loop to exit after its stop signal.
    pub async fn join(self) {
        drop(self.submitter);
        if let Err(e) = self.join.await {
            error!(error = %e, "Dispatcher task failed");
        }
    }
}

struct DispatchLoop {
    handler: Arc<dyn UpdateHandler>,
    tokens: Arc<Semaphore>,
    registry: KeyRegistry,
    backlog: Backlog,
    done_tx: mpsc::UnboundedSender<WorkResult>,
    in_flight: usize,
    stats: Arc<DispatcherStats>,
    notifier: Option<CompletionNotifier>,
}

impl DispatchLoop {
    async fn run(
        mut self,
        mut submissions: mpsc::UnboundedReceiver<GraphUpdate>,
        mut completions: mpsc::UnboundedReceiver<WorkResult>,
        sweep_interval: Duration,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut sweep = tokio::time::interval(sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut accepting = true;

        loop {
            tokio::select! {
                biased;

                _ = stop.changed() => {
                    info!("Dispatcher received stop signal");
                    break;
                }

                Some(result) = completions.recv() => self.complete(result, true),

                received = submissions.recv(), if accepting => match received {
                    Some(update) => self.admit(update),
                    None => {
                        debug!("All submitters dropped");
                        accepting = false;
                    }
                },

                _ = sweep.tick() => self.sweep(),
            }
        }

        // Stop admitting; let in-flight workers finish.
        submissions.close();
        while self.in_flight > 0 {
            match completions.recv().await {
                Some(result) => self.complete(result, false),
                None => break,
            }
        }

        let pending = self.backlog.len();
        if pending > 0 {
            warn!(
                pending,
                keys = self.backlog.keys().len(),
                "Dispatcher stopped with backlog entries; they are not persisted"
            );
        }
        info!("Dispatcher stopped");
    }

    fn admit(&mut self, update: GraphUpdate) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        let key = update.key();

        if self.registry.is_busy(&key) {
            debug!(key = %key, "Key busy, queueing update");
            self.enqueue(&key, update);
            return;
        }

        if self.backlog.has_pending(&key) {
            // Older updates for this key go first.
            self.enqueue(&key, update);
            self.start_next(&key);
            return;
        }

        self.start(key, update);
    }

    fn enqueue(&mut self, key: &str, update: GraphUpdate) {
        self.backlog.push_back(key, update);
        self.stats.backlogged.fetch_add(1, Ordering::Relaxed);
        self.stats.pending.fetch_add(1, Ordering::Relaxed);
    }

    fn start_next(&mut self, key: &str) {
        if let Some(update) = self.backlog.pop(key) {
            self.stats.pending.fetch_sub(1, Ordering::Relaxed);
            self.start(key.to_string(), update);
        }
    }

    fn start(&mut self, key: String, update: GraphUpdate) {
        self.registry.acquire(&key);
        self.in_flight += 1;
        self.stats.started.fetch_add(1, Ordering::Relaxed);
        self.stats.in_flight.fetch_add(1, Ordering::Relaxed);

        let handler = Arc::clone(&self.handler);
        let tokens = Arc::clone(&self.tokens);
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = match tokens.acquire_owned().await {
                Ok(_permit) => handler.apply(&update).await,
                Err(_) => Err(PipelineError::Stopped),
            };
            // The loop only drops its receiver after every worker reported.
            let _ = done.send(WorkResult {
                key,
                update,
                outcome,
            });
        });
    }

    /// Handle a finished worker. When `resume` is set the key's next
    /// backlog entry is started right away.
    fn complete(&mut self, result: WorkResult, resume: bool) {
        let WorkResult {
            key,
            update,
            outcome,
        } = result;
        self.registry.release(&key);
        self.in_flight = self.in_flight.saturating_sub(1);
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);

        match outcome {
            Ok(applied) => {
                self.stats.applied.fetch_add(1, Ordering::Relaxed);
                debug!(key = %applied.key, action = %applied.action, "Update applied");
                if let Some(notifier) = &self.notifier {
                    notifier.notify(&applied);
                }
                if resume {
                    self.start_next(&key);
                }
            }
            Err(e) if e.is_retryable() => {
                warn!(key = %key, error = %e, "Update failed, returning to backlog");
                self.backlog.push_front(&key, update);
                self.stats.requeued.fetch_add(1, Ordering::Relaxed);
                self.stats.pending.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping update that cannot be applied");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                if resume {
                    self.start_next(&key);
                }
            }
        }
    }

    /// Start one pending update for every key with nothing in flight.
    fn sweep(&mut self) {
        let idle: Vec<String> = self
            .backlog
            .keys()
            .into_iter()
            .filter(|key| !self.registry.is_busy(key))
            .collect();
        if idle.is_empty() {
            return;
        }
        debug!(keys = idle.len(), "Sweeping idle backlog");
        for key in idle {
            self.start_next(&key);
        }
    }
}
