//! Reconciliation of the unified IP graphs against the IGP graphs.
//!
//! Each pass walks one (source, derived) graph pair per address family:
//! edges missing from the derived graph are copied over, copies whose fields
//! differ from the source edge are overwritten, and derived edges carrying the
//! source marker field but no longer present in the source are removed.
//! Unmarked edges (BGP sessions and prefixes) are never touched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::ReconcileConfig;
use crate::model::{doc_key, strip_internal, Document};
use crate::storage::{remove_if_exists, Collections, Filter, GraphStore, StoreError};

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Idle,
    Reconciling,
}

/// Source graph copied into a derived graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphPair {
    pub source: String,
    pub derived: String,
}

/// Outcome of one pass over every pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct PairDrift {
    added: usize,
    updated: usize,
    removed: usize,
}

/// Whether any source field is missing from or different on the copy.
fn differs(wanted: &Document, copy: &Document) -> bool {
    wanted.iter().any(|(field, value)| copy.get(field) != Some(value))
}

pub struct Reconciler {
    store: Arc<dyn GraphStore>,
    pairs: Vec<GraphPair>,
    marker: String,
    interval: Duration,
    state: watch::Sender<ReconcileState>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn GraphStore>, collections: &Collections, config: &ReconcileConfig) -> Self {
        let pairs = vec![
            GraphPair {
                source: collections.igpv4_graph.clone(),
                derived: collections.ipv4_graph.clone(),
            },
            GraphPair {
                source: collections.igpv6_graph.clone(),
                derived: collections.ipv6_graph.clone(),
            },
        ];
        let (state, _) = watch::channel(ReconcileState::Idle);
        Self {
            store,
            pairs,
            marker: config.marker_field.clone(),
            interval: config.interval(),
            state,
        }
    }

    pub fn pairs(&self) -> &[GraphPair] {
        &self.pairs
    }

    /// Observe Idle/Reconciling transitions.
    pub fn subscribe(&self) -> watch::Receiver<ReconcileState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ReconcileState {
        *self.state.borrow()
    }

    /// Run a single pass over all graph pairs.
    #[tracing::instrument(name = "reconcile.pass", skip_all)]
    pub async fn run_once(&self) -> Result<PassReport> {
        self.state.send_replace(ReconcileState::Reconciling);
        let started_at = Utc::now();

        let mut added = 0;
        let mut updated = 0;
        let mut removed = 0;
        let mut outcome = Ok(());
        for pair in &self.pairs {
            match self.reconcile_pair(pair).await {
                Ok(drift) => {
                    added += drift.added;
                    updated += drift.updated;
                    removed += drift.removed;
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        self.state.send_replace(ReconcileState::Idle);
        outcome?;

        let report = PassReport {
            added,
            updated,
            removed,
            started_at,
            finished_at: Utc::now(),
        };
        if added > 0 || updated > 0 || removed > 0 {
            info!(added, updated, removed, "Reconciliation repaired drift");
        } else {
            debug!("Reconciliation found no drift");
        }
        Ok(report)
    }

    async fn reconcile_pair(&self, pair: &GraphPair) -> Result<PairDrift> {
        let source = self.store.query(&pair.source, &Filter::all()).await?;
        let derived = self.store.query(&pair.derived, &Filter::all()).await?;

        let source_keys: HashSet<&str> = source.iter().filter_map(doc_key).collect();
        let derived_by_key: HashMap<&str, &Document> =
            derived.iter().filter_map(|d| doc_key(d).map(|k| (k, d))).collect();

        let mut drift = PairDrift::default();
        for edge in &source {
            let Some(key) = doc_key(edge) else {
                continue;
            };
            match derived_by_key.get(key) {
                None => {
                    if self.copy_edge(&pair.derived, edge).await? {
                        drift.added += 1;
                    }
                }
                Some(copy) => {
                    let wanted = strip_internal(edge.clone());
                    if differs(&wanted, copy) {
                        match self.store.update_document(&pair.derived, key, wanted).await {
                            Ok(()) => drift.updated += 1,
                            Err(e) if e.is_not_found() => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
            }
        }

        for (key, edge) in &derived_by_key {
            if source_keys.contains(key) || !self.is_marked(edge) {
                continue;
            }
            if remove_if_exists(self.store.as_ref(), &pair.derived, key).await? {
                drift.removed += 1;
            }
        }

        debug!(
            source = %pair.source,
            derived = %pair.derived,
            added = drift.added,
            updated = drift.updated,
            removed = drift.removed,
            "Reconciled pair"
        );
        Ok(drift)
    }

    async fn copy_edge(&self, collection: &str, edge: &Document) -> Result<bool> {
        match self
            .store
            .create_document(collection, strip_internal(edge.clone()))
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_marked(&self, edge: &Document) -> bool {
        edge.get(&self.marker).is_some_and(|v| !v.is_null())
    }

    /// Run passes on the configured interval until `stop` fires.
    pub fn spawn(self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = self.interval.as_secs(), "Reconciliation loop started");

            loop {
                tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "Reconciliation pass failed");
                        }
                    }
                }
            }
            info!("Reconciliation loop stopped");
        })
    }
}

#[cfg(test)]
mod tests;
