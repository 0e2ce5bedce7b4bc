//! Classification and deduplication of topology records.
//!
//! [`TopologyProcessor::process`] takes an update whose raw document is
//! already in its source collection and derives everything else from it: the
//! canonical IGP node set, per-family IGP graphs, BGP vertices and the unified
//! IP graphs. Each record variant has its own handler; decisions are made from
//! the record plus neighbor documents queried from the store.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::model::{doc_key, doc_str, Document, GraphRecord, GraphUpdate, FROM, REV, TO};
use crate::storage::{document_id, Collections, Filter, GraphStore, StoreError};

mod asn;
mod bgp;
mod link;
mod lookup;
mod node;
mod prefix;
mod srv6;

pub use asn::{classify_session, is_private_asn, SessionType};
pub use prefix::{matches_locator, PrefixShape};

/// Revision-guarded list writes give up after this many conflicting passes;
/// the update is then retried by the dispatcher.
const MAX_LIST_ATTEMPTS: usize = 16;

/// Result type for classification.
pub type Result<T> = std::result::Result<T, ProcessError>;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A referenced vertex does not exist yet; retry once it arrives.
    #[error("Unresolved reference: {0}")]
    Unresolved(String),

    /// The record can never be applied.
    #[error("Invalid record: {0}")]
    Invalid(String),
}

impl ProcessError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessError::Store(_) | ProcessError::Unresolved(_))
    }
}

/// Why a record produced no derived change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// BGP-originated link-state records are covered by the BGP processors.
    BgpProtocol,
    /// Re-advertised copy of a prefix whose original is known.
    Readvertised,
    PointToPoint,
    /// Prefix equals an SRv6 locator of its origin node.
    Locator,
    /// iBGP sessions ride on the IGP topology.
    InternalSession,
    AlreadyPresent,
    /// Owning node not known yet.
    NodeAbsent,
}

/// What processing did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Applied,
    /// A duplicate node announcement was merged into its canonical node.
    Collapsed,
    Skipped(SkipReason),
}

#[derive(Clone)]
pub struct TopologyProcessor {
    store: Arc<dyn GraphStore>,
    collections: Arc<Collections>,
}

impl TopologyProcessor {
    pub fn new(store: Arc<dyn GraphStore>, collections: Collections) -> Self {
        Self {
            store,
            collections: Arc::new(collections),
        }
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    pub fn collections(&self) -> &Collections {
        &self.collections
    }

    #[tracing::instrument(
        name = "classify.process",
        skip_all,
        fields(record_type = %update.record_type(), action = %update.action)
    )]
    pub async fn process(&self, update: &GraphUpdate) -> Result<Decision> {
        let action = update.action;
        let decision = match &update.record {
            GraphRecord::Node(node) => self.process_node(node, action).await?,
            GraphRecord::Link(link) => self.process_link(link, action).await?,
            GraphRecord::Prefix(prefix) => self.process_prefix(prefix, action).await?,
            GraphRecord::Srv6Sid(sid) => self.process_srv6_sid(sid, action).await?,
            GraphRecord::Peer(peer) => self.process_peer(peer, action).await?,
            GraphRecord::BgpPrefix(prefix) => self.process_bgp_prefix(prefix, action).await?,
        };
        debug!(?decision, "Record classified");
        Ok(decision)
    }

    fn igp_node_id(&self, key: &str) -> String {
        document_id(&self.collections.igp_node, key)
    }

    /// Remove every edge in `collection` matching `filter`.
    async fn remove_edges(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let edges = self.store.query(collection, filter).await?;
        let mut removed = 0;
        for edge in &edges {
            if let Some(key) = doc_key(edge) {
                if crate::storage::remove_if_exists(self.store(), collection, key).await? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Remove every edge touching a vertex from both IGP graphs.
    async fn remove_igp_edges_touching(&self, vertex_id: &str) -> Result<usize> {
        let filter = Filter::all().any_eq([FROM, TO], vertex_id);
        let mut removed = 0;
        for graph in [&self.collections.igpv4_graph, &self.collections.igpv6_graph] {
            removed += self.remove_edges(graph, &filter).await?;
        }
        Ok(removed)
    }

    /// Re-attach IGP edges from one vertex to another.
    async fn repoint_igp_edges(&self, old_id: &str, new_id: &str) -> Result<usize> {
        let filter = Filter::all().any_eq([FROM, TO], old_id);
        let mut moved = 0;
        for graph in [&self.collections.igpv4_graph, &self.collections.igpv6_graph] {
            for edge in self.store.query(graph, &filter).await? {
                let Some(key) = doc_key(&edge) else {
                    continue;
                };
                let mut patch = Document::new();
                for end in [FROM, TO] {
                    if doc_str(&edge, end) == Some(old_id) {
                        patch.insert(end.to_string(), Value::String(new_id.to_string()));
                    }
                }
                match self.store.update_document(graph, key, patch).await {
                    Ok(()) => moved += 1,
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(moved)
    }

    /// Read-modify-write a list field of one document.
    ///
    /// The write is guarded by the revision that was read, so a concurrent
    /// change to the same document forces a fresh read and another pass of
    /// `modify`. Returns `None` when the document does not exist, otherwise
    /// whether `modify` reported a change (only then is the document written).
    async fn modify_list<T, F>(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        mut modify: F,
    ) -> Result<Option<bool>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnMut(&mut Vec<T>) -> bool + Send,
    {
        let mut attempt = 1;
        loop {
            let Some(doc) = self.store.read_document(collection, key).await? else {
                return Ok(None);
            };
            let rev = doc_str(&doc, REV).unwrap_or_default().to_string();
            let mut items: Vec<T> = match doc.get(field) {
                Some(value) if !value.is_null() => serde_json::from_value(value.clone())?,
                _ => Vec::new(),
            };
            if !modify(&mut items) {
                return Ok(Some(false));
            }

            let mut patch = Document::new();
            patch.insert(field.to_string(), serde_json::to_value(&items)?);
            match self
                .store
                .update_document_if(collection, key, patch, &rev)
                .await
            {
                Ok(()) => return Ok(Some(true)),
                Err(e) if e.is_not_found() => return Ok(None),
                Err(e) if e.is_conflict() && attempt < MAX_LIST_ATTEMPTS => {
                    debug!(collection, key, field, attempt, "Concurrent list change, re-reading");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
