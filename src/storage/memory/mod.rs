//! In-memory graph store.
//!
//! Used by the standalone binary and by tests. Documents are kept per
//! collection in key order so query results are deterministic.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::model::{doc_key, Document, ID, KEY, REV};
use crate::storage::{document_id, Filter, GraphStore, Result, StoreError};

type Collection = BTreeMap<String, Document>;

#[derive(Default)]
pub struct MemoryGraphStore {
    collections: RwLock<HashMap<String, Collection>>,
    revision: AtomicU64,
    fail_on_write: RwLock<bool>,
    fail_on_query: RwLock<bool>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the given collections already created.
    pub fn with_collections<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collections = names
            .into_iter()
            .map(|name| (name.into(), Collection::new()))
            .collect();
        Self {
            collections: RwLock::new(collections),
            ..Self::default()
        }
    }

    pub async fn create_collection(&self, name: &str) {
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_default();
    }

    pub async fn drop_collection(&self, name: &str) {
        self.collections.write().await.remove(name);
    }

    /// Snapshot of every document in a collection, in key order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn set_fail_on_query(&self, fail: bool) {
        *self.fail_on_query.write().await = fail;
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        Ok(())
    }

    async fn check_query(&self) -> Result<()> {
        if *self.fail_on_query.read().await {
            return Err(StoreError::Unavailable("query rejected".to_string()));
        }
        Ok(())
    }

    fn stamp(&self, collection: &str, key: &str, doc: &mut Document) {
        let rev = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
        doc.insert(KEY.to_string(), Value::String(key.to_string()));
        doc.insert(ID.to_string(), Value::String(document_id(collection, key)));
        doc.insert(REV.to_string(), Value::String(rev.to_string()));
    }

    async fn merge(
        &self,
        collection: &str,
        key: &str,
        patch: Document,
        expected_rev: Option<&str>,
    ) -> Result<()> {
        self.check_write().await?;

        let mut collections = self.collections.write().await;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        let existing = docs.get_mut(key).ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            key: key.to_string(),
        })?;
        if let Some(expected) = expected_rev {
            if existing.get(REV).and_then(Value::as_str) != Some(expected) {
                return Err(StoreError::Conflict {
                    collection: collection.to_string(),
                    key: key.to_string(),
                });
            }
        }

        for (field, value) in patch {
            if field == ID || field == REV || field == KEY {
                continue;
            }
            existing.insert(field, value);
        }
        self.stamp(collection, key, existing);
        Ok(())
    }
}

fn missing(collection: &str) -> StoreError {
    StoreError::MissingCollection(collection.to_string())
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn create_document(&self, collection: &str, mut doc: Document) -> Result<()> {
        self.check_write().await?;
        let key = doc_key(&doc).ok_or(StoreError::MissingKey)?.to_string();

        let mut collections = self.collections.write().await;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        if docs.contains_key(&key) {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                key,
            });
        }
        self.stamp(collection, &key, &mut doc);
        docs.insert(key, doc);
        Ok(())
    }

    async fn update_document(&self, collection: &str, key: &str, patch: Document) -> Result<()> {
        self.merge(collection, key, patch, None).await
    }

    async fn update_document_if(
        &self,
        collection: &str,
        key: &str,
        patch: Document,
        expected_rev: &str,
    ) -> Result<()> {
        self.merge(collection, key, patch, Some(expected_rev)).await
    }

    async fn remove_document(&self, collection: &str, key: &str) -> Result<()> {
        self.check_write().await?;

        let mut collections = self.collections.write().await;
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        docs.remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            })
    }

    async fn read_document(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        self.check_query().await?;

        let collections = self.collections.read().await;
        let docs = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(docs.get(key).cloned())
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
        self.check_query().await?;

        let collections = self.collections.read().await;
        let docs = collections.get(collection).ok_or_else(|| missing(collection))?;
        let matching = docs.values().filter(|doc| filter.matches(doc)).cloned();
        Ok(match filter.max_results() {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        self.check_query().await?;
        Ok(self.collections.read().await.contains_key(collection))
    }
}
