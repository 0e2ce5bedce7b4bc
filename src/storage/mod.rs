//! Graph store interface.
//!
//! The store is a document database with one collection per vertex or edge
//! type. Writes are single-document and report conflicts; the engine never
//! needs multi-document transactions.

use async_trait::async_trait;
use tracing::debug;

use crate::model::{doc_key, Document};

mod filter;
pub mod memory;
mod schema;

pub use filter::{Condition, Filter};
pub use memory::MemoryGraphStore;
pub use schema::{bind_schema, Collections};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors reported by a graph store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Write conflict: {collection}/{key}")]
    Conflict { collection: String, key: String },

    #[error("Document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    #[error("Collection missing: {0}")]
    MissingCollection(String),

    #[error("Document has no _key")]
    MissingKey,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Document graph store.
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    /// Insert a new document. Fails with `Conflict` if the key exists.
    async fn create_document(&self, collection: &str, doc: Document) -> Result<()>;

    /// Merge `patch` into an existing document. Fails with `NotFound` if absent.
    async fn update_document(&self, collection: &str, key: &str, patch: Document) -> Result<()>;

    /// Merge `patch` only if the stored `_rev` still equals `expected_rev`.
    ///
    /// Fails with `Conflict` when the document changed since it was read and
    /// with `NotFound` if it is absent.
    async fn update_document_if(
        &self,
        collection: &str,
        key: &str,
        patch: Document,
        expected_rev: &str,
    ) -> Result<()>;

    /// Delete a document. Fails with `NotFound` if absent.
    async fn remove_document(&self, collection: &str, key: &str) -> Result<()>;

    async fn read_document(&self, collection: &str, key: &str) -> Result<Option<Document>>;

    /// All documents of a collection matching `filter`.
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>>;

    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    async fn document_exists(&self, collection: &str, key: &str) -> Result<bool> {
        Ok(self.read_document(collection, key).await?.is_some())
    }
}

/// Which path an upsert took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,
}

/// Create a document, falling back to an update when it already exists.
pub async fn upsert(store: &dyn GraphStore, collection: &str, doc: Document) -> Result<Upserted> {
    let key = doc_key(&doc).ok_or(StoreError::MissingKey)?.to_string();
    match store.create_document(collection, doc.clone()).await {
        Ok(()) => Ok(Upserted::Created),
        Err(e) if e.is_conflict() => {
            debug!(collection, key = %key, "Document exists, updating");
            store.update_document(collection, &key, doc).await?;
            Ok(Upserted::Updated)
        }
        Err(e) => Err(e),
    }
}

/// Create a document, treating an existing one as success.
pub async fn ensure(store: &dyn GraphStore, collection: &str, doc: Document) -> Result<bool> {
    match store.create_document(collection, doc).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_conflict() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove a document, treating an absent one as success.
///
/// Returns whether a document was actually removed.
pub async fn remove_if_exists(store: &dyn GraphStore, collection: &str, key: &str) -> Result<bool> {
    match store.remove_document(collection, key).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            debug!(collection, key, "Document already absent");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Store-wide identifier of a document.
pub fn document_id(collection: &str, key: &str) -> String {
    format!("{}/{}", collection, key)
}

/// Key part of a document identifier.
pub fn key_of_id(id: &str) -> &str {
    id.rsplit_once('/').map(|(_, key)| key).unwrap_or(id)
}

#[cfg(test)]
mod tests;
