//! Single-update execution against the store.

use async_trait::async_trait;
use tracing::debug;

use crate::classify::TopologyProcessor;
use crate::model::{Action, GraphUpdate};
use crate::storage::{remove_if_exists, upsert, Upserted};

use super::Result;

/// Outcome of one successfully applied update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub key: String,
    /// Action actually taken; an `add` that hit an existing document is an `update`.
    pub action: Action,
    /// Source collection holding the record's document.
    pub collection: String,
}

/// Result reported back to the dispatcher by a finished worker.
#[derive(Debug)]
pub struct WorkResult {
    pub key: String,
    pub update: GraphUpdate,
    pub outcome: Result<Applied>,
}

/// Applies one update. Implementations must tolerate re-application.
#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    async fn apply(&self, update: &GraphUpdate) -> Result<Applied>;
}

/// Writes the record's source document, then derives the topology from it.
#[derive(Clone)]
pub struct StoreWorker {
    processor: TopologyProcessor,
}

impl StoreWorker {
    pub fn new(processor: TopologyProcessor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &TopologyProcessor {
        &self.processor
    }
}

#[async_trait]
impl UpdateHandler for StoreWorker {
    #[tracing::instrument(
        name = "pipeline.apply",
        skip_all,
        fields(key = %update.key(), action = %update.action)
    )]
    async fn apply(&self, update: &GraphUpdate) -> Result<Applied> {
        let key = update.source_key();
        let collection = self
            .processor
            .collections()
            .source_for(update.record_type())
            .to_string();
        let store = self.processor.store();

        let action = if update.action.is_removal() {
            if !remove_if_exists(store, &collection, &key).await? {
                debug!("Source document already absent");
            }
            Action::Del
        } else {
            match upsert(store, &collection, update.record.to_document()?).await? {
                Upserted::Created => Action::Add,
                Upserted::Updated => Action::Update,
            }
        };

        self.processor.process(update).await?;
        Ok(Applied {
            key,
            action,
            collection,
        })
    }
}
