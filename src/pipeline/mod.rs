//! Key-serialized update pipeline.
//!
//! The [`Dispatcher`] guarantees at most one in-flight mutation per record
//! key while running many keys concurrently. Updates for a busy key wait in a
//! per-key [`Backlog`] and are started in submission order as the key frees
//! up; an idle sweep picks up entries whose key saw no further traffic.

mod dispatcher;
mod registry;
mod worker;

pub use dispatcher::{Dispatcher, DispatcherHandle, DispatcherSnapshot, Submitter};
pub use registry::{Backlog, KeyRegistry};
pub use worker::{Applied, StoreWorker, UpdateHandler, WorkResult};

use crate::classify::ProcessError;
use crate::storage::StoreError;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Dispatcher stopped")]
    Stopped,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Classification failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether the update should go back on its key's backlog.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Store(_) => true,
            PipelineError::Process(e) => e.is_retryable(),
            PipelineError::Stopped | PipelineError::Serialization(_) => false,
        }
    }
}
