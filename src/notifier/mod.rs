//! Completion notifier.
//!
//! After the dispatcher reports a successful mutation, the notifier polls the
//! store until the change is visible to readers (the document is readable
//! for `add`/`update`, confirmed absent for `del`) and only then publishes a
//! [`Notification`]. Each notification runs as its own task; a stop signal
//! abandons whatever is still polling.

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::{BusError, Notification, NotificationSink};
use crate::config::NotifierConfig;
use crate::model::Action;
use crate::pipeline::Applied;
use crate::storage::{document_id, GraphStore, StoreError};
use crate::utils::retry::poll_backoff;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Change to {0} not visible after polling")]
    NotVisible(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Publish failed: {0}")]
    Publish(#[from] BusError),
}

impl NotifyError {
    fn keep_polling(&self) -> bool {
        matches!(
            self,
            NotifyError::NotVisible(_) | NotifyError::Store(StoreError::Unavailable(_))
        )
    }
}

#[derive(Clone)]
pub struct CompletionNotifier {
    store: Arc<dyn GraphStore>,
    sink: Arc<dyn NotificationSink>,
    poll_interval: Duration,
    max_polls: usize,
    stop: watch::Receiver<bool>,
}

impl CompletionNotifier {
    pub fn new(
        store: Arc<dyn GraphStore>,
        sink: Arc<dyn NotificationSink>,
        config: &NotifierConfig,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            sink,
            poll_interval: config.poll_interval(),
            max_polls: config.max_polls,
            stop,
        }
    }

    /// Confirm and announce one applied update in the background.
    pub fn notify(&self, applied: &Applied) -> JoinHandle<()> {
        let notifier = self.clone();
        let applied = applied.clone();
        let mut stop = self.stop.clone();

        tokio::spawn(async move {
            if *stop.borrow() {
                return;
            }
            tokio::select! {
                _ = stop.changed() => {
                    debug!(key = %applied.key, "Abandoning notification on shutdown");
                }
                result = notifier.deliver(&applied) => {
                    if let Err(e) = result {
                        warn!(key = %applied.key, action = %applied.action, error = %e, "Notification not sent");
                    }
                }
            }
        })
    }

    /// Wait for visibility, then publish.
    pub async fn deliver(&self, applied: &Applied) -> Result<(), NotifyError> {
        self.confirm(&applied.collection, &applied.key, applied.action)
            .await?;
        let notification = Notification::new(
            applied.key.clone(),
            document_id(&applied.collection, &applied.key),
            applied.action,
        );
        self.sink.publish(&notification).await?;
        Ok(())
    }

    /// Poll until the document's presence matches the action.
    pub async fn confirm(&self, collection: &str, key: &str, action: Action) -> Result<(), NotifyError> {
        let want_present = !action.is_removal();
        (|| async {
            let present = self.store.document_exists(collection, key).await?;
            if present == want_present {
                Ok(())
            } else {
                Err(NotifyError::NotVisible(document_id(collection, key)))
            }
        })
        .retry(poll_backoff(self.poll_interval, self.max_polls))
        .when(NotifyError::keep_polling)
        .await
    }
}

#[cfg(test)]
mod tests;
