//! Mock notification sink for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, Notification, NotificationSink, Result};

/// Records every published notification.
#[derive(Default)]
pub struct MockNotificationSink {
    published: RwLock<Vec<Notification>>,
    fail_on_publish: RwLock<bool>,
}

impl MockNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<Notification> {
        self.published.read().await.clone()
    }

    pub async fn take_published(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl NotificationSink for MockNotificationSink {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(notification.clone());
        Ok(())
    }
}
