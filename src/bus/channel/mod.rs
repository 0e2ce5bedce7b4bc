//! In-process channel transport and notifier for standalone mode and tests.
//!
//! Records flow over a tokio mpsc channel; notifications fan out over a
//! broadcast channel.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::debug;

use super::{BusError, Notification, NotificationSink, RawMessage, Result, Transport};

/// Broadcast capacity for notifications.
const NOTIFY_CAPACITY: usize = 1024;

/// Create a connected publisher/transport pair.
pub fn channel_transport(capacity: usize) -> (ChannelPublisher, ChannelTransport) {
    let (sender, receiver) = mpsc::channel(capacity);
    let publisher = ChannelPublisher {
        sender,
        next_offset: Arc::new(AtomicI64::new(0)),
    };
    let transport = ChannelTransport {
        receiver,
        acked: Arc::new(RwLock::new(Vec::new())),
    };
    (publisher, transport)
}

/// Sending half: assigns monotonically increasing offsets.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<RawMessage>,
    next_offset: Arc<AtomicI64>,
}

impl ChannelPublisher {
    pub async fn send(&self, topic: impl Into<String>, payload: Vec<u8>) -> Result<i64> {
        let offset = self.next_offset.fetch_add(1, Ordering::Relaxed);
        self.sender
            .send(RawMessage::new(topic, payload, offset))
            .await
            .map_err(|_| BusError::Closed)?;
        Ok(offset)
    }

    /// Serialize `record` as JSON and send it.
    pub async fn send_json(&self, topic: impl Into<String>, record: &serde_json::Value) -> Result<i64> {
        let payload =
            serde_json::to_vec(record).map_err(|e| BusError::Publish(e.to_string()))?;
        self.send(topic, payload).await
    }
}

/// Receiving half. Acked offsets are recorded for inspection.
pub struct ChannelTransport {
    receiver: mpsc::Receiver<RawMessage>,
    acked: Arc<RwLock<Vec<i64>>>,
}

impl ChannelTransport {
    /// Shared log of acked offsets, in ack order.
    pub fn ack_log(&self) -> Arc<RwLock<Vec<i64>>> {
        self.acked.clone()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn receive(&mut self) -> Result<Option<RawMessage>> {
        Ok(self.receiver.recv().await)
    }

    async fn ack(&mut self, message: &RawMessage) -> Result<()> {
        self.acked.write().await.push(message.offset);
        Ok(())
    }
}

/// Notification sink backed by a broadcast channel.
#[derive(Clone)]
pub struct ChannelNotifier {
    sender: broadcast::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for ChannelNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for ChannelNotifier {
    #[tracing::instrument(name = "bus.notify", skip_all, fields(id = %notification.id))]
    async fn publish(&self, notification: &Notification) -> Result<()> {
        match self.sender.send(notification.clone()) {
            Ok(receivers) => debug!(receivers, "Notification sent via channel"),
            // No subscribers is not an error for a fire-and-forget sink.
            Err(_) => debug!("No notification subscribers"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
