//! Message plumbing around the engine.
//!
//! This module contains:
//! - `Transport` trait: inbound, ordered-per-partition record delivery with ack
//! - `decode`: the boundary turning raw payloads into typed updates
//! - `NotificationSink` trait: outbound completion events
//! - Implementations: in-process channel, newline-delimited JSON, Kafka, Mock

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::model::Action;

pub mod channel;
mod decode;
pub mod lines;
pub mod mock;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use channel::{channel_transport, ChannelNotifier, ChannelPublisher, ChannelTransport};
pub use decode::{decode, DecodeError};
pub use lines::LinesTransport;
pub use mock::MockNotificationSink;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaNotificationSink, KafkaTransport};

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Ack failed: {0}")]
    Ack(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Transport closed")]
    Closed,
}

/// Undecoded record as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Topic or stream name; its last `.` segment selects the record type.
    pub topic: String,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            payload,
            partition: 0,
            offset,
        }
    }
}

/// Inbound record source.
///
/// Delivery is at-least-once: a message that is never acked may be delivered
/// again after a restart.
#[async_trait]
pub trait Transport: Send {
    /// Next message, or `None` once the source is exhausted.
    async fn receive(&mut self) -> Result<Option<RawMessage>>;

    /// Mark a message as handled.
    async fn ack(&mut self, message: &RawMessage) -> Result<()>;
}

/// Downstream event emitted once a mutation is visible in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    #[serde(rename = "_key")]
    pub key: String,
    /// `{collection}/{key}`
    #[serde(rename = "_id")]
    pub id: String,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(key: impl Into<String>, id: impl Into<String>, action: Action) -> Self {
        Self {
            key: key.into(),
            id: id.into(),
            action,
            timestamp: Utc::now(),
        }
    }
}

/// Outbound notification channel. Publishing is fire-and-forget for callers.
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn publish(&self, notification: &Notification) -> Result<()>;
}

/// Sink that only logs notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        info!(
            key = %notification.key,
            id = %notification.id,
            action = %notification.action,
            "Topology change"
        );
        Ok(())
    }
}
