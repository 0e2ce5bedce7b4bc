//! Kafka transport and notification sink.
//!
//! Records are consumed from one topic per record type, named
//! `{topic_prefix}.{record_type}`. Offsets are committed manually after the
//! engine has accepted a record, so unacked records are redelivered after a
//! restart.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message as KafkaMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info, warn};

use super::{BusError, Notification, NotificationSink, RawMessage, Result, Transport};
use crate::config::KafkaConfig;
use crate::model::RecordType;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

fn apply_security_config(kafka: &KafkaConfig, config: &mut ClientConfig) {
    if let Some(ref protocol) = kafka.security_protocol {
        config.set("security.protocol", protocol);
    }
    if let Some(ref mechanism) = kafka.sasl_mechanism {
        config.set("sasl.mechanism", mechanism);
    }
    if let Some(ref username) = kafka.sasl_username {
        config.set("sasl.username", username);
    }
    if let Some(ref password) = kafka.sasl_password {
        config.set("sasl.password", password);
    }
}

/// Consumer-group transport over every record topic.
pub struct KafkaTransport {
    consumer: StreamConsumer,
}

impl KafkaTransport {
    pub fn new(kafka: &KafkaConfig) -> Result<Self> {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &kafka.bootstrap_servers);
        config.set("group.id", &kafka.group_id);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");
        apply_security_config(kafka, &mut config);

        let consumer: StreamConsumer = config.create().map_err(|e| {
            BusError::Connection(format!("Failed to create Kafka consumer: {}", e))
        })?;

        let topics: Vec<String> = RecordType::ALL
            .iter()
            .map(|rt| kafka.topic_for(rt.topic_suffix()))
            .collect();
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| BusError::Connection(format!("Failed to subscribe: {}", e)))?;

        info!(
            bootstrap_servers = %kafka.bootstrap_servers,
            group_id = %kafka.group_id,
            topics = ?topics,
            "Subscribed to Kafka topics"
        );
        Ok(Self { consumer })
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    async fn receive(&mut self) -> Result<Option<RawMessage>> {
        loop {
            let message = self
                .consumer
                .recv()
                .await
                .map_err(|e| BusError::Receive(e.to_string()))?;

            let Some(payload) = message.payload() else {
                warn!(
                    topic = message.topic(),
                    offset = message.offset(),
                    "Skipping message with no payload"
                );
                continue;
            };

            debug!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "Received record"
            );
            return Ok(Some(RawMessage {
                topic: message.topic().to_string(),
                payload: payload.to_vec(),
                partition: message.partition(),
                offset: message.offset(),
            }));
        }
    }

    async fn ack(&mut self, message: &RawMessage) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| BusError::Ack(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BusError::Ack(e.to_string()))
    }
}

/// Publishes notifications as JSON, keyed by document key.
pub struct KafkaNotificationSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaNotificationSink {
    pub fn new(kafka: &KafkaConfig) -> Result<Self> {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &kafka.bootstrap_servers);
        config.set("message.timeout.ms", "5000");
        config.set("acks", "all");
        apply_security_config(kafka, &mut config);

        let producer: FutureProducer = config.create().map_err(|e| {
            BusError::Connection(format!("Failed to create Kafka producer: {}", e))
        })?;
        Ok(Self {
            producer,
            topic: kafka.notify_topic.clone(),
        })
    }
}

#[async_trait]
impl NotificationSink for KafkaNotificationSink {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let payload =
            serde_json::to_vec(notification).map_err(|e| BusError::Publish(e.to_string()))?;
        let record = FutureRecord::to(&self.topic)
            .key(&notification.key)
            .payload(&payload);

        self.producer
            .send(record, PUBLISH_TIMEOUT)
            .await
            .map_err(|(e, _)| BusError::Publish(format!("Failed to publish: {}", e)))?;

        debug!(topic = %self.topic, id = %notification.id, "Published notification");
        Ok(())
    }
}
