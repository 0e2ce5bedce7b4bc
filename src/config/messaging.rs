//! Inbound transport and outbound notification configuration.

use serde::Deserialize;

/// Transport discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited JSON on standard input.
    #[default]
    Stdin,
    /// Kafka consumer group (requires the `kafka` feature).
    Kafka,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    #[serde(rename = "type")]
    pub transport: TransportKind,
    pub kafka: KafkaConfig,
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    pub group_id: String,
    /// Prefix of the upstream record topics, e.g. `gobmp.parsed`.
    pub topic_prefix: String,
    /// Topic receiving completion notifications.
    pub notify_topic: String,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            group_id: "topology-sync".to_string(),
            topic_prefix: "gobmp.parsed".to_string(),
            notify_topic: "topology.events".to_string(),
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            security_protocol: None,
        }
    }
}

impl KafkaConfig {
    /// Topic carrying records of one type.
    pub fn topic_for(&self, suffix: &str) -> String {
        if self.topic_prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}.{}", self.topic_prefix, suffix)
        }
    }
}
