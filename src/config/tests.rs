use std::io::Write;

use serial_test::serial;
use tempfile::NamedTempFile;

use super::*;

fn yaml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.batch.batch_size, 1000);
    assert_eq!(config.batch.flush_interval_ms, 100);
    assert!(!config.batch.enabled);
    assert_eq!(config.pipeline.sweep_interval_ms, 500);
    assert!(config.pipeline.worker_count() >= 2);
    assert_eq!(config.notifier.max_polls, 60);
    assert_eq!(config.reconcile.interval_secs, 5);
    assert_eq!(config.reconcile.marker_field, "protocol_id");
    assert_eq!(config.collections.igp_node, "igp_node");
    assert_eq!(config.messaging.transport, TransportKind::Stdin);
    config.validate().unwrap();
}

#[test]
#[serial]
fn test_load_from_yaml_file() {
    let file = yaml_file(
        r#"
pipeline:
  workers: 3
batch:
  enabled: true
  batch_size: 50
collections:
  igp_node: lab_node
messaging:
  type: kafka
  kafka:
    bootstrap_servers: broker:9092
"#,
    );

    let config = Config::load(file.path().to_str()).unwrap();
    assert_eq!(config.pipeline.worker_count(), 3);
    assert!(config.batch.enabled);
    assert_eq!(config.batch.batch_size, 50);
    assert_eq!(config.batch.channel_capacity(), 100);
    // Unset fields keep their defaults.
    assert_eq!(config.batch.flush_interval_ms, DEFAULT_FLUSH_INTERVAL_MS);
    assert_eq!(config.collections.igp_node, "lab_node");
    assert_eq!(config.collections.ls_node, "ls_node");
    assert_eq!(config.messaging.transport, TransportKind::Kafka);
    assert_eq!(config.messaging.kafka.bootstrap_servers, "broker:9092");
    assert_eq!(config.messaging.kafka.group_id, "topology-sync");
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let file = yaml_file("batch:\n  batch_size: 50\n");

    std::env::set_var("TOPOLOGY__BATCH__BATCH_SIZE", "75");
    let result = Config::load(file.path().to_str());
    std::env::remove_var("TOPOLOGY__BATCH__BATCH_SIZE");

    assert_eq!(result.unwrap().batch.batch_size, 75);
}

#[test]
#[serial]
fn test_zero_batch_size_rejected() {
    let file = yaml_file("batch:\n  batch_size: 0\n");
    let err = Config::load(file.path().to_str()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    let err = Config::load(Some("/nonexistent/topology.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
fn test_kafka_topic_naming() {
    let kafka = KafkaConfig::default();
    assert_eq!(kafka.topic_for("ls_node"), "gobmp.parsed.ls_node");

    let bare = KafkaConfig {
        topic_prefix: String::new(),
        ..KafkaConfig::default()
    };
    assert_eq!(bare.topic_for("peer"), "peer");
}

#[test]
fn test_from_yaml_applies_defaults() {
    let config = Config::from_yaml(
        r#"
notifier:
  enabled: true
  max_polls: 5
reconcile:
  enabled: true
"#,
    )
    .unwrap();
    assert!(config.notifier.enabled);
    assert_eq!(config.notifier.max_polls, 5);
    assert_eq!(config.notifier.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    assert!(config.reconcile.enabled);
    assert_eq!(config.reconcile.interval_secs, DEFAULT_RECONCILE_INTERVAL_SECS);
}

#[test]
fn test_from_yaml_rejects_bad_documents() {
    assert!(matches!(
        Config::from_yaml("batch: [1, 2]"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        Config::from_yaml("pipeline:\n  sweep_interval_ms: 0\n"),
        Err(ConfigError::Invalid(_))
    ));
}
