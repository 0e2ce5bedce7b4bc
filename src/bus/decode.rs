//! Decode boundary: raw payloads to typed updates.
//!
//! This is the only place untyped record JSON is inspected.

use serde_json::Value;

use super::RawMessage;
use crate::model::{Action, GraphRecord, GraphUpdate, RecordType, UnknownAction};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unknown record topic: {0}")]
    UnknownTopic(String),

    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload has no action")]
    MissingAction,

    #[error(transparent)]
    UnknownAction(#[from] UnknownAction),
}

/// Decode one message into a typed update.
pub fn decode(message: &RawMessage) -> Result<GraphUpdate, DecodeError> {
    let record_type = RecordType::from_topic(&message.topic)
        .ok_or_else(|| DecodeError::UnknownTopic(message.topic.clone()))?;

    let value: Value = serde_json::from_slice(&message.payload)?;
    let action: Action = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingAction)?
        .parse()?;

    let record = match record_type {
        RecordType::LsNode => GraphRecord::Node(serde_json::from_value(value)?),
        RecordType::LsLink => GraphRecord::Link(serde_json::from_value(value)?),
        RecordType::LsPrefix => GraphRecord::Prefix(serde_json::from_value(value)?),
        RecordType::LsSrv6Sid => GraphRecord::Srv6Sid(serde_json::from_value(value)?),
        RecordType::Peer => GraphRecord::Peer(serde_json::from_value(value)?),
        RecordType::UnicastPrefixV4 | RecordType::UnicastPrefixV6 => {
            GraphRecord::BgpPrefix(serde_json::from_value(value)?)
        }
    };

    Ok(GraphUpdate::new(action, record))
}
