use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::MessageId;
use crate::{ChannelError, ChannelResult};

/// Tagged cross-service event: `{"type": "...", "data": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub data: Map<String, Value>,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Map::new(),
        }
    }

    /// Envelope whose data is the serialized payload object.
    pub fn from_payload<T: Serialize>(event_type: impl Into<String>, payload: &T) -> ChannelResult<Self> {
        match serde_json::to_value(payload)? {
            Value::Object(data) => Ok(Self {
                event_type: event_type.into(),
                data,
            }),
            other => Err(ChannelError::SerializationError(format!(
                "event payload must be an object, got {other}"
            ))),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// First non-empty string among `keys` (aliases of one field).
    pub fn field_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.data.get(*k).and_then(Value::as_str))
            .find(|v| !v.trim().is_empty())
    }

    /// Decode `data` into a typed payload.
    pub fn decode<T: DeserializeOwned>(&self) -> ChannelResult<T> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(ChannelError::from)
    }
}

/// Confirmation that the transport accepted a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: MessageId,
    pub topic: String,
    pub published_at: DateTime<Utc>,
}

impl PublishReceipt {
    pub fn new(message_id: MessageId, topic: impl Into<String>) -> Self {
        Self {
            message_id,
            topic: topic.into(),
            published_at: Utc::now(),
        }
    }
}
