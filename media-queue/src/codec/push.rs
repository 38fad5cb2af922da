use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::codec::{EnvelopeCodec, JsonCodec};
use crate::{ChannelError, ChannelResult, EventEnvelope, MessageId};

/// Push-subscription request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub message: PushMessage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

/// Wrapped message; `data` holds the base64 JSON envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub data: String,

    #[serde(default, alias = "message_id")]
    pub message_id: Option<String>,

    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Codec for the push-subscription wire format
#[derive(Debug, Clone)]
pub struct PushCodec;

impl PushCodec {
    pub fn wrap(&self, envelope: &EventEnvelope, message_id: &MessageId) -> ChannelResult<PushRequest> {
        let inner = JsonCodec.encode(envelope, message_id)?;
        let mut attributes = HashMap::new();
        attributes.insert("type".to_string(), envelope.event_type.clone());

        Ok(PushRequest {
            message: PushMessage {
                data: STANDARD.encode(inner),
                message_id: Some(message_id.to_string()),
                attributes,
            },
            subscription: None,
        })
    }

    pub fn unwrap(&self, request: &PushRequest) -> ChannelResult<EventEnvelope> {
        let inner = STANDARD
            .decode(request.message.data.trim())
            .map_err(|e| ChannelError::malformed(format!("push data is not base64: {e}")))?;
        JsonCodec.decode(&inner)
    }
}

impl EnvelopeCodec for PushCodec {
    fn encode(&self, envelope: &EventEnvelope, message_id: &MessageId) -> ChannelResult<Vec<u8>> {
        let request = self.wrap(envelope, message_id)?;
        serde_json::to_vec(&request).map_err(ChannelError::from)
    }

    fn decode(&self, bytes: &[u8]) -> ChannelResult<EventEnvelope> {
        let request: PushRequest = serde_json::from_slice(bytes)
            .map_err(|e| ChannelError::malformed(format!("not a push request: {e}")))?;
        self.unwrap(&request)
    }

    fn codec_id(&self) -> &'static str {
        "push"
    }
}
