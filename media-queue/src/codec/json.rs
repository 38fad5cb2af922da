use crate::{codec::EnvelopeCodec, ChannelError, ChannelResult, EventEnvelope, MessageId};

/// Plain JSON envelope codec
#[derive(Debug, Clone)]
pub struct JsonCodec;

impl EnvelopeCodec for JsonCodec {
    fn encode(&self, envelope: &EventEnvelope, _message_id: &MessageId) -> ChannelResult<Vec<u8>> {
        serde_json::to_vec(envelope).map_err(ChannelError::from)
    }

    fn decode(&self, bytes: &[u8]) -> ChannelResult<EventEnvelope> {
        let envelope: EventEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| ChannelError::malformed(format!("invalid event json: {e}")))?;
        if envelope.event_type.trim().is_empty() {
            return Err(ChannelError::malformed("event type is empty"));
        }
        Ok(envelope)
    }

    fn codec_id(&self) -> &'static str {
        "json"
    }
}
