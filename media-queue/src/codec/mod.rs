pub mod json;
pub mod push;

pub use json::JsonCodec;
pub use push::{PushCodec, PushMessage, PushRequest};

use crate::{ChannelResult, EventEnvelope, MessageId};

/// Trait for wire encodings of event envelopes
pub trait EnvelopeCodec: Send + Sync {
    /// Encode an envelope for transport
    fn encode(&self, envelope: &EventEnvelope, message_id: &MessageId) -> ChannelResult<Vec<u8>>;

    /// Decode transport bytes back into an envelope
    fn decode(&self, bytes: &[u8]) -> ChannelResult<EventEnvelope>;

    /// Get codec identifier
    fn codec_id(&self) -> &'static str;
}

/// Decode an inbound request body.
///
/// Push-subscription wrappers are tried first; a bare `{"type", "data"}`
/// body is accepted as a fallback so services can call each other directly.
pub fn decode_inbound(bytes: &[u8]) -> ChannelResult<EventEnvelope> {
    match PushCodec.decode(bytes) {
        Ok(envelope) => Ok(envelope),
        Err(push_err) => JsonCodec.decode(bytes).map_err(|_| push_err),
    }
}
