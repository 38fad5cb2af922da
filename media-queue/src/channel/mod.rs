pub mod http;
pub mod memory;

pub use http::HttpPushChannel;
pub use memory::{DeliveryReport, MemoryChannel};

use async_trait::async_trait;

use crate::{ChannelResult, EventEnvelope, PublishReceipt};

/// Publishing side of the cross-service event channel.
///
/// Delivery is at-least-once: consumers may see the same envelope more than
/// once and in any order relative to other topics.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Publish an envelope to a topic
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> ChannelResult<PublishReceipt>;
}
