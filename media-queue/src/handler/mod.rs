pub mod registry;

pub use registry::{DispatchOutcome, HandlerRegistry};

use crate::HandleError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Trait for typed consumers of one event type
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Decoded payload of the envelope's `data`
    type Event: DeserializeOwned + Send;

    /// Event type identifier for dispatch
    const EVENT_TYPE: &'static str;

    /// Legacy type names routed to the same handler
    const ALIASES: &'static [&'static str] = &[];

    /// Handle one delivery. Must be idempotent: the channel is at-least-once.
    async fn handle(&self, event: Self::Event) -> Result<(), HandleError>;
}
