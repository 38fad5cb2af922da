//! # media-queue: at-least-once event channel
//!
//! Services publish tagged envelopes (`{"type": "...", "data": {...}}`) to
//! topics. Consumers register typed [`EventHandler`]s in a
//! [`HandlerRegistry`]; every delivery is routed by type, decoded into the
//! handler's payload and classified as ack or redeliver.
//!
//! - **Typed handlers**: payloads are plain serde structs; legacy event type
//!   names are declared as aliases.
//! - **Push wire format**: [`PushCodec`] wraps the envelope as base64 JSON
//!   inside `{"message": {"data": ...}}`. [`decode_inbound`] accepts either
//!   shape.
//! - **Two transports**: [`MemoryChannel`] for tests and single-process
//!   setups, [`HttpPushChannel`] for pushing to another service.
//!
//! ```rust
//! use std::sync::Arc;
//! use media_queue::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Ping {
//!     #[serde(rename = "mediaID")]
//!     media_id: String,
//! }
//!
//! struct PingHandler;
//!
//! #[async_trait]
//! impl EventHandler for PingHandler {
//!     type Event = Ping;
//!     const EVENT_TYPE: &'static str = "ping";
//!
//!     async fn handle(&self, event: Ping) -> Result<(), HandleError> {
//!         assert_eq!(event.media_id, "m-1");
//!         Ok(())
//!     }
//! }
//!
//! # tokio_test_block(async {
//! let mut registry = HandlerRegistry::new();
//! registry.register(Arc::new(PingHandler)).unwrap();
//!
//! let channel = MemoryChannel::new();
//! channel.subscribe("media-events", Arc::new(registry));
//! channel
//!     .publish("media-events", &EventEnvelope::new("ping").with_field("mediaID", "m-1"))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(channel.deliver_pending().await.acked, 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod handler;
pub mod types;

pub use channel::{DeliveryReport, EventChannel, HttpPushChannel, MemoryChannel};
pub use codec::{decode_inbound, EnvelopeCodec, JsonCodec, PushCodec, PushRequest};
pub use error::{ChannelError, ChannelResult, HandleError};
pub use handler::{DispatchOutcome, EventHandler, HandlerRegistry};
pub use types::{EventEnvelope, MessageId, PublishReceipt};

/// Common imports for publishers and consumers
pub mod prelude {
    pub use crate::{
        ChannelError, ChannelResult, DispatchOutcome, EventChannel, EventEnvelope, EventHandler,
        HandleError, HandlerRegistry, MemoryChannel,
    };

    pub use async_trait::async_trait;
}
