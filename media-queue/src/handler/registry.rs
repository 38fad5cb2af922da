use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::handler::EventHandler;
use crate::{ChannelError, ChannelResult, EventEnvelope, HandleError};

/// Type-erased handler for runtime dispatch
#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandleError>;
}

struct ConcreteHandler<H: EventHandler> {
    inner: Arc<H>,
}

#[async_trait]
impl<H: EventHandler> ErasedHandler for ConcreteHandler<H> {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandleError> {
        let event: H::Event = envelope.decode().map_err(|e| {
            HandleError::permanent(format!(
                "failed to decode {} payload: {}",
                envelope.event_type, e
            ))
        })?;
        self.inner.handle(event).await
    }
}

/// What the transport should do with a delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handled successfully
    Acked,
    /// No handler for this type; acknowledged and dropped
    Ignored,
    /// Handler asked for redelivery
    Retry(String),
    /// Handler failed permanently; acknowledged and dropped
    Rejected(String),
}

impl DispatchOutcome {
    pub fn should_ack(&self) -> bool {
        !matches!(self, Self::Retry(_))
    }
}

/// Registry mapping event types to handlers
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its event type and aliases
    pub fn register<H: EventHandler>(&mut self, handler: Arc<H>) -> ChannelResult<()> {
        let names: Vec<&'static str> = std::iter::once(H::EVENT_TYPE)
            .chain(H::ALIASES.iter().copied())
            .collect();

        if let Some(taken) = names.iter().find(|n| self.handlers.contains_key(**n)) {
            return Err(ChannelError::DuplicateHandler(taken.to_string()));
        }

        let erased: Arc<dyn ErasedHandler> = Arc::new(ConcreteHandler { inner: handler });
        for name in names {
            self.handlers.insert(name.to_string(), erased.clone());
        }
        Ok(())
    }

    /// Route an envelope to its handler
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> DispatchOutcome {
        let Some(handler) = self.handlers.get(&envelope.event_type) else {
            debug!(event_type = %envelope.event_type, "no handler registered, ignoring");
            return DispatchOutcome::Ignored;
        };

        match handler.handle(envelope).await {
            Ok(()) => DispatchOutcome::Acked,
            Err(HandleError::Retryable(msg)) => {
                warn!(event_type = %envelope.event_type, error = %msg, "handler failed, will retry");
                DispatchOutcome::Retry(msg)
            }
            Err(HandleError::Permanent(msg)) => {
                warn!(event_type = %envelope.event_type, error = %msg, "handler rejected event");
                DispatchOutcome::Rejected(msg)
            }
        }
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
