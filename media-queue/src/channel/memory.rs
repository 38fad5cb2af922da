use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::channel::EventChannel;
use crate::handler::{DispatchOutcome, HandlerRegistry};
use crate::{ChannelError, ChannelResult, EventEnvelope, MessageId, PublishReceipt};

const DEFAULT_MAX_DELIVERIES: u32 = 5;

struct Delivery {
    message_id: MessageId,
    topic: String,
    envelope: EventEnvelope,
    registry: Arc<HandlerRegistry>,
    attempts: u32,
}

/// Counts from one `deliver_pending` pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub acked: usize,
    pub ignored: usize,
    pub rejected: usize,
    pub redelivered: usize,
    pub exhausted: usize,
}

/// In-process channel for tests and single-binary deployments.
///
/// Publishing appends to a per-topic log and queues one delivery per
/// subscription. Nothing is dispatched until `deliver_pending` runs.
pub struct MemoryChannel {
    log: RwLock<HashMap<String, Vec<(MessageId, EventEnvelope)>>>,
    subscriptions: RwLock<HashMap<String, Vec<Arc<HandlerRegistry>>>>,
    pending: Mutex<VecDeque<Delivery>>,
    fail_publish: AtomicBool,
    max_deliveries: u32,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self {
            log: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            fail_publish: AtomicBool::new(false),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
        }
    }

    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    /// Route future publishes on `topic` to `registry`
    pub fn subscribe(&self, topic: impl Into<String>, registry: Arc<HandlerRegistry>) {
        self.subscriptions
            .write()
            .entry(topic.into())
            .or_default()
            .push(registry);
    }

    /// Make every publish fail until reset
    pub fn set_publish_failure(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Envelopes published to `topic`, oldest first
    pub fn published(&self, topic: &str) -> Vec<EventEnvelope> {
        self.log
            .read()
            .get(topic)
            .map(|entries| entries.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Dispatch queued deliveries until the queue drains.
    ///
    /// Retryable failures are requeued until a message has been attempted
    /// `max_deliveries` times. Deliveries published by handlers during the
    /// pass are dispatched in the same pass.
    pub async fn deliver_pending(&self) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        loop {
            let next = self.pending.lock().pop_front();
            let Some(mut delivery) = next else { break };

            delivery.attempts += 1;
            let outcome = delivery.registry.dispatch(&delivery.envelope).await;
            debug!(
                message_id = %delivery.message_id,
                topic = %delivery.topic,
                attempt = delivery.attempts,
                ?outcome,
                "delivered event"
            );

            match outcome {
                DispatchOutcome::Acked => report.acked += 1,
                DispatchOutcome::Ignored => report.ignored += 1,
                DispatchOutcome::Rejected(_) => report.rejected += 1,
                DispatchOutcome::Retry(reason) => {
                    if delivery.attempts < self.max_deliveries {
                        report.redelivered += 1;
                        self.pending.lock().push_back(delivery);
                    } else {
                        warn!(
                            message_id = %delivery.message_id,
                            topic = %delivery.topic,
                            attempts = delivery.attempts,
                            error = %reason,
                            "giving up on event"
                        );
                        report.exhausted += 1;
                    }
                }
            }
        }

        report
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> ChannelResult<PublishReceipt> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ChannelError::publish_failed(topic, "channel unavailable"));
        }

        let message_id = MessageId::new();
        self.log
            .write()
            .entry(topic.to_string())
            .or_default()
            .push((message_id.clone(), envelope.clone()));

        let subscribers = self
            .subscriptions
            .read()
            .get(topic)
            .cloned()
            .unwrap_or_default();

        let mut pending = self.pending.lock();
        for registry in subscribers {
            pending.push_back(Delivery {
                message_id: message_id.clone(),
                topic: topic.to_string(),
                envelope: envelope.clone(),
                registry,
                attempts: 0,
            });
        }

        Ok(PublishReceipt::new(message_id, topic))
    }
}
