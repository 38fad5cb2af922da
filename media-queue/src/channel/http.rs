use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::channel::EventChannel;
use crate::codec::PushCodec;
use crate::{ChannelError, ChannelResult, EventEnvelope, MessageId, PublishReceipt};

/// Publishes push-format requests to a per-topic HTTP endpoint.
pub struct HttpPushChannel {
    client: reqwest::Client,
    endpoints: HashMap<String, String>,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl HttpPushChannel {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoints: HashMap::new(),
            bearer_token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_endpoint(mut self, topic: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(topic.into(), url.into());
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self, topic: &str) -> Option<&str> {
        self.endpoints.get(topic).map(String::as_str)
    }
}

#[async_trait]
impl EventChannel for HttpPushChannel {
    #[instrument(skip(self, envelope), fields(event_type = %envelope.event_type))]
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> ChannelResult<PublishReceipt> {
        let url = self
            .endpoint(topic)
            .ok_or_else(|| ChannelError::UnknownTopic(topic.to_string()))?;

        let message_id = MessageId::new();
        let mut body = PushCodec.wrap(envelope, &message_id)?;
        body.subscription = Some(topic.to_string());

        let mut request = self.client.post(url).timeout(self.timeout).json(&body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChannelError::publish_failed(topic, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::publish_failed(
                topic,
                format!("endpoint answered {status}"),
            ));
        }

        info!(%message_id, "published event");
        Ok(PublishReceipt::new(message_id, topic))
    }
}
