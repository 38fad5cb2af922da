use thiserror::Error;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Infrastructure errors for publishing and decoding events
#[derive(Error, Debug, Clone)]
pub enum ChannelError {
    #[error("No endpoint configured for topic: {0}")]
    UnknownTopic(String),

    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Event type already registered: {0}")]
    DuplicateHandler(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ChannelError {
    pub fn publish_failed(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Handler outcome - determines whether the transport redelivers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// Retryable error - leave the message for redelivery
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - acknowledge and drop
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl HandleError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}
