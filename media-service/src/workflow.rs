//! Blurred-derivative generation, triggered by `derive-blur` events.
//!
//! Every step after the source lookup is a pure function of the source or
//! an idempotent write, so a redelivered event can rerun the whole workflow:
//! the derivative key is stable per (source, transform), the record store is
//! unique on URL and subject linkage is an upsert.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use media_blob::{BlobError, MediaKey};
use media_queue::{EventChannel, EventEnvelope, EventHandler, HandleError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::fetch::SourceFetcher;
use crate::records::{MediaRecord, NewMediaRecord};
use crate::service::MediaService;
use crate::subjects::SubjectMediaStore;
use crate::transform::MediaTransform;

pub const DERIVE_BLUR: &str = "derive-blur";
pub const DERIVE_BLUR_LEGACY: &str = "blurImage";
pub const DERIVATIVE_READY: &str = "derivative-ready";
pub const IMAGE_BLURRED: &str = "imageBlurred";

/// Payload of a `derive-blur` event. Either spelling of each key is accepted,
/// and both may be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DeriveBlurKeys")]
pub struct DeriveBlur {
    #[serde(rename = "mediaID")]
    pub media_id: String,

    #[serde(rename = "subjectID", skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

#[derive(Deserialize)]
struct DeriveBlurKeys {
    #[serde(rename = "mediaID", default)]
    media_id: Option<String>,
    #[serde(rename = "imageID", default)]
    image_id: Option<String>,
    #[serde(rename = "subjectID", default)]
    subject_id: Option<String>,
    #[serde(rename = "profileID", default)]
    profile_id: Option<String>,
}

fn first_present(keys: [Option<String>; 2]) -> Option<String> {
    keys.into_iter().flatten().find(|v| !v.trim().is_empty())
}

impl TryFrom<DeriveBlurKeys> for DeriveBlur {
    type Error = String;

    fn try_from(keys: DeriveBlurKeys) -> Result<Self, Self::Error> {
        let media_id = first_present([keys.media_id, keys.image_id])
            .ok_or_else(|| "mediaID (or imageID) is required".to_string())?;
        Ok(Self {
            media_id,
            subject_id: first_present([keys.subject_id, keys.profile_id]),
        })
    }
}

/// Payload of the follow-up `derivative-ready` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeReady {
    #[serde(rename = "mediaID")]
    pub media_id: String,

    #[serde(rename = "derivativeID")]
    pub derivative_id: String,

    #[serde(rename = "subjectID", default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

impl DerivativeReady {
    pub fn new(media_id: &str, derivative_id: &str, subject_id: Option<&str>) -> Self {
        Self {
            media_id: media_id.to_string(),
            derivative_id: derivative_id.to_string(),
            subject_id: subject_id.map(str::to_string),
        }
    }
}

/// `imageBlurred`, as profile services consuming the older contract expect it.
/// Only sent when a subject is known: those consumers require `profileID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBlurred {
    #[serde(rename = "mediaID")]
    pub media_id: String,

    #[serde(rename = "blurredImageID")]
    pub blurred_image_id: String,

    #[serde(rename = "profileID")]
    pub profile_id: String,
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Source media not found: {0}")]
    SourceNotFound(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Source layout not recognised: {0}")]
    SourceLayout(String),

    #[error("Record store failed: {0}")]
    Records(String),

    #[error("Fetching source failed: {0}")]
    Fetch(String),

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Derivative upload failed: {0}")]
    Upload(#[from] BlobError),

    #[error("Linking derivative failed: {0}")]
    Link(String),
}

impl WorkflowError {
    /// Whether redelivering the triggering event could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SourceNotFound(_) | Self::InvalidEvent(_) | Self::SourceLayout(_) | Self::Transform(_) => false,
            Self::Upload(err) => err.is_transient(),
            Self::Records(_) | Self::Fetch(_) | Self::Link(_) => true,
        }
    }

    pub fn step(&self) -> &'static str {
        match self {
            Self::SourceNotFound(_) | Self::Records(_) => "resolve-source",
            Self::InvalidEvent(_) => "decode",
            Self::SourceLayout(_) => "derive-key",
            Self::Fetch(_) => "fetch",
            Self::Transform(_) => "transform",
            Self::Upload(_) => "upload",
            Self::Link(_) => "link",
        }
    }
}

impl From<WorkflowError> for HandleError {
    fn from(err: WorkflowError) -> Self {
        if err.is_retryable() {
            HandleError::retryable(err.to_string())
        } else {
            HandleError::permanent(err.to_string())
        }
    }
}

/// What one run produced
#[derive(Debug, Clone)]
pub struct DerivativeOutcome {
    pub source_id: String,
    pub derivative: MediaRecord,
    /// False when an earlier delivery already created the record
    pub created: bool,
    pub notified: bool,
}

pub struct DerivativeWorkflow {
    media: Arc<MediaService>,
    subjects: Arc<dyn SubjectMediaStore>,
    fetcher: Arc<dyn SourceFetcher>,
    transform: Arc<dyn MediaTransform>,
    channel: Arc<dyn EventChannel>,
    notify_topic: String,
}

impl DerivativeWorkflow {
    pub fn new(
        media: Arc<MediaService>,
        subjects: Arc<dyn SubjectMediaStore>,
        fetcher: Arc<dyn SourceFetcher>,
        transform: Arc<dyn MediaTransform>,
        channel: Arc<dyn EventChannel>,
        notify_topic: impl Into<String>,
    ) -> Self {
        Self {
            media,
            subjects,
            fetcher,
            transform,
            channel,
            notify_topic: notify_topic.into(),
        }
    }

    /// Produce (or find) the derivative of `media_id` and link it to `subject_id`.
    #[instrument(skip(self), fields(transform = self.transform.name()))]
    pub async fn run(&self, media_id: &str, subject_id: Option<&str>) -> Result<DerivativeOutcome, WorkflowError> {
        let records = self.media.records();

        let source = records
            .get(media_id)
            .await
            .map_err(|e| WorkflowError::Records(e.to_string()))?
            .ok_or_else(|| WorkflowError::SourceNotFound(media_id.to_string()))?;

        let source_key = MediaKey::from_str(&format!("{}/{}", source.storage_path, source.file_name))
            .map_err(|e| WorkflowError::SourceLayout(e.to_string()))?;
        let derived_key = self
            .media
            .keys()
            .derived_key(&source_key, self.transform.output_content_type(), self.transform.name())
            .map_err(|e| WorkflowError::SourceLayout(e.to_string()))?;

        let original = self
            .fetcher
            .fetch(&source.url)
            .await
            .map_err(|e| WorkflowError::Fetch(format!("{e:#}")))?;

        let derived = self
            .transform
            .apply(original)
            .await
            .map_err(|e| WorkflowError::Transform(format!("{e:#}")))?;

        let object = self.media.upload_bytes(derived_key, derived).await?;

        let outcome = records
            .create_or_get(NewMediaRecord::from_finalized(&object))
            .await
            .map_err(|e| WorkflowError::Records(e.to_string()))?;
        let created = outcome.was_created();
        let derivative = outcome.into_record();

        if let Some(subject_id) = subject_id {
            self.subjects
                .link_derivative(subject_id, &source.id, &derivative.id)
                .await
                .map_err(|e| WorkflowError::Link(e.to_string()))?;
        }

        let notified = self.notify(&source.id, &derivative.id, subject_id).await;

        info!(derivative_id = %derivative.id, created, notified, "derivative ready");
        Ok(DerivativeOutcome {
            source_id: source.id,
            derivative,
            created,
            notified,
        })
    }

    /// Publish `derivative-ready`, plus `imageBlurred` when a subject is known.
    /// Losing either is tolerated: the derivative is already stored and linked.
    async fn notify(&self, media_id: &str, derivative_id: &str, subject_id: Option<&str>) -> bool {
        let ready = self
            .publish(DERIVATIVE_READY, &DerivativeReady::new(media_id, derivative_id, subject_id))
            .await;

        let legacy = match subject_id {
            Some(profile_id) => {
                let payload = ImageBlurred {
                    media_id: media_id.to_string(),
                    blurred_image_id: derivative_id.to_string(),
                    profile_id: profile_id.to_string(),
                };
                self.publish(IMAGE_BLURRED, &payload).await
            }
            None => true,
        };

        ready && legacy
    }

    async fn publish<T: Serialize>(&self, event_type: &str, payload: &T) -> bool {
        let envelope = match EventEnvelope::from_payload(event_type, payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(event_type, error = %err, "could not encode notification");
                return false;
            }
        };

        match self.channel.publish(&self.notify_topic, &envelope).await {
            Ok(receipt) => {
                info!(event_type, message_id = %receipt.message_id, topic = %receipt.topic, "notification published");
                true
            }
            Err(err) => {
                warn!(event_type, error = %err, topic = %self.notify_topic, "notification lost");
                false
            }
        }
    }
}

#[async_trait]
impl EventHandler for DerivativeWorkflow {
    type Event = DeriveBlur;

    const EVENT_TYPE: &'static str = DERIVE_BLUR;
    const ALIASES: &'static [&'static str] = &[DERIVE_BLUR_LEGACY];

    async fn handle(&self, event: DeriveBlur) -> Result<(), HandleError> {
        let subject_id = event
            .subject_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| WorkflowError::InvalidEvent("subjectID is required".to_string()))
            .map_err(|err| {
                warn!(media_id = %event.media_id, error = %err, "rejecting derive-blur event");
                HandleError::from(err)
            })?;

        match self.run(&event.media_id, Some(subject_id)).await {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(
                    media_id = %event.media_id,
                    subject_id,
                    step = err.step(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "derivative workflow failed"
                );
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derive_blur_accepts_legacy_keys() {
        let current: DeriveBlur = serde_json::from_value(json!({"mediaID": "m", "subjectID": "s"})).unwrap();
        let legacy: DeriveBlur = serde_json::from_value(json!({"imageID": "m", "profileID": "s"})).unwrap();
        assert_eq!(current, legacy);

        let bare: DeriveBlur = serde_json::from_value(json!({"imageID": "m"})).unwrap();
        assert_eq!(bare.subject_id, None);
    }

    #[test]
    fn derive_blur_accepts_both_spellings_at_once() {
        let both: DeriveBlur = serde_json::from_value(json!({
            "mediaID": "m",
            "imageID": "m",
            "subjectID": "s",
            "profileID": "s"
        }))
        .unwrap();
        assert_eq!(both.media_id, "m");
        assert_eq!(both.subject_id.as_deref(), Some("s"));

        let blank_current: DeriveBlur =
            serde_json::from_value(json!({"mediaID": "", "imageID": "m", "profileID": "s"})).unwrap();
        assert_eq!(blank_current.media_id, "m");

        assert!(serde_json::from_value::<DeriveBlur>(json!({"subjectID": "s"})).is_err());
    }

    #[test]
    fn follow_up_payloads() {
        let ready = serde_json::to_value(DerivativeReady::new("m", "d", Some("p"))).unwrap();
        assert_eq!(ready, json!({"mediaID": "m", "derivativeID": "d", "subjectID": "p"}));

        let legacy = serde_json::to_value(ImageBlurred {
            media_id: "m".to_string(),
            blurred_image_id: "d".to_string(),
            profile_id: "p".to_string(),
        })
        .unwrap();
        assert_eq!(legacy, json!({"mediaID": "m", "blurredImageID": "d", "profileID": "p"}));
    }

    #[test]
    fn error_classification() {
        assert!(!WorkflowError::SourceNotFound("m".into()).is_retryable());
        assert!(!WorkflowError::Transform("bad".into()).is_retryable());
        assert!(WorkflowError::Fetch("reset".into()).is_retryable());
        assert!(WorkflowError::Link("down".into()).is_retryable());
        assert!(!WorkflowError::Upload(BlobError::invalid("x")).is_retryable());

        let handled: HandleError = WorkflowError::Fetch("reset".into()).into();
        assert!(handled.is_retryable());
    }
}
