use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_core::{EntityKind, EntityRegistry, MediaError, TimestampPolicy};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One source media entry in a subject's media list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaLink {
    pub media_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivative_id: Option<String>,
}

/// The owning entity (e.g. a profile) whose media list carries derivative links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMedia {
    pub subject_id: String,
    pub media: Vec<MediaLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SubjectMedia {
    pub fn derivative_of(&self, media_id: &str) -> Option<&str> {
        self.media
            .iter()
            .find(|link| link.media_id == media_id)
            .and_then(|link| link.derivative_id.as_deref())
    }
}

#[async_trait]
pub trait SubjectMediaStore: Send + Sync {
    async fn get(&self, subject_id: &str) -> Result<Option<SubjectMedia>>;

    /// Point `source_id`'s entry at `derivative_id`, creating the subject
    /// or the entry when missing. Re-linking the same pair is a no-op.
    async fn link_derivative(&self, subject_id: &str, source_id: &str, derivative_id: &str) -> Result<SubjectMedia>;
}

pub struct MemorySubjectMediaStore {
    timestamps: TimestampPolicy,
    rows: RwLock<HashMap<String, SubjectMedia>>,
}

impl MemorySubjectMediaStore {
    pub fn new(registry: &EntityRegistry) -> Result<Self> {
        let spec = registry.get(EntityKind::SubjectMedia).ok_or_else(|| {
            MediaError::general_error("entity registry has no subject media layout")
                .with_code("media/config/missing-entity")
                .into_anyhow()
        })?;
        Ok(Self {
            timestamps: spec.timestamps,
            rows: RwLock::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl SubjectMediaStore for MemorySubjectMediaStore {
    async fn get(&self, subject_id: &str) -> Result<Option<SubjectMedia>> {
        Ok(self.rows.read().get(subject_id).cloned())
    }

    async fn link_derivative(&self, subject_id: &str, source_id: &str, derivative_id: &str) -> Result<SubjectMedia> {
        let now = Utc::now();
        let mut rows = self.rows.write();
        let subject = rows.entry(subject_id.to_string()).or_insert_with(|| SubjectMedia {
            subject_id: subject_id.to_string(),
            media: Vec::new(),
            created_at: now,
            updated_at: None,
        });

        let changed = match subject.media.iter_mut().find(|link| link.media_id == source_id) {
            Some(link) if link.derivative_id.as_deref() == Some(derivative_id) => false,
            Some(link) => {
                link.derivative_id = Some(derivative_id.to_string());
                true
            }
            None => {
                subject.media.push(MediaLink {
                    media_id: source_id.to_string(),
                    derivative_id: Some(derivative_id.to_string()),
                });
                true
            }
        };

        if changed && self.timestamps == TimestampPolicy::CreatedAndUpdated {
            subject.updated_at = Some(now);
        }
        Ok(subject.clone())
    }
}
