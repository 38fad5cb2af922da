use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use media_blob::FinalizedObject;
use media_core::{EntityKind, EntityRegistry, EntitySpec, MediaError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata of one finalized object. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub id: String,
    pub url: String,
    pub extension: String,
    pub content_type: String,
    pub storage_path: String,
    pub storage_domain: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Fields of a record about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMediaRecord {
    pub url: String,
    pub extension: String,
    pub content_type: String,
    pub storage_path: String,
    pub storage_domain: String,
    pub file_name: String,
    pub size_bytes: u64,
}

impl NewMediaRecord {
    pub fn from_finalized(object: &FinalizedObject) -> Self {
        Self {
            url: object.url.clone(),
            extension: object.key.extension().unwrap_or_default().to_string(),
            content_type: object.key.content_type.clone(),
            storage_path: object.key.storage_path(),
            storage_domain: object.domain.clone(),
            file_name: object.key.file_name.clone(),
            size_bytes: object.size_bytes,
        }
    }
}

/// Result of an idempotent create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Created(MediaRecord),
    Existing(MediaRecord),
}

impl RecordOutcome {
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn record(&self) -> &MediaRecord {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }

    pub fn into_record(self) -> MediaRecord {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }
}

/// Persistence boundary for media records
#[async_trait]
pub trait MediaRecordStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<MediaRecord>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<MediaRecord>>;

    /// Create the record unless one with the same unique fields exists,
    /// in which case the existing record is returned. Atomic per store.
    async fn create_or_get(&self, record: NewMediaRecord) -> Result<RecordOutcome>;
}

fn unique_value(record: &NewMediaRecord, field: &str) -> Option<String> {
    match field {
        "url" => Some(record.url.clone()),
        "storage_path" => Some(record.storage_path.clone()),
        _ => None,
    }
}

#[derive(Default)]
struct MediaTable {
    rows: HashMap<String, MediaRecord>,
    unique: HashMap<(&'static str, String), String>,
}

/// In-memory record store honouring the registry's unique indexes
pub struct MemoryMediaRecordStore {
    spec: EntitySpec,
    table: RwLock<MediaTable>,
}

impl MemoryMediaRecordStore {
    pub fn new(registry: &EntityRegistry) -> Result<Self> {
        let spec = registry.get(EntityKind::Media).cloned().ok_or_else(|| {
            MediaError::general_error("entity registry has no media layout")
                .with_code("media/config/missing-entity")
                .into_anyhow()
        })?;
        Ok(Self {
            spec,
            table: RwLock::new(MediaTable::default()),
        })
    }

    pub fn storage_name(&self) -> &'static str {
        self.spec.storage_name
    }

    pub fn len(&self) -> usize {
        self.table.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MediaRecordStore for MemoryMediaRecordStore {
    async fn get(&self, id: &str) -> Result<Option<MediaRecord>> {
        Ok(self.table.read().rows.get(id).cloned())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<MediaRecord>> {
        let table = self.table.read();
        if self.spec.is_unique("url") {
            let id = table.unique.get(&("url", url.to_string()));
            return Ok(id.and_then(|id| table.rows.get(id)).cloned());
        }
        Ok(table.rows.values().find(|r| r.url == url).cloned())
    }

    async fn create_or_get(&self, record: NewMediaRecord) -> Result<RecordOutcome> {
        let mut table = self.table.write();

        let keys: Vec<(&'static str, String)> = self
            .spec
            .unique_fields()
            .filter_map(|field| unique_value(&record, field).map(|v| (field, v)))
            .collect();

        for key in &keys {
            if let Some(existing) = table.unique.get(key).and_then(|id| table.rows.get(id)) {
                return Ok(RecordOutcome::Existing(existing.clone()));
            }
        }

        let created = MediaRecord {
            id: Uuid::new_v4().to_string(),
            url: record.url,
            extension: record.extension,
            content_type: record.content_type,
            storage_path: record.storage_path,
            storage_domain: record.storage_domain,
            file_name: record.file_name,
            size_bytes: record.size_bytes,
            created_at: Utc::now(),
        };
        for key in keys {
            table.unique.insert(key, created.id.clone());
        }
        table.rows.insert(created.id.clone(), created.clone());
        Ok(RecordOutcome::Created(created))
    }
}
