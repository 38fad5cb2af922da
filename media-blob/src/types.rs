use std::collections::BTreeMap;
use std::ops::{Range, RangeInclusive};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{BlobError, BlobResult, MediaKey};

/// Opaque multipart upload identifier, issued by the object store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(pub String);

impl UploadId {
    /// Generate a new random upload ID (used by stores that mint their own)
    pub fn new() -> Self {
        Self(format!("upl_{}", Uuid::new_v4().simple()))
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Put,
}

impl HttpVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Put => "PUT",
        }
    }
}

/// How a size is cut into parts. All parts but the last are exactly `part_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartPlan {
    pub size_bytes: u64,
    pub part_size: u64,
    pub part_count: u32,
}

impl PartPlan {
    pub fn new(size_bytes: u64, part_size: u64) -> BlobResult<Self> {
        if size_bytes == 0 {
            return Err(BlobError::invalid("size must be greater than zero"));
        }
        if part_size == 0 {
            return Err(BlobError::invalid("part size must be greater than zero"));
        }
        let part_count = u32::try_from(size_bytes.div_ceil(part_size))
            .map_err(|_| BlobError::invalid("too many parts"))?;

        Ok(Self {
            size_bytes,
            part_size,
            part_count,
        })
    }

    pub fn part_numbers(&self) -> RangeInclusive<u32> {
        1..=self.part_count
    }

    /// Byte range of a 1-based part, `None` outside `1..=part_count`.
    pub fn byte_range(&self, part_number: u32) -> Option<Range<u64>> {
        if part_number == 0 || part_number > self.part_count {
            return None;
        }
        let start = u64::from(part_number - 1) * self.part_size;
        let end = (start + self.part_size).min(self.size_bytes);
        Some(start..end)
    }

    pub fn part_len(&self, part_number: u32) -> Option<u64> {
        self.byte_range(part_number).map(|r| r.end - r.start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initiated,
    PartsSigned,
    Finalized,
}

/// One multipart upload attempt. Only obtainable from `initiate` or `resume`.
#[derive(Debug, Clone)]
pub struct MultipartSession {
    upload_id: UploadId,
    bucket: String,
    key: MediaKey,
    plan: Option<PartPlan>,
    expected_parts: u32,
    state: SessionState,
}

impl MultipartSession {
    pub(crate) fn opened(upload_id: UploadId, bucket: String, key: MediaKey, plan: PartPlan) -> Self {
        Self {
            upload_id,
            bucket,
            key,
            expected_parts: plan.part_count,
            plan: Some(plan),
            state: SessionState::Initiated,
        }
    }

    /// Rebuild a session whose parts were signed by an earlier request.
    pub fn resume(
        upload_id: impl Into<String>,
        bucket: impl Into<String>,
        key: &str,
        expected_parts: u32,
    ) -> BlobResult<Self> {
        let upload_id = upload_id.into();
        let bucket = bucket.into();
        if upload_id.trim().is_empty() {
            return Err(BlobError::invalid("uploadId must not be empty"));
        }
        if bucket.trim().is_empty() {
            return Err(BlobError::invalid("bucket must not be empty"));
        }
        if expected_parts == 0 {
            return Err(BlobError::invalid("partsCount must be at least 1"));
        }
        let key = MediaKey::from_str(key)?;

        Ok(Self {
            upload_id: UploadId::from_string(upload_id),
            bucket,
            key,
            plan: None,
            expected_parts,
            state: SessionState::PartsSigned,
        })
    }

    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &MediaKey {
        &self.key
    }

    pub fn content_type(&self) -> &str {
        &self.key.content_type
    }

    pub fn plan(&self) -> Option<&PartPlan> {
        self.plan.as_ref()
    }

    pub fn part_count(&self) -> u32 {
        self.expected_parts
    }

    pub fn part_size(&self) -> Option<u64> {
        self.plan.map(|p| p.part_size)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn mark_signed(&mut self) {
        self.state = SessionState::PartsSigned;
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.state = SessionState::Finalized;
    }
}

/// Store-issued proof that one part arrived intact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartReceipt {
    pub part_number: u32,
    pub integrity_token: String,
}

impl PartReceipt {
    pub fn new(part_number: u32, integrity_token: impl Into<String>) -> Self {
        Self {
            part_number,
            integrity_token: integrity_token.into(),
        }
    }
}

/// Start and length of a signing window shared by a batch of URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningWindow {
    pub starts_at: DateTime<Utc>,
    pub expires_in: Duration,
}

impl SigningWindow {
    pub fn starting_now(expires_in: Duration) -> Self {
        Self {
            starts_at: Utc::now(),
            expires_in,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.starts_at + chrono::Duration::from_std(self.expires_in).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub verb: HttpVerb,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedParts {
    pub urls: BTreeMap<u32, String>,
    pub expires_at: DateTime<Utc>,
}

/// Object assembled and read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedObject {
    pub key: MediaKey,
    pub url: String,
    pub domain: String,
    pub size_bytes: u64,
    pub etag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_last_part_is_shorter() {
        let plan = PartPlan::new(12_000_000, 5_000_000).unwrap();
        assert_eq!(plan.part_count, 3);
        assert_eq!(plan.part_len(1), Some(5_000_000));
        assert_eq!(plan.part_len(2), Some(5_000_000));
        assert_eq!(plan.part_len(3), Some(2_000_000));
        assert_eq!(plan.byte_range(3), Some(10_000_000..12_000_000));
        assert_eq!(plan.byte_range(0), None);
        assert_eq!(plan.byte_range(4), None);
    }

    #[test]
    fn plan_rejects_zero_sizes() {
        assert!(PartPlan::new(0, 5).is_err());
        assert!(PartPlan::new(5, 0).is_err());
    }

    #[test]
    fn resume_validates_inputs() {
        let key = "profiles/u1/media/date/image/jpeg/abc/a.jpg";
        let session = MultipartSession::resume("up-1", "bucket", key, 3).unwrap();
        assert_eq!(session.state(), SessionState::PartsSigned);
        assert_eq!(session.part_count(), 3);
        assert_eq!(session.content_type(), "image/jpeg");

        assert!(MultipartSession::resume("", "bucket", key, 3).is_err());
        assert!(MultipartSession::resume("up-1", "bucket", "a.jpg", 3).is_err());
        assert!(MultipartSession::resume("up-1", "bucket", key, 0).is_err());
    }

    #[test]
    fn signing_window_expiry() {
        let window = SigningWindow::starting_now(Duration::from_secs(600));
        assert_eq!((window.expires_at() - window.starts_at).num_seconds(), 600);
    }
}
