use async_trait::async_trait;

use crate::{
    BlobError, BlobResult, FinalizedObject, MediaKey, MediaKeyStrategy, MultipartSession, PartPlan, PartReceipt,
    SignedParts,
};

/// Owns the multipart lifecycle: initiate, plan, sign, finalize
#[async_trait]
pub trait UploadCoordinator: Send + Sync {
    /// Cut `size_bytes` into parts, enforcing store and rule limits
    fn plan_parts(&self, size_bytes: u64, part_size: u64) -> BlobResult<PartPlan>;

    /// Open a multipart upload for the intent
    async fn initiate(&self, intent: &UploadIntent) -> BlobResult<MultipartSession>;

    /// One signed part URL per part number in `1..=part_count`, sharing one expiry
    async fn sign_parts(&self, session: &mut MultipartSession, part_count: u32) -> BlobResult<SignedParts>;

    /// Assemble the object and read back its authoritative size
    async fn finalize(
        &self,
        session: &mut MultipartSession,
        receipts: &[PartReceipt],
    ) -> BlobResult<FinalizedObject>;

    /// Discard an unfinished upload
    async fn abort(&self, session: &MultipartSession) -> BlobResult<()>;
}

/// Intent to upload one media object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadIntent {
    pub bucket: String,
    pub key: MediaKey,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub purpose: String,
    pub owner_id: String,
}

impl UploadIntent {
    /// Validate client input and build the object key. No store calls.
    pub fn prepare(
        keys: &dyn MediaKeyStrategy,
        bucket: &str,
        owner_id: &str,
        purpose: &str,
        file_name: &str,
        content_type: &str,
        size_bytes: u64,
    ) -> BlobResult<Self> {
        if bucket.trim().is_empty() {
            return Err(BlobError::invalid("bucket must not be empty"));
        }
        if size_bytes == 0 {
            return Err(BlobError::invalid("fileSize must be greater than zero"));
        }
        let key = keys.object_key(owner_id, purpose, content_type, file_name)?;
        Ok(Self::for_key(bucket, key, size_bytes))
    }

    /// Intent for an already-built key (derivatives).
    pub fn for_key(bucket: &str, key: MediaKey, size_bytes: u64) -> Self {
        Self {
            bucket: bucket.to_string(),
            file_name: key.file_name.clone(),
            content_type: key.content_type.clone(),
            purpose: key.purpose.clone(),
            owner_id: key.owner_id.clone(),
            key,
            size_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultKeyStrategy;

    #[test]
    fn prepare_fails_fast_on_bad_input() {
        let keys = DefaultKeyStrategy::default();
        assert!(UploadIntent::prepare(&keys, "b", "u1", "profile", "a.jpg", "image/jpeg", 0).is_err());
        assert!(UploadIntent::prepare(&keys, "", "u1", "profile", "a.jpg", "image/jpeg", 10).is_err());
        assert!(UploadIntent::prepare(&keys, "b", "u1", "profile", "a.jpg", "text/plain", 10).is_err());
    }

    #[test]
    fn prepare_copies_key_fields() {
        let keys = DefaultKeyStrategy::default();
        let intent = UploadIntent::prepare(&keys, "b", "u1", "profile", "a.jpeg", "image/jpeg", 10).unwrap();
        assert_eq!(intent.file_name, "a.jpg");
        assert_eq!(intent.content_type, "image/jpeg");
        assert_eq!(intent.owner_id, "u1");
        assert_eq!(intent.purpose, "profile");
    }
}
