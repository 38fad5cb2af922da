use async_trait::async_trait;

use crate::{BlobResult, HttpVerb, PartReceipt, SigningWindow, UploadId};

/// Operations every backing store provides
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get store capabilities
    fn capabilities(&self) -> StoreCapabilities;

    /// Base URL objects of `bucket` are publicly served from (no trailing slash)
    fn public_domain(&self, bucket: &str) -> String;

    /// Get object metadata without content
    async fn head(&self, bucket: &str, key: &str) -> BlobResult<ObjectHead>;
}

/// Multipart upload protocol
#[async_trait]
pub trait MultipartObjectStore: ObjectStore {
    /// Open a multipart upload; the returned id identifies the session
    async fn create_multipart(&self, bucket: &str, key: &str, content_type: &str) -> BlobResult<UploadId>;

    /// Assemble the object from parts, given in ascending part order
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: &[PartReceipt],
    ) -> BlobResult<Option<String>>;

    /// Abort a multipart upload and discard its parts
    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &UploadId) -> BlobResult<()>;
}

/// Time-bounded signed URLs
#[async_trait]
pub trait SignedUrlObjectStore: ObjectStore {
    /// Signed URL for one verb against one object
    async fn presign_object(
        &self,
        bucket: &str,
        key: &str,
        verb: HttpVerb,
        content_type: Option<&str>,
        window: &SigningWindow,
    ) -> BlobResult<String>;

    /// Signed PUT URL for one part of a multipart upload
    async fn presign_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        window: &SigningWindow,
    ) -> BlobResult<String>;
}

/// Everything the coordinator needs from a backing store
pub trait MediaObjectStore: MultipartObjectStore + SignedUrlObjectStore {}

impl<T> MediaObjectStore for T where T: MultipartObjectStore + SignedUrlObjectStore + ?Sized {}

/// Metadata about a stored object
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// Store capabilities
#[derive(Debug, Clone, Default)]
pub struct StoreCapabilities {
    pub supports_multipart: bool,
    pub supports_signed_urls: bool,
    pub min_part_size: Option<u64>,
    pub max_part_size: Option<u64>,
    pub max_parts: Option<u32>,
}

impl StoreCapabilities {
    pub fn basic() -> Self {
        Self::default()
    }

    pub fn with_multipart(mut self, min_size: Option<u64>, max_size: Option<u64>, max_parts: Option<u32>) -> Self {
        self.supports_multipart = true;
        self.min_part_size = min_size;
        self.max_part_size = max_size;
        self.max_parts = max_parts;
        self
    }

    pub fn with_signed_urls(mut self) -> Self {
        self.supports_signed_urls = true;
        self
    }
}

pub(crate) fn sanitize_etag(etag: Option<&str>) -> Option<String> {
    etag.map(|value| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
