//! In-process object store speaking the same multipart protocol as S3.
//!
//! Signed URLs look like
//! `memory://{bucket}/object?key=..&uploadId=..&partNumber=..&expires=..`
//! and are honoured by [`MemoryObjectStore::accept_signed_put`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{
    BlobError, BlobResult, HttpVerb, MultipartObjectStore, ObjectHead, ObjectStore, PartReceipt,
    SignedUrlObjectStore, SigningWindow, Stage, StoreCapabilities, TransferClient, UploadId,
};
use crate::transfer::signed_url_target;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: String,
    etag: String,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    content_type: String,
    parts: BTreeMap<u32, (Bytes, String)>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<(String, String), StoredObject>,
    uploads: HashMap<String, PendingUpload>,
}

#[derive(Debug)]
pub struct MemoryObjectStore {
    state: RwLock<State>,
    min_part_size: u64,
    domain: Option<String>,
    complete_calls: AtomicUsize,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn etag_of(bytes: &[u8]) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, bytes).simple().to_string()
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            min_part_size: 5 * 1024 * 1024,
            domain: None,
            complete_calls: AtomicUsize::new(0),
        }
    }

    /// Smallest non-final part accepted by `complete_multipart`.
    pub fn with_min_part_size(mut self, bytes: u64) -> Self {
        self.min_part_size = bytes;
        self
    }

    /// Public domain for every bucket, instead of `memory://{bucket}`.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Store an object directly, bypassing signed URLs.
    pub fn put_object(&self, bucket: &str, key: &str, content_type: &str, bytes: Bytes) -> String {
        let etag = etag_of(&bytes);
        self.state.write().objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                etag: etag.clone(),
            },
        );
        etag
    }

    pub fn read_object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.state
            .read()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.bytes.clone())
    }

    /// Resolve a public URL produced by this store back to its bytes.
    pub fn read_public_url(&self, url: &str) -> Option<(Bytes, String)> {
        let state = self.state.read();
        state.objects.iter().find_map(|((bucket, key), object)| {
            let public = format!("{}/{}", self.public_domain(bucket), key);
            (public == url).then(|| (object.bytes.clone(), object.content_type.clone()))
        })
    }

    pub fn object_count(&self) -> usize {
        self.state.read().objects.len()
    }

    pub fn pending_uploads(&self) -> usize {
        self.state.read().uploads.len()
    }

    /// Number of `complete_multipart` calls that reached the store.
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    fn signed_url(bucket: &str, params: &[(&str, String)]) -> BlobResult<String> {
        let mut url = url::Url::parse(&format!("memory://{bucket}/object"))
            .map_err(|e| BlobError::store(Stage::Sign, bucket, e))?;
        url.query_pairs_mut().extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url.to_string())
    }

    /// Honour a PUT against a URL signed by this store. Returns the ETag.
    pub fn accept_signed_put(&self, signed: &str, body: Bytes, content_type: &str) -> BlobResult<String> {
        let url = url::Url::parse(signed).map_err(|e| BlobError::store(Stage::Transfer, signed_url_target(signed), e))?;
        let bucket = url
            .host_str()
            .ok_or_else(|| BlobError::invalid("signed url has no bucket"))?
            .to_string();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        let key = params
            .get("key")
            .cloned()
            .ok_or_else(|| BlobError::invalid("signed url has no key"))?;
        let expires: i64 = params
            .get("expires")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| BlobError::invalid("signed url has no expiry"))?;
        if Utc::now().timestamp() > expires {
            return Err(BlobError::store_message(Stage::Transfer, key, "signed url expired"));
        }

        match (params.get("uploadId"), params.get("partNumber")) {
            (Some(upload_id), Some(part_number)) => {
                let part_number: u32 = part_number
                    .parse()
                    .map_err(|_| BlobError::invalid("bad part number in signed url"))?;
                let mut state = self.state.write();
                let upload = state
                    .uploads
                    .get_mut(upload_id)
                    .ok_or_else(|| BlobError::session_closed(upload_id.clone()))?;
                if upload.key != key || upload.bucket != bucket {
                    return Err(BlobError::store_message(Stage::Transfer, key, "signature does not match upload"));
                }
                let etag = etag_of(&body);
                upload.parts.insert(part_number, (body, etag.clone()));
                Ok(etag)
            }
            _ => {
                if params.get("verb").map(String::as_str) != Some(HttpVerb::Put.as_str()) {
                    return Err(BlobError::store_message(Stage::Transfer, key, "url was not signed for PUT"));
                }
                Ok(self.put_object(&bucket, &key, content_type, body))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic()
            .with_multipart(Some(self.min_part_size), None, Some(10_000))
            .with_signed_urls()
    }

    fn public_domain(&self, bucket: &str) -> String {
        match &self.domain {
            Some(domain) => domain.trim_end_matches('/').to_string(),
            None => format!("memory://{bucket}"),
        }
    }

    async fn head(&self, bucket: &str, key: &str) -> BlobResult<ObjectHead> {
        let state = self.state.read();
        let object = state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| BlobError::not_found(key))?;
        Ok(ObjectHead {
            size_bytes: object.bytes.len() as u64,
            content_type: Some(object.content_type.clone()),
            etag: Some(object.etag.clone()),
        })
    }
}

#[async_trait]
impl MultipartObjectStore for MemoryObjectStore {
    async fn create_multipart(&self, bucket: &str, key: &str, content_type: &str) -> BlobResult<UploadId> {
        let upload_id = UploadId::new();
        self.state.write().uploads.insert(
            upload_id.as_str().to_string(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: &[PartReceipt],
    ) -> BlobResult<Option<String>> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write();

        let upload = state
            .uploads
            .get(upload_id.as_str())
            .ok_or_else(|| BlobError::session_closed(upload_id.as_str()))?;
        if upload.bucket != bucket || upload.key != key {
            return Err(BlobError::store_message(Stage::Complete, key, "upload id belongs to another object"));
        }

        let mut assembled = BytesMut::new();
        for (index, receipt) in parts.iter().enumerate() {
            let (bytes, etag) = upload.parts.get(&receipt.part_number).ok_or_else(|| {
                BlobError::store_message(Stage::Complete, key, format!("part {} was never uploaded", receipt.part_number))
            })?;
            if *etag != receipt.integrity_token {
                return Err(BlobError::store_message(
                    Stage::Complete,
                    key,
                    format!("part {} integrity token mismatch", receipt.part_number),
                ));
            }
            let is_last = index + 1 == parts.len();
            if !is_last && (bytes.len() as u64) < self.min_part_size {
                return Err(BlobError::store_message(
                    Stage::Complete,
                    key,
                    format!("part {} is smaller than the minimum part size", receipt.part_number),
                ));
            }
            assembled.extend_from_slice(bytes);
        }

        let content_type = upload.content_type.clone();
        state.uploads.remove(upload_id.as_str());

        let bytes = assembled.freeze();
        let etag = format!("{}-{}", etag_of(&bytes), parts.len());
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes,
                content_type,
                etag: etag.clone(),
            },
        );
        Ok(Some(etag))
    }

    async fn abort_multipart(&self, _bucket: &str, _key: &str, upload_id: &UploadId) -> BlobResult<()> {
        self.state
            .write()
            .uploads
            .remove(upload_id.as_str())
            .map(|_| ())
            .ok_or_else(|| BlobError::session_closed(upload_id.as_str()))
    }
}

#[async_trait]
impl SignedUrlObjectStore for MemoryObjectStore {
    async fn presign_object(
        &self,
        bucket: &str,
        key: &str,
        verb: HttpVerb,
        _content_type: Option<&str>,
        window: &SigningWindow,
    ) -> BlobResult<String> {
        Self::signed_url(
            bucket,
            &[
                ("key", key.to_string()),
                ("verb", verb.as_str().to_string()),
                ("expires", window.expires_at().timestamp().to_string()),
            ],
        )
    }

    async fn presign_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        window: &SigningWindow,
    ) -> BlobResult<String> {
        Self::signed_url(
            bucket,
            &[
                ("key", key.to_string()),
                ("uploadId", upload_id.as_str().to_string()),
                ("partNumber", part_number.to_string()),
                ("expires", window.expires_at().timestamp().to_string()),
            ],
        )
    }
}

/// Transfer client that PUTs straight into a [`MemoryObjectStore`].
pub struct MemoryTransferClient {
    store: Arc<MemoryObjectStore>,
    fail_parts: HashSet<u32>,
}

impl MemoryTransferClient {
    pub fn new(store: Arc<MemoryObjectStore>) -> Self {
        Self {
            store,
            fail_parts: HashSet::new(),
        }
    }

    /// Make transfers of the given part numbers fail.
    pub fn failing_parts(mut self, parts: impl IntoIterator<Item = u32>) -> Self {
        self.fail_parts.extend(parts);
        self
    }
}

#[async_trait]
impl TransferClient for MemoryTransferClient {
    async fn put_part(&self, url: &str, body: Bytes, content_type: &str) -> BlobResult<String> {
        let part_number = url::Url::parse(url)
            .ok()
            .and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k == "partNumber")
                    .and_then(|(_, v)| v.parse::<u32>().ok())
            });
        if let Some(n) = part_number {
            if self.fail_parts.contains(&n) {
                return Err(BlobError::store_message(
                    Stage::Transfer,
                    signed_url_target(url),
                    format!("injected failure for part {n}"),
                ));
            }
        }
        self.store.accept_signed_put(url, body, content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_rejects_small_non_final_parts() {
        let store = MemoryObjectStore::new().with_min_part_size(4);
        let upload_id = store.create_multipart("b", "k", "image/jpeg").await.unwrap();
        let window = SigningWindow::starting_now(std::time::Duration::from_secs(60));

        let mut receipts = Vec::new();
        for (n, chunk) in [(1u32, "ab"), (2, "cdef")] {
            let url = store.presign_part("b", "k", &upload_id, n, &window).await.unwrap();
            let etag = store
                .accept_signed_put(&url, Bytes::from_static(chunk.as_bytes()), "image/jpeg")
                .unwrap();
            receipts.push(PartReceipt::new(n, etag));
        }

        let err = store.complete_multipart("b", "k", &upload_id, &receipts).await.unwrap_err();
        assert!(matches!(err, BlobError::Store { stage: Stage::Complete, .. }));
        assert_eq!(store.pending_uploads(), 1);
    }

    #[tokio::test]
    async fn signed_object_put_stores_bytes() {
        let store = MemoryObjectStore::new().with_domain("https://cdn.example.com/");
        let window = SigningWindow::starting_now(std::time::Duration::from_secs(60));
        let url = store
            .presign_object("b", "p/a.jpg", HttpVerb::Put, Some("image/jpeg"), &window)
            .await
            .unwrap();

        store
            .accept_signed_put(&url, Bytes::from_static(b"jpeg"), "image/jpeg")
            .unwrap();

        assert_eq!(store.read_object("b", "p/a.jpg"), Some(Bytes::from_static(b"jpeg")));
        let (bytes, content_type) = store.read_public_url("https://cdn.example.com/p/a.jpg").unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn get_urls_cannot_be_used_for_puts() {
        let store = MemoryObjectStore::new();
        let window = SigningWindow::starting_now(std::time::Duration::from_secs(60));
        let url = store
            .presign_object("b", "p/a.jpg", HttpVerb::Get, None, &window)
            .await
            .unwrap();

        assert!(store.accept_signed_put(&url, Bytes::from_static(b"x"), "image/jpeg").is_err());
        assert_eq!(store.object_count(), 0);
    }
}
