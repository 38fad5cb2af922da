use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::within;
use crate::{
    BlobError, BlobResult, HttpVerb, MediaKey, SignedUrl, SignedUrlObjectStore, SigningWindow, Stage, UploadId,
};

/// S3 refuses presigned URLs valid for longer than a week.
const MAX_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Issues single-action, time-bounded URLs. Never alters the key it signs.
#[derive(Clone)]
pub struct SignedUrlIssuer {
    store: Arc<dyn SignedUrlObjectStore>,
    expiry: Duration,
    request_timeout: Duration,
}

impl SignedUrlIssuer {
    pub fn new(store: Arc<dyn SignedUrlObjectStore>, expiry: Duration, request_timeout: Duration) -> Self {
        Self {
            store,
            expiry,
            request_timeout,
        }
    }

    /// Default URL lifetime.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// A window using the default lifetime, starting now.
    pub fn window(&self) -> SigningWindow {
        SigningWindow::starting_now(self.expiry)
    }

    pub async fn issue_object_url(
        &self,
        bucket: &str,
        key: &MediaKey,
        verb: HttpVerb,
        content_type: Option<&str>,
        window: &SigningWindow,
    ) -> BlobResult<SignedUrl> {
        let key_str = Self::check(bucket, key, window)?;

        let raw = within(
            self.request_timeout,
            Stage::Sign,
            &key_str,
            self.store.presign_object(bucket, &key_str, verb, content_type, window),
        )
        .await?;
        let url = Self::checked_url(Stage::Sign, &key_str, raw)?;
        debug!(key = %key_str, verb = verb.as_str(), "signed object url");

        Ok(SignedUrl {
            url,
            verb,
            expires_at: window.expires_at(),
        })
    }

    pub async fn issue_part_url(
        &self,
        bucket: &str,
        key: &MediaKey,
        upload_id: &UploadId,
        part_number: u32,
        window: &SigningWindow,
    ) -> BlobResult<String> {
        let key_str = Self::check(bucket, key, window)?;
        if upload_id.as_str().trim().is_empty() {
            return Err(BlobError::invalid("uploadId must not be empty"));
        }
        if part_number == 0 {
            return Err(BlobError::invalid("part numbers start at 1"));
        }

        let raw = within(
            self.request_timeout,
            Stage::SignPart,
            &key_str,
            self.store.presign_part(bucket, &key_str, upload_id, part_number, window),
        )
        .await?;
        Self::checked_url(Stage::SignPart, &key_str, raw)
    }

    fn check(bucket: &str, key: &MediaKey, window: &SigningWindow) -> BlobResult<String> {
        if bucket.trim().is_empty() {
            return Err(BlobError::invalid("bucket must not be empty"));
        }
        if !key.is_qualified() {
            return Err(BlobError::invalid(format!("key is not fully qualified: {key}")));
        }
        if window.expires_in.is_zero() || window.expires_in > MAX_URL_EXPIRY {
            return Err(BlobError::invalid(format!(
                "url expiry must be between 1s and {}s",
                MAX_URL_EXPIRY.as_secs()
            )));
        }
        Ok(key.to_string())
    }

    fn checked_url(stage: Stage, key: &str, raw: String) -> BlobResult<String> {
        match url::Url::parse(&raw) {
            Ok(_) => Ok(raw),
            Err(err) => Err(BlobError::store(stage, key, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefaultKeyStrategy, MediaKeyStrategy, MemoryObjectStore, MultipartObjectStore};

    fn issuer(store: Arc<MemoryObjectStore>) -> SignedUrlIssuer {
        SignedUrlIssuer::new(store, Duration::from_secs(600), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn object_url_keeps_key_and_expiry() {
        let store = Arc::new(MemoryObjectStore::new());
        let signer = issuer(store);
        let key = DefaultKeyStrategy::default()
            .object_key("u1", "profile", "image/jpeg", "a.jpg")
            .unwrap();
        let window = signer.window();

        let signed = signer
            .issue_object_url("bucket", &key, HttpVerb::Put, Some("image/jpeg"), &window)
            .await
            .unwrap();

        assert_eq!(signed.verb, HttpVerb::Put);
        assert_eq!(signed.expires_at, window.expires_at());
        let parsed = url::Url::parse(&signed.url).unwrap();
        let signed_key = parsed.query_pairs().find(|(k, _)| k == "key").map(|(_, v)| v.into_owned());
        assert_eq!(signed_key, Some(key.to_string()));
    }

    #[tokio::test]
    async fn rejects_unqualified_keys_and_empty_inputs() {
        let store = Arc::new(MemoryObjectStore::new());
        let signer = issuer(store.clone());
        let mut key: MediaKey = "profiles/u1/media/date/image/jpeg/abc/a.jpg".parse().unwrap();
        let window = signer.window();

        assert!(signer
            .issue_object_url("", &key, HttpVerb::Get, None, &window)
            .await
            .is_err());

        let upload_id = store.create_multipart("bucket", &key.to_string(), "image/jpeg").await.unwrap();
        assert!(signer
            .issue_part_url("bucket", &key, &upload_id, 0, &window)
            .await
            .is_err());

        key.file_name = "a".to_string();
        let err = signer
            .issue_object_url("bucket", &key, HttpVerb::Get, None, &window)
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Invalid { .. }));
    }

    #[tokio::test]
    async fn rejects_out_of_range_expiry() {
        let store = Arc::new(MemoryObjectStore::new());
        let signer = issuer(store);
        let key: MediaKey = "profiles/u1/media/date/image/jpeg/abc/a.jpg".parse().unwrap();

        let window = SigningWindow::starting_now(Duration::ZERO);
        assert!(signer
            .issue_object_url("bucket", &key, HttpVerb::Get, None, &window)
            .await
            .is_err());
    }
}
