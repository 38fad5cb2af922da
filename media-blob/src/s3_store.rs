use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;

use crate::store::sanitize_etag;
use crate::{
    BlobError, BlobResult, HttpVerb, MultipartObjectStore, ObjectHead, ObjectStore, PartReceipt,
    SignedUrlObjectStore, SigningWindow, Stage, StoreCapabilities, UploadId,
};

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
    pub public_domain: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            public_domain: None,
        }
    }
}

/// Object store backed by the AWS SDK
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    config: S3Config,
}

impl S3Store {
    /// Build the client once; credentials fall back to the default AWS chain.
    pub async fn connect(config: S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                "media-static",
            ));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let shared = loader.load().await;
        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&shared)
                .force_path_style(config.force_path_style)
                .build(),
        );

        Self { client, config }
    }

    pub fn with_client(client: Client, config: S3Config) -> Self {
        Self { client, config }
    }

    fn presigning(window: &SigningWindow, key: &str, stage: Stage) -> BlobResult<PresigningConfig> {
        PresigningConfig::builder()
            .start_time(SystemTime::from(window.starts_at))
            .expires_in(window.expires_in)
            .build()
            .map_err(|e| BlobError::store(stage, key, e))
    }

    fn map_upload_error<E>(stage: Stage, key: &str, upload_id: &UploadId, err: E) -> BlobError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        if err.code() == Some("NoSuchUpload") {
            BlobError::session_closed(upload_id.as_str())
        } else {
            BlobError::store(stage, key, err)
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic()
            .with_multipart(Some(5 * 1024 * 1024), Some(5 * 1024 * 1024 * 1024), Some(10_000))
            .with_signed_urls()
    }

    fn public_domain(&self, bucket: &str) -> String {
        if let Some(domain) = &self.config.public_domain {
            return domain.trim_end_matches('/').to_string();
        }
        match &self.config.endpoint_url {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", bucket, self.config.region),
        }
    }

    async fn head(&self, bucket: &str, key: &str) -> BlobResult<ObjectHead> {
        let result = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let not_found = err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false);
                if not_found {
                    BlobError::not_found(key)
                } else {
                    BlobError::store(Stage::Head, key, err)
                }
            })?;

        Ok(ObjectHead {
            size_bytes: result.content_length().unwrap_or(0).max(0) as u64,
            content_type: result.content_type().map(str::to_string),
            etag: sanitize_etag(result.e_tag()),
        })
    }
}

#[async_trait]
impl MultipartObjectStore for S3Store {
    async fn create_multipart(&self, bucket: &str, key: &str, content_type: &str) -> BlobResult<UploadId> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobError::store(Stage::Initiate, key, e))?;

        output
            .upload_id()
            .map(|id| UploadId::from_string(id.to_string()))
            .ok_or_else(|| BlobError::store_message(Stage::Initiate, key, "CreateMultipartUpload returned no upload id"))
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        parts: &[PartReceipt],
    ) -> BlobResult<Option<String>> {
        let mut completed = Vec::with_capacity(parts.len());
        for part in parts {
            let part_number = i32::try_from(part.part_number)
                .map_err(|_| BlobError::invalid(format!("part number {} out of range", part.part_number)))?;
            completed.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(part.integrity_token.clone())
                    .build(),
            );
        }

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(completed)).build())
            .send()
            .await
            .map_err(|e| Self::map_upload_error(Stage::Complete, key, upload_id, e))?;

        Ok(sanitize_etag(output.e_tag()))
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &UploadId) -> BlobResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .send()
            .await
            .map_err(|e| Self::map_upload_error(Stage::Abort, key, upload_id, e))?;
        Ok(())
    }
}

#[async_trait]
impl SignedUrlObjectStore for S3Store {
    async fn presign_object(
        &self,
        bucket: &str,
        key: &str,
        verb: HttpVerb,
        content_type: Option<&str>,
        window: &SigningWindow,
    ) -> BlobResult<String> {
        let config = Self::presigning(window, key, Stage::Sign)?;

        let presigned = match verb {
            HttpVerb::Get => self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .presigned(config)
                .await
                .map_err(|e| BlobError::store(Stage::Sign, key, e))?,
            HttpVerb::Put => {
                let mut request = self.client.put_object().bucket(bucket).key(key);
                if let Some(ct) = content_type {
                    request = request.content_type(ct);
                }
                request
                    .presigned(config)
                    .await
                    .map_err(|e| BlobError::store(Stage::Sign, key, e))?
            }
        };

        Ok(presigned.uri().to_string())
    }

    async fn presign_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        window: &SigningWindow,
    ) -> BlobResult<String> {
        let config = Self::presigning(window, key, Stage::SignPart)?;
        let part_number = i32::try_from(part_number)
            .map_err(|_| BlobError::invalid(format!("part number {part_number} out of range")))?;

        let presigned = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id.as_str())
            .part_number(part_number)
            .presigned(config)
            .await
            .map_err(|e| BlobError::store(Stage::SignPart, key, e))?;

        Ok(presigned.uri().to_string())
    }
}
