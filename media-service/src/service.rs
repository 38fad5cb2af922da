use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use media_blob::{
    BlobError, BlobResult, DefaultUploadCoordinator, FinalizedObject, HttpVerb, MediaKey, MediaKeyStrategy,
    MultipartSession, PartReceipt, PartTransferExecutor, UploadCoordinator, UploadIntent,
};
use media_core::MediaError;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::errors::blob_failure;
use crate::records::{MediaRecord, MediaRecordStore, NewMediaRecord};

/// Client upload intent, shared by the multipart and single-URL paths
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub file_size: u64,
    pub purpose: String,
}

/// Everything a client needs to PUT its parts
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub upload_id: String,
    pub file_path: String,
    pub signed_urls: BTreeMap<u32, String>,
    pub expiry: DateTime<Utc>,
    pub parts_count: u32,
    pub part_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUpload {
    pub upload_id: String,
    #[serde(alias = "url")]
    pub file_path: String,
    pub parts: BTreeMap<u32, String>,
    /// `partsCount` from the ticket; receipts are checked against `1..=parts_count`
    pub parts_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUpload {
    pub signed_url: String,
    pub file_path: String,
    pub expiry: DateTime<Utc>,
}

/// Client-driven and backend-driven upload paths over one coordinator
pub struct MediaService {
    bucket: String,
    coordinator: Arc<DefaultUploadCoordinator>,
    keys: Arc<dyn MediaKeyStrategy>,
    records: Arc<dyn MediaRecordStore>,
    executor: PartTransferExecutor,
}

impl MediaService {
    pub fn new(
        bucket: impl Into<String>,
        coordinator: Arc<DefaultUploadCoordinator>,
        keys: Arc<dyn MediaKeyStrategy>,
        records: Arc<dyn MediaRecordStore>,
        executor: PartTransferExecutor,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            coordinator,
            keys,
            records,
            executor,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn keys(&self) -> &dyn MediaKeyStrategy {
        self.keys.as_ref()
    }

    pub fn records(&self) -> &Arc<dyn MediaRecordStore> {
        &self.records
    }

    fn prepare(&self, owner_id: &str, request: &UploadRequest) -> Result<UploadIntent> {
        UploadIntent::prepare(
            self.keys.as_ref(),
            &self.bucket,
            owner_id,
            &request.purpose,
            &request.file_name,
            &request.content_type,
            request.file_size,
        )
        .map_err(blob_failure)
    }

    /// Open a multipart upload and sign every part URL.
    #[instrument(skip(self, request), fields(content_type = %request.content_type, size = request.file_size))]
    pub async fn initiate_upload(&self, owner_id: &str, request: UploadRequest) -> Result<UploadTicket> {
        let intent = self.prepare(owner_id, &request)?;
        let mut session = self.coordinator.initiate(&intent).await.map_err(blob_failure)?;

        let plan = match session.plan() {
            Some(plan) => *plan,
            None => return Err(blob_failure(BlobError::invalid("initiated session has no part plan"))),
        };

        let signed = match self.coordinator.sign_parts(&mut session, plan.part_count).await {
            Ok(signed) => signed,
            Err(err) => {
                self.abort_quietly(&session).await;
                return Err(blob_failure(err));
            }
        };

        info!(upload_id = %session.upload_id(), parts = plan.part_count, "upload initiated");
        Ok(UploadTicket {
            upload_id: session.upload_id().to_string(),
            file_path: session.key().to_string(),
            signed_urls: signed.urls,
            expiry: signed.expires_at,
            parts_count: plan.part_count,
            part_size: plan.part_size,
        })
    }

    /// Finalize a client upload and create its record. No record exists before this succeeds.
    #[instrument(skip(self, request), fields(upload_id = %request.upload_id))]
    pub async fn complete_upload(&self, owner_id: &str, request: CompleteUpload) -> Result<MediaRecord> {
        let mut session =
            MultipartSession::resume(&request.upload_id, &self.bucket, &request.file_path, request.parts_count)
                .map_err(blob_failure)?;

        if session.key().owner_id != owner_id {
            return Err(MediaError::forbidden("upload belongs to another owner")
                .with_code("media/upload/not-owner")
                .into_anyhow());
        }

        let receipts: Vec<PartReceipt> = request
            .parts
            .into_iter()
            .map(|(part_number, token)| PartReceipt::new(part_number, token))
            .collect();

        let object = self
            .coordinator
            .finalize(&mut session, &receipts)
            .await
            .map_err(blob_failure)?;

        let record = self
            .records
            .create_or_get(NewMediaRecord::from_finalized(&object))
            .await?
            .into_record();
        info!(media_id = %record.id, size = record.size_bytes, "upload completed");
        Ok(record)
    }

    /// Sign a single-object PUT URL; no multipart session is opened.
    #[instrument(skip(self, request), fields(content_type = %request.content_type))]
    pub async fn issue_upload_url(&self, owner_id: &str, request: UploadRequest) -> Result<SignedUpload> {
        let intent = self.prepare(owner_id, &request)?;
        let max = self.coordinator.config().max_blob_bytes;
        if intent.size_bytes > max {
            return Err(blob_failure(BlobError::invalid(format!(
                "fileSize {} exceeds the {} byte limit",
                intent.size_bytes, max
            ))));
        }

        let signer = self.coordinator.signer();
        let signed = signer
            .issue_object_url(&self.bucket, &intent.key, HttpVerb::Put, Some(intent.content_type.as_str()), &signer.window())
            .await
            .map_err(blob_failure)?;

        Ok(SignedUpload {
            signed_url: signed.url,
            file_path: intent.key.to_string(),
            expiry: signed.expires_at,
        })
    }

    pub async fn get_media(&self, id: &str) -> Result<MediaRecord> {
        self.records.get(id).await?.ok_or_else(|| {
            MediaError::not_found(format!("media {id} not found"))
                .with_code("media/record/not-found")
                .into_anyhow()
        })
    }

    /// Backend-driven upload: initiate, sign, transfer every part, finalize.
    /// The session is aborted when signing or any part transfer fails.
    #[instrument(skip(self, key, payload), fields(key = %key, size = payload.len()))]
    pub async fn upload_bytes(&self, key: MediaKey, payload: Bytes) -> BlobResult<FinalizedObject> {
        let intent = UploadIntent::for_key(&self.bucket, key, payload.len() as u64);
        let mut session = self.coordinator.initiate(&intent).await?;
        let plan = match session.plan() {
            Some(plan) => *plan,
            None => return Err(BlobError::invalid("initiated session has no part plan")),
        };

        let signed = match self.coordinator.sign_parts(&mut session, plan.part_count).await {
            Ok(signed) => signed,
            Err(err) => {
                self.abort_quietly(&session).await;
                return Err(err);
            }
        };

        let key = intent.key.to_string();
        let tokens = match self
            .executor
            .upload_parts(&key, &signed.urls, payload, plan.part_size, &intent.content_type)
            .await
        {
            Ok(tokens) => tokens,
            Err(err) => {
                self.abort_quietly(&session).await;
                return Err(err);
            }
        };

        let receipts: Vec<PartReceipt> = tokens
            .into_iter()
            .map(|(part_number, token)| PartReceipt::new(part_number, token))
            .collect();
        self.coordinator.finalize(&mut session, &receipts).await
    }

    async fn abort_quietly(&self, session: &MultipartSession) {
        if self.coordinator.abort(session).await.is_err() {
            warn!(upload_id = %session.upload_id(), "leaving multipart upload for store lifecycle cleanup");
        }
    }
}
