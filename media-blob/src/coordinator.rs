use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{info, instrument, warn};

use crate::error::within;
use crate::{
    BlobConfig, BlobError, BlobResult, FinalizedObject, MediaObjectStore, MultipartSession, PartPlan, PartReceipt,
    SessionState, SignedParts, SignedUrlIssuer, Stage, UploadCoordinator, UploadIntent,
};

/// Coordinator backed by a store speaking the multipart protocol natively
pub struct DefaultUploadCoordinator {
    store: Arc<dyn MediaObjectStore>,
    signer: SignedUrlIssuer,
    config: BlobConfig,
}

impl DefaultUploadCoordinator {
    pub fn new<S>(store: Arc<S>, config: BlobConfig) -> Self
    where
        S: MediaObjectStore + 'static,
    {
        let signer = SignedUrlIssuer::new(store.clone(), config.url_expiry, config.request_timeout);
        Self { store, signer, config }
    }

    pub fn signer(&self) -> &SignedUrlIssuer {
        &self.signer
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// Check receipts against `1..=n` before anything touches the store.
    fn ordered_receipts(session: &MultipartSession, receipts: &[PartReceipt]) -> BlobResult<Vec<PartReceipt>> {
        let mut seen = BTreeSet::new();
        for receipt in receipts {
            if receipt.part_number == 0 {
                return Err(BlobError::PartOutOfRange {
                    part_number: 0,
                    part_count: session.part_count(),
                });
            }
            if receipt.integrity_token.trim().is_empty() {
                return Err(BlobError::invalid(format!(
                    "part {} has an empty integrity token",
                    receipt.part_number
                )));
            }
            if !seen.insert(receipt.part_number) {
                return Err(BlobError::DuplicatePart {
                    part_number: receipt.part_number,
                });
            }
        }

        let part_count = session.part_count();

        if let Some(beyond) = seen.iter().find(|n| **n > part_count) {
            return Err(BlobError::PartOutOfRange {
                part_number: *beyond,
                part_count,
            });
        }

        let missing: Vec<u32> = (1..=part_count).filter(|n| !seen.contains(n)).collect();
        if !missing.is_empty() {
            return Err(BlobError::IncompleteParts { missing });
        }

        let mut ordered = receipts.to_vec();
        ordered.sort_by_key(|r| r.part_number);
        Ok(ordered)
    }
}

#[async_trait]
impl UploadCoordinator for DefaultUploadCoordinator {
    fn plan_parts(&self, size_bytes: u64, part_size: u64) -> BlobResult<PartPlan> {
        if size_bytes > self.config.max_blob_bytes {
            return Err(BlobError::invalid(format!(
                "size {} exceeds the limit of {} bytes",
                size_bytes, self.config.max_blob_bytes
            )));
        }

        let plan = PartPlan::new(size_bytes, part_size)?;
        let caps = self.store.capabilities();

        if plan.part_count > 1 {
            if let Some(min) = caps.min_part_size {
                if part_size < min {
                    return Err(BlobError::invalid(format!(
                        "part size {part_size} is below the store minimum of {min}"
                    )));
                }
            }
        }
        if let Some(max) = caps.max_part_size {
            if part_size > max {
                return Err(BlobError::invalid(format!(
                    "part size {part_size} exceeds the store maximum of {max}"
                )));
            }
        }

        let max_parts = caps
            .max_parts
            .map_or(self.config.upload_rules.max_parts, |m| m.min(self.config.upload_rules.max_parts));
        if plan.part_count > max_parts {
            return Err(BlobError::invalid(format!(
                "{} parts exceed the limit of {}",
                plan.part_count, max_parts
            )));
        }

        Ok(plan)
    }

    #[instrument(skip(self, intent), fields(key = %intent.key, size = intent.size_bytes))]
    async fn initiate(&self, intent: &UploadIntent) -> BlobResult<MultipartSession> {
        if intent.bucket.trim().is_empty() {
            return Err(BlobError::invalid("bucket must not be empty"));
        }
        if !intent.key.is_qualified() {
            return Err(BlobError::invalid(format!("key is not fully qualified: {}", intent.key)));
        }
        let plan = self.plan_parts(intent.size_bytes, self.config.upload_rules.part_size)?;

        let key = intent.key.to_string();
        let upload_id = within(
            self.config.request_timeout,
            Stage::Initiate,
            &key,
            self.store.create_multipart(&intent.bucket, &key, &intent.content_type),
        )
        .await?;

        if upload_id.as_str().trim().is_empty() {
            return Err(BlobError::store_message(Stage::Initiate, key, "store returned an empty upload id"));
        }

        info!(upload_id = %upload_id, parts = plan.part_count, "multipart upload initiated");
        Ok(MultipartSession::opened(
            upload_id,
            intent.bucket.clone(),
            intent.key.clone(),
            plan,
        ))
    }

    #[instrument(skip(self, session), fields(upload_id = %session.upload_id(), key = %session.key()))]
    async fn sign_parts(&self, session: &mut MultipartSession, part_count: u32) -> BlobResult<SignedParts> {
        if session.state() == SessionState::Finalized {
            return Err(BlobError::session_closed(session.upload_id().as_str()));
        }
        if part_count == 0 {
            return Err(BlobError::invalid("part count must be at least 1"));
        }
        let expected = session.part_count();
        if expected != part_count {
            return Err(BlobError::invalid(format!(
                "session was planned for {expected} parts, not {part_count}"
            )));
        }

        let window = self.signer.window();
        let signer = &self.signer;
        let bucket = session.bucket();
        let key = session.key();
        let upload_id = session.upload_id();

        let urls = try_join_all((1..=part_count).map(|part_number| async move {
            signer
                .issue_part_url(bucket, key, upload_id, part_number, &window)
                .await
                .map(|url| (part_number, url))
        }))
        .await?;

        session.mark_signed();
        Ok(SignedParts {
            urls: urls.into_iter().collect(),
            expires_at: window.expires_at(),
        })
    }

    #[instrument(skip(self, session, receipts), fields(upload_id = %session.upload_id(), key = %session.key()))]
    async fn finalize(
        &self,
        session: &mut MultipartSession,
        receipts: &[PartReceipt],
    ) -> BlobResult<FinalizedObject> {
        match session.state() {
            SessionState::Finalized => return Err(BlobError::session_closed(session.upload_id().as_str())),
            SessionState::Initiated => return Err(BlobError::invalid("parts were never signed for this session")),
            SessionState::PartsSigned => {}
        }

        let ordered = Self::ordered_receipts(session, receipts)?;
        let key = session.key().to_string();

        let etag = within(
            self.config.request_timeout,
            Stage::Complete,
            &key,
            self.store
                .complete_multipart(session.bucket(), &key, session.upload_id(), &ordered),
        )
        .await?;

        // Client-declared sizes are advisory; the store is authoritative.
        let head = within(
            self.config.request_timeout,
            Stage::Head,
            &key,
            self.store.head(session.bucket(), &key),
        )
        .await?;

        session.mark_finalized();

        let domain = self.store.public_domain(session.bucket()).trim_end_matches('/').to_string();
        let url = format!("{domain}/{key}");
        info!(size = head.size_bytes, %url, "multipart upload finalized");

        Ok(FinalizedObject {
            key: session.key().clone(),
            url,
            domain,
            size_bytes: head.size_bytes,
            etag: etag.or(head.etag),
        })
    }

    #[instrument(skip(self, session), fields(upload_id = %session.upload_id(), key = %session.key()))]
    async fn abort(&self, session: &MultipartSession) -> BlobResult<()> {
        if session.state() == SessionState::Finalized {
            return Err(BlobError::session_closed(session.upload_id().as_str()));
        }
        let key = session.key().to_string();
        let result = within(
            self.config.request_timeout,
            Stage::Abort,
            &key,
            self.store.abort_multipart(session.bucket(), &key, session.upload_id()),
        )
        .await;

        if let Err(err) = &result {
            warn!(error = %err, "multipart abort failed");
        }
        result
    }
}
