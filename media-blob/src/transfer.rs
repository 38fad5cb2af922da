use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use reqwest::header::{CONTENT_TYPE, ETAG};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::store::sanitize_etag;
use crate::{BlobError, BlobResult, PartPlan, PartReceipt, Stage};

/// Moves one part's bytes to its signed URL and returns the integrity token.
///
/// The URL is a bearer credential until it expires: errors name the target
/// through [`signed_url_target`], never the URL itself.
#[async_trait]
pub trait TransferClient: Send + Sync {
    async fn put_part(&self, url: &str, body: Bytes, content_type: &str) -> BlobResult<String>;
}

/// Object path and part number of a signed URL, with the signed query dropped.
pub fn signed_url_target(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let path = format!("{}{}", parsed.host_str().unwrap_or_default(), parsed.path());
            let part = parsed
                .query_pairs()
                .find(|(k, _)| k == "partNumber")
                .map(|(_, v)| v.into_owned());
            match part {
                Some(n) => format!("{path} (part {n})"),
                None => path,
            }
        }
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

/// Plain HTTP PUT against presigned URLs
#[derive(Clone)]
pub struct HttpTransferClient {
    client: reqwest::Client,
}

impl HttpTransferClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransferClient for HttpTransferClient {
    async fn put_part(&self, url: &str, body: Bytes, content_type: &str) -> BlobResult<String> {
        let target = signed_url_target(url);
        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| BlobError::store(Stage::Transfer, &target, e.without_url()))?;

        let response = response
            .error_for_status()
            .map_err(|e| BlobError::store(Stage::Transfer, &target, e.without_url()))?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok());

        sanitize_etag(etag)
            .ok_or_else(|| BlobError::store_message(Stage::Transfer, &target, "response carried no ETag"))
    }
}

/// Per-part outcome of a batch transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub receipts: BTreeMap<u32, String>,
    pub failures: BTreeMap<u32, String>,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_parts(&self) -> Vec<u32> {
        self.failures.keys().copied().collect()
    }

    pub fn total(&self) -> usize {
        self.receipts.len() + self.failures.len()
    }

    pub fn part_receipts(&self) -> Vec<PartReceipt> {
        self.receipts
            .iter()
            .map(|(n, token)| PartReceipt::new(*n, token.clone()))
            .collect()
    }
}

/// Concurrent, bounded part uploads for backend-driven transfers
#[derive(Clone)]
pub struct PartTransferExecutor {
    client: Arc<dyn TransferClient>,
    max_in_flight: usize,
    part_timeout: Duration,
}

impl PartTransferExecutor {
    pub fn new(client: Arc<dyn TransferClient>, max_in_flight: usize, part_timeout: Duration) -> Self {
        Self {
            client,
            max_in_flight: max_in_flight.max(1),
            part_timeout,
        }
    }

    /// Transfer every part and wait for all of them, successes and failures alike.
    #[instrument(skip(self, urls, payload), fields(parts = urls.len(), size = payload.len()))]
    pub async fn transfer_all(
        &self,
        urls: &BTreeMap<u32, String>,
        payload: Bytes,
        part_size: u64,
        content_type: &str,
    ) -> BlobResult<TransferReport> {
        let plan = PartPlan::new(payload.len() as u64, part_size)?;
        let expected: Vec<u32> = plan.part_numbers().collect();
        let supplied: Vec<u32> = urls.keys().copied().collect();
        if expected != supplied {
            return Err(BlobError::invalid(format!(
                "payload needs parts 1..={} but {} signed urls were supplied",
                plan.part_count,
                urls.len()
            )));
        }

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let transfers = urls.iter().map(|(part_number, url)| {
            let part_number = *part_number;
            let range = plan.byte_range(part_number).unwrap_or(0..0);
            let body = payload.slice(range.start as usize..range.end as usize);
            let semaphore = semaphore.clone();
            let client = self.client.clone();
            let deadline = self.part_timeout;

            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (part_number, Err(e.to_string())),
                };
                let outcome = match tokio::time::timeout(deadline, client.put_part(url, body, content_type)).await {
                    Ok(Ok(token)) if !token.trim().is_empty() => Ok(token),
                    Ok(Ok(_)) => Err("empty integrity token".to_string()),
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(_) => Err(format!("timed out after {deadline:?}")),
                };
                (part_number, outcome)
            }
        });

        let mut report = TransferReport::default();
        for (part_number, outcome) in join_all(transfers).await {
            match outcome {
                Ok(token) => {
                    debug!(part_number, "part transferred");
                    report.receipts.insert(part_number, token);
                }
                Err(reason) => {
                    warn!(part_number, %reason, "part transfer failed");
                    report.failures.insert(part_number, reason);
                }
            }
        }
        Ok(report)
    }

    /// Upload all parts; fails with the full per-part report if any part lacks a token.
    pub async fn upload_parts(
        &self,
        key: &str,
        urls: &BTreeMap<u32, String>,
        payload: Bytes,
        part_size: u64,
        content_type: &str,
    ) -> BlobResult<BTreeMap<u32, String>> {
        let report = self.transfer_all(urls, payload, part_size, content_type).await?;
        if report.is_complete() {
            Ok(report.receipts)
        } else {
            Err(BlobError::PartsFailed {
                key: key.to_string(),
                report,
            })
        }
    }
}
