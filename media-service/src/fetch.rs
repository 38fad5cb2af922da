use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use media_blob::MemoryObjectStore;

/// Downloads the bytes behind a media record's URL
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;

        response.bytes().await.with_context(|| format!("reading body of {url}"))
    }
}

/// Reads objects straight out of an in-memory store by their public URL
pub struct MemoryFetcher {
    store: Arc<MemoryObjectStore>,
}

impl MemoryFetcher {
    pub fn new(store: Arc<MemoryObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SourceFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.store
            .read_public_url(url)
            .map(|(bytes, _)| bytes)
            .ok_or_else(|| anyhow!("no object behind {url}"))
    }
}
