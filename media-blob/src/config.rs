use std::time::Duration;

/// Configuration for upload coordination
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Absolute max size allowed for a single object (safety guard)
    pub max_blob_bytes: u64,

    /// Rules for part-based uploads
    pub upload_rules: UploadRules,

    /// Lifetime of every signed URL
    pub url_expiry: Duration,

    /// Deadline for each request/response call against the store
    pub request_timeout: Duration,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: 5 * 1024 * 1024 * 1024, // 5GB
            upload_rules: UploadRules::default(),
            url_expiry: Duration::from_secs(600),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Rules for multipart uploads
#[derive(Debug, Clone)]
pub struct UploadRules {
    /// Standard part size (bytes); every part but the last has exactly this size
    pub part_size: u64,

    /// Upper bound on parts per upload
    pub max_parts: u32,

    /// Concurrent part transfers for backend-driven uploads
    pub max_in_flight: usize,
}

impl Default for UploadRules {
    fn default() -> Self {
        Self {
            part_size: 5 * 1024 * 1024, // 5MiB
            max_parts: 10_000,
            max_in_flight: 8,
        }
    }
}

impl BlobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_blob_bytes(mut self, bytes: u64) -> Self {
        self.max_blob_bytes = bytes;
        self
    }

    pub fn with_upload_rules(mut self, rules: UploadRules) -> Self {
        self.upload_rules = rules;
        self
    }

    pub fn with_url_expiry(mut self, expiry: Duration) -> Self {
        self.url_expiry = expiry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl UploadRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_part_size(mut self, bytes: u64) -> Self {
        self.part_size = bytes;
        self
    }

    pub fn with_max_parts(mut self, max: u32) -> Self {
        self.max_parts = max;
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }
}
