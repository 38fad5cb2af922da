use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::transfer::TransferReport;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Which store interaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sign,
    Initiate,
    SignPart,
    Complete,
    Head,
    Transfer,
    Abort,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Sign => "sign",
            Stage::Initiate => "initiate",
            Stage::SignPart => "sign-part",
            Stage::Complete => "complete",
            Stage::Head => "head",
            Stage::Transfer => "transfer",
            Stage::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during upload coordination
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    #[error("Incomplete parts: missing {missing:?}")]
    IncompleteParts { missing: Vec<u32> },

    #[error("Duplicate receipt for part {part_number}")]
    DuplicatePart { part_number: u32 },

    #[error("Part {part_number} is outside 1..={part_count}")]
    PartOutOfRange { part_number: u32, part_count: u32 },

    #[error("Upload session closed: {upload_id}")]
    SessionClosed { upload_id: String },

    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Store failed during {stage} for {key}: {source}")]
    Store {
        stage: Stage,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Timed out after {after:?} during {stage} for {key}")]
    Timeout { stage: Stage, key: String, after: Duration },

    #[error("Part transfer failed for {key}: parts {:?} failed", .report.failed_parts())]
    PartsFailed { key: String, report: TransferReport },
}

impl BlobError {
    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn unsupported_content_type<S: Into<String>>(content_type: S) -> Self {
        Self::UnsupportedContentType {
            content_type: content_type.into(),
        }
    }

    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn session_closed<S: Into<String>>(upload_id: S) -> Self {
        Self::SessionClosed {
            upload_id: upload_id.into(),
        }
    }

    /// Wrap a backend error with the stage and key it happened on
    pub fn store<E>(stage: Stage, key: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store {
            stage,
            key: key.into(),
            source: Box::new(error),
        }
    }

    /// Store failure described only by a message (e.g. a missing response field)
    pub fn store_message(stage: Stage, key: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Store {
            stage,
            key: key.into(),
            source: message.into(),
        }
    }

    /// Failures a caller may reasonably retry as-is (transport, store, deadline).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BlobError::Store { .. } | BlobError::Timeout { .. } | BlobError::PartsFailed { .. }
        )
    }

    /// Stage of a store-side failure, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            BlobError::Store { stage, .. } | BlobError::Timeout { stage, .. } => Some(*stage),
            BlobError::PartsFailed { .. } => Some(Stage::Transfer),
            _ => None,
        }
    }
}

/// Run a store call under a request deadline.
pub(crate) async fn within<T, F>(deadline: Duration, stage: Stage, key: &str, fut: F) -> BlobResult<T>
where
    F: Future<Output = BlobResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(BlobError::Timeout {
            stage,
            key: key.to_string(),
            after: deadline,
        }),
    }
}
