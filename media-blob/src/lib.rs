//! # media-blob: multipart upload coordination for media objects
//!
//! `media-blob` turns an upload intent into a set of short-lived, per-part
//! signed URLs against an S3-compatible store, finalizes the assembled
//! object, and can drive the part transfers itself for backend uploads.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │  UploadCoordinator       │  ← initiate / plan / sign / finalize
//! ├────────────┬─────────────┤
//! │ SignedUrl  │ PartTransfer│  ← URLs for clients, PUTs for the backend
//! │ Issuer     │ Executor    │
//! ├────────────┴─────────────┤
//! │  MediaObjectStore        │  ← S3Store, MemoryObjectStore
//! └──────────────────────────┘
//! ```
//!
//! ## Client-driven upload
//!
//! ```rust
//! use std::sync::Arc;
//! use media_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let store = Arc::new(MemoryObjectStore::new());
//! let coordinator = DefaultUploadCoordinator::new(store, BlobConfig::default());
//!
//! let keys = DefaultKeyStrategy::default();
//! let intent = UploadIntent::prepare(&keys, "assets", "u1", "profile", "a.jpg", "image/jpeg", 1024)?;
//! let mut session = coordinator.initiate(&intent).await?;
//! let signed = coordinator.sign_parts(&mut session, 1).await?;
//! assert_eq!(signed.urls.len(), 1);
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod error;
mod keys;
mod memory;
mod s3_store;
mod signer;
pub mod store;
mod transfer;
mod types;
mod upload;

pub use config::{BlobConfig, UploadRules};
pub use coordinator::DefaultUploadCoordinator;
pub use error::{BlobError, BlobResult, Stage};
pub use keys::{extension_for, qualify_file_name, DefaultKeyStrategy, MediaKey, MediaKeyStrategy, DEFAULT_TENANT_PREFIX};
pub use memory::{MemoryObjectStore, MemoryTransferClient};
pub use s3_store::{S3Config, S3Store};
pub use signer::SignedUrlIssuer;
pub use store::{
    MediaObjectStore, MultipartObjectStore, ObjectHead, ObjectStore, SignedUrlObjectStore, StoreCapabilities,
};
pub use transfer::{signed_url_target, HttpTransferClient, PartTransferExecutor, TransferClient, TransferReport};
pub use types::{
    FinalizedObject, HttpVerb, MultipartSession, PartPlan, PartReceipt, SessionState, SignedParts, SignedUrl,
    SigningWindow, UploadId,
};
pub use upload::{UploadCoordinator, UploadIntent};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobConfig, BlobError, BlobResult, DefaultKeyStrategy, DefaultUploadCoordinator, MediaKeyStrategy,
        MemoryObjectStore, MultipartSession, PartReceipt, UploadCoordinator, UploadIntent,
    };
}
