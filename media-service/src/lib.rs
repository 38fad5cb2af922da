//! Media upload service and blurred-derivative workflow.
//!
//! [`MediaService`] serves the client-driven path (initiate, complete,
//! single signed URL) and the backend-driven `upload_bytes` path.
//! [`DerivativeWorkflow`] is the `derive-blur` event handler. [`MediaApp`]
//! builds both from [`MediaSettings`] with explicit dependency injection.

pub mod app;
pub mod errors;
pub mod fetch;
pub mod records;
pub mod service;
pub mod settings;
pub mod subjects;
pub mod transform;
pub mod workflow;

pub use app::{AppParts, MediaApp, MemoryHandles};
pub use errors::blob_failure;
pub use fetch::{HttpFetcher, MemoryFetcher, SourceFetcher};
pub use records::{MediaRecord, MediaRecordStore, MemoryMediaRecordStore, NewMediaRecord, RecordOutcome};
pub use service::{CompleteUpload, MediaService, SignedUpload, UploadRequest, UploadTicket};
pub use settings::MediaSettings;
pub use subjects::{MediaLink, MemorySubjectMediaStore, SubjectMedia, SubjectMediaStore};
pub use transform::{BlurTransform, MediaTransform};
pub use workflow::{
    DeriveBlur, DerivativeOutcome, DerivativeReady, DerivativeWorkflow, ImageBlurred, WorkflowError,
    DERIVATIVE_READY, DERIVE_BLUR, DERIVE_BLUR_LEGACY, IMAGE_BLURRED,
};
