//! media-core: transport-agnostic building blocks shared by the media pipeline.
//!
//! - [`MediaError`]: structured error with HTTP status, class name and a stable code
//! - [`MediaConfig`]: dotted key/value configuration with environment overlay
//! - [`EntityRegistry`]: static persistence layout consulted by record stores

pub mod config;
pub mod errors;
pub mod registry;

pub use config::{MediaConfig, MediaConfigSnapshot};
pub use errors::{ErrorKind, MediaError, MediaResult};
pub use registry::{EntityKind, EntityRegistry, EntitySpec, IndexSpec, TimestampPolicy};
