//! media-axum: HTTP surface of the media pipeline.
//!
//! Routes the client upload flow, the single signed URL, the push endpoint
//! for inbound events and the internal derive trigger onto a [`MediaApp`].
//! Errors leave as structured JSON via [`MediaAxumError`].
//!
//! [`MediaApp`]: media_service::MediaApp

pub mod app;
pub mod auth;
pub mod routes;
pub mod state;
mod error;

pub use app::{axum, media_router, MediaAxum};
pub use auth::{trust_owner_header, AuthContext, OWNER_HEADER};
pub use error::MediaAxumError;
pub use state::MediaAxumState;
