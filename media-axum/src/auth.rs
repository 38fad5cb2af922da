//! Caller identity.
//!
//! Authentication happens upstream. Whatever sits in front of the router puts
//! an [`AuthContext`] into the request extensions; handlers extract it and get
//! a 401 when it is absent.

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use media_core::MediaError;

use crate::MediaAxumError;

pub const OWNER_HEADER: &str = "x-owner-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub owner_id: String,
}

impl AuthContext {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
        }
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = MediaAxumError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .filter(|ctx| !ctx.owner_id.trim().is_empty())
            .cloned()
            .ok_or_else(|| MediaError::not_authenticated("Authentication required").into())
    }
}

/// Lift `x-owner-id` into an [`AuthContext`]. Only installed behind a gateway
/// that strips the header from outside traffic.
pub async fn trust_owner_header(mut req: Request, next: Next) -> Response {
    let owner = req
        .headers()
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(AuthContext::new);

    if let Some(ctx) = owner {
        req.extensions_mut().insert(ctx);
    }
    next.run(req).await
}
