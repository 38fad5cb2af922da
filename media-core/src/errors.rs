//! # Errors
//!
//! A structured error carried through `anyhow::Error`:
//! - consistent HTTP status codes + class names
//! - a stable, machine-readable `code` per failure (e.g. `media/upload/incomplete-parts`)
//! - transport-agnostic (the HTTP crate decides how to serialize)
//!
//! If you enable feature `serde`, you also get:
//! - `data` / `errors` as serde_json::Value
//! - `to_json()` helper

use std::fmt;

use anyhow::Error as AnyError;

/// A convenience result type for media core APIs.
pub type MediaResult<T> = std::result::Result<T, AnyError>;

/// Failure classes understood by every transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotAuthenticated,
    Forbidden,
    NotFound,
    Timeout,
    Gone,
    Unprocessable,
    GeneralError,
    BadGateway,
    Unavailable,
}

/// (status, name, class name, fallback code)
type KindInfo = (u16, &'static str, &'static str, &'static str);

impl ErrorKind {
    fn info(&self) -> KindInfo {
        match self {
            Self::BadRequest => (400, "BadRequest", "bad-request", "media/request/invalid"),
            Self::NotAuthenticated => (401, "NotAuthenticated", "not-authenticated", "media/auth/missing"),
            Self::Forbidden => (403, "Forbidden", "forbidden", "media/auth/forbidden"),
            Self::NotFound => (404, "NotFound", "not-found", "media/not-found"),
            Self::Timeout => (408, "Timeout", "timeout", "media/timeout"),
            Self::Gone => (410, "Gone", "gone", "media/gone"),
            Self::Unprocessable => (422, "Unprocessable", "unprocessable", "media/request/unprocessable"),
            Self::GeneralError => (500, "GeneralError", "general-error", "media/internal"),
            Self::BadGateway => (502, "BadGateway", "bad-gateway", "media/storage/bad-gateway"),
            Self::Unavailable => (503, "Unavailable", "unavailable", "media/unavailable"),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.info().0
    }

    /// Error `name` (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        self.info().1
    }

    /// Error `className` (kebab-cased)
    pub fn class_name(&self) -> &'static str {
        self.info().2
    }

    /// Stable code used when a constructor did not set one.
    fn default_code(&self) -> &'static str {
        self.info().3
    }

    /// 5xx kinds: the caller may retry the same request.
    pub fn is_server_side(&self) -> bool {
        self.status_code() >= 500
    }
}

#[cfg(feature = "serde")]
pub type ErrorValue = serde_json::Value;

#[cfg(not(feature = "serde"))]
pub type ErrorValue = std::sync::Arc<dyn std::any::Any + Send + Sync>;

/// A structured media error that can live inside `anyhow::Error`.
///
/// Fields:
/// - name / class_name / status (from `kind`)
/// - code (stable, never reworded once published)
/// - message
/// - data (optional)
/// - errors (optional)
#[derive(Debug)]
pub struct MediaError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub data: Option<ErrorValue>,
    pub errors: Option<ErrorValue>,
    pub source: Option<AnyError>,
}

impl MediaError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.default_code().to_string(),
            message: message.into(),
            data: None,
            errors: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_data(mut self, data: ErrorValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_errors(mut self, errors: ErrorValue) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn status(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Convert into `anyhow::Error` so it flows through `?` in application code.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Find a `MediaError` anywhere in an `anyhow::Error` chain.
    pub fn from_anyhow(err: &AnyError) -> Option<&MediaError> {
        err.chain().find_map(|e| e.downcast_ref::<MediaError>())
    }

    /// Turn any error into a MediaError:
    /// - if it's already a MediaError, keep it (lossless)
    /// - otherwise wrap as GeneralError
    pub fn normalize(err: AnyError) -> MediaError {
        match err.downcast::<MediaError>() {
            Ok(media) => media,
            Err(other) => MediaError::new(ErrorKind::GeneralError, other.to_string()).with_source(other),
        }
    }

    /// A "safe" version suitable for returning to clients:
    /// keeps kind/code/message/data/errors, drops the inner `source`.
    pub fn sanitize_for_client(&self) -> MediaError {
        MediaError {
            kind: self.kind,
            code: self.code.clone(),
            message: self.message.clone(),
            data: self.data.clone(),
            errors: self.errors.clone(),
            source: None,
        }
    }

    // ---- Constructors ----

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn not_authenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAuthenticated, msg)
    }
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, msg)
    }
    pub fn gone(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Gone, msg)
    }
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unprocessable, msg)
    }
    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }
    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadGateway, msg)
    }
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, msg)
    }
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [{}]: {}", self.name(), self.status(), self.code, self.message)
    }
}

impl std::error::Error for MediaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(feature = "serde")]
impl MediaError {
    /// JSON payload returned to clients.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        let mut base = json!({
            "name": self.name(),
            "code": self.code,
            "message": self.message,
            "status": self.status(),
            "className": self.class_name(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        if let Some(e) = &self.errors {
            base["errors"] = e.clone();
        }
        base
    }
}

/// Convenience helper for "bail with MediaError".
#[macro_export]
macro_rules! bail_media {
    ($ctor:ident, $code:expr, $msg:expr) => {
        return Err($crate::errors::MediaError::$ctor($msg).with_code($code).into_anyhow());
    };
    ($ctor:ident, $code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::MediaError::$ctor(format!($fmt, $($arg)*)).with_code($code).into_anyhow());
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_code_follows_kind() {
        let err = MediaError::not_found("missing");
        assert_eq!(err.code, "media/not-found");
        assert_eq!(err.status(), 404);
        assert_eq!(err.class_name(), "not-found");
    }

    #[test]
    fn normalize_keeps_media_errors_and_wraps_others() {
        let wrapped = MediaError::unprocessable("dup")
            .with_code("media/record/duplicate")
            .into_anyhow();
        let back = MediaError::normalize(wrapped);
        assert_eq!(back.kind, ErrorKind::Unprocessable);
        assert_eq!(back.code, "media/record/duplicate");
        assert!(!back.kind.is_server_side());

        let other = MediaError::normalize(anyhow::anyhow!("boom"));
        assert_eq!(other.kind, ErrorKind::GeneralError);
        assert!(other.kind.is_server_side());
        assert_eq!(other.code, "media/internal");
        assert!(other.source.is_some());
    }

    #[test]
    fn from_anyhow_sees_through_context() {
        let err = MediaError::gone("closed").into_anyhow().context("finalizing upload");
        let found = MediaError::from_anyhow(&err).map(|e| e.kind);
        assert_eq!(found, Some(ErrorKind::Gone));
    }

    #[test]
    fn sanitize_drops_source() {
        let err = MediaError::general_error("x").with_source(anyhow::anyhow!("secret"));
        assert!(err.sanitize_for_client().source.is_none());
    }

    fn bails() -> MediaResult<()> {
        bail_media!(bad_request, "media/upload/invalid-intent", "missing {}", "fileName");
    }

    #[test]
    fn bail_macro_sets_code() {
        let err = bails().unwrap_err();
        let media = MediaError::from_anyhow(&err).unwrap();
        assert_eq!(media.code, "media/upload/invalid-intent");
        assert_eq!(media.message, "missing fileName");
    }
}
