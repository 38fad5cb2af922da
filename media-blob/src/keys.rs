//! Object key convention:
//!
//! ```text
//! {tenant_prefix}/{owner_id}/media/{purpose}/{type}/{subtype}/{object_id}/{file_name}
//! ```
//!
//! Derivatives keep every segment except the content type and the object id.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::{BlobError, BlobResult};

pub const DEFAULT_TENANT_PREFIX: &str = "profiles";

/// File extension stored for a content type. Unknown types are rejected.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        _ => None,
    }
}

/// Replace whatever extension `file_name` carries with `extension`.
pub fn qualify_file_name(file_name: &str, extension: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    format!("{stem}.{extension}")
}

fn check_segment(name: &str, value: &str) -> BlobResult<()> {
    if value.trim().is_empty() {
        return Err(BlobError::invalid(format!("{name} must not be empty")));
    }
    if value.contains('/') {
        return Err(BlobError::invalid(format!("{name} must not contain '/'")));
    }
    Ok(())
}

fn check_content_type(content_type: &str) -> BlobResult<()> {
    match content_type.split_once('/') {
        Some((kind, sub)) if !kind.is_empty() && !sub.is_empty() && !sub.contains('/') => Ok(()),
        _ => Err(BlobError::unsupported_content_type(content_type)),
    }
}

/// A fully qualified media object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaKey {
    pub tenant_prefix: String,
    pub owner_id: String,
    pub purpose: String,
    pub content_type: String,
    pub object_id: String,
    pub file_name: String,
}

impl MediaKey {
    /// Directory part of the key (everything but the file name).
    pub fn storage_path(&self) -> String {
        format!(
            "{}/{}/media/{}/{}/{}",
            self.tenant_prefix, self.owner_id, self.purpose, self.content_type, self.object_id
        )
    }

    /// Extension of the file name, if any.
    pub fn extension(&self) -> Option<&str> {
        match self.file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.extension().is_some()
    }

    /// Same key with another content type and object id.
    pub fn sibling(&self, content_type: &str, object_id: String, file_name: String) -> MediaKey {
        MediaKey {
            tenant_prefix: self.tenant_prefix.clone(),
            owner_id: self.owner_id.clone(),
            purpose: self.purpose.clone(),
            content_type: content_type.to_string(),
            object_id,
            file_name,
        }
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.storage_path(), self.file_name)
    }
}

impl FromStr for MediaKey {
    type Err = BlobError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = key.split('/').collect();
        // prefix(>=1) owner media purpose type subtype id file
        if segments.len() < 8 || segments.iter().any(|s| s.is_empty()) {
            return Err(BlobError::invalid(format!("not a media key: {key}")));
        }

        let n = segments.len();
        if segments[n - 6] != "media" {
            return Err(BlobError::invalid(format!("not a media key: {key}")));
        }

        Ok(MediaKey {
            tenant_prefix: segments[..n - 7].join("/"),
            owner_id: segments[n - 7].to_string(),
            purpose: segments[n - 5].to_string(),
            content_type: format!("{}/{}", segments[n - 4], segments[n - 3]),
            object_id: segments[n - 2].to_string(),
            file_name: segments[n - 1].to_string(),
        })
    }
}

/// Strategy for generating media keys
pub trait MediaKeyStrategy: Send + Sync {
    /// Key for a fresh client or backend upload.
    fn object_key(
        &self,
        owner_id: &str,
        purpose: &str,
        content_type: &str,
        file_name: &str,
    ) -> BlobResult<MediaKey>;

    /// Key for a derivative of `source`, stable for the same inputs.
    fn derived_key(&self, source: &MediaKey, content_type: &str, transform: &str) -> BlobResult<MediaKey>;
}

#[derive(Debug, Clone)]
pub struct DefaultKeyStrategy {
    tenant_prefix: String,
}

impl DefaultKeyStrategy {
    pub fn new(tenant_prefix: impl Into<String>) -> Self {
        Self {
            tenant_prefix: tenant_prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn tenant_prefix(&self) -> &str {
        &self.tenant_prefix
    }
}

impl Default for DefaultKeyStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_TENANT_PREFIX)
    }
}

impl MediaKeyStrategy for DefaultKeyStrategy {
    fn object_key(
        &self,
        owner_id: &str,
        purpose: &str,
        content_type: &str,
        file_name: &str,
    ) -> BlobResult<MediaKey> {
        check_segment("ownerId", owner_id)?;
        check_segment("purpose", purpose)?;
        if file_name.trim().is_empty() {
            return Err(BlobError::invalid("fileName must not be empty"));
        }
        check_content_type(content_type)?;
        let extension =
            extension_for(content_type).ok_or_else(|| BlobError::unsupported_content_type(content_type))?;

        let qualified = qualify_file_name(file_name.trim(), extension);
        check_segment("fileName", &qualified)?;

        Ok(MediaKey {
            tenant_prefix: self.tenant_prefix.clone(),
            owner_id: owner_id.to_string(),
            purpose: purpose.to_string(),
            content_type: content_type.to_ascii_lowercase(),
            object_id: Uuid::new_v4().to_string(),
            file_name: qualified,
        })
    }

    fn derived_key(&self, source: &MediaKey, content_type: &str, transform: &str) -> BlobResult<MediaKey> {
        check_content_type(content_type)?;
        let extension =
            extension_for(content_type).ok_or_else(|| BlobError::unsupported_content_type(content_type))?;

        let seed = format!("{source}#{transform}#{}", content_type.to_ascii_lowercase());
        let object_id = Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()).to_string();
        let file_name = qualify_file_name(&source.file_name, extension);

        Ok(source.sibling(&content_type.to_ascii_lowercase(), object_id, file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_follows_convention() {
        let keys = DefaultKeyStrategy::default();
        let key = keys.object_key("u1", "date", "image/jpeg", "a.jpg").unwrap();
        let rendered = key.to_string();

        assert!(rendered.starts_with("profiles/u1/media/date/image/jpeg/"));
        assert!(rendered.ends_with("/a.jpg"));
        assert_eq!(rendered.split('/').count(), 8);
        assert!(Uuid::parse_str(&key.object_id).is_ok());
    }

    #[test]
    fn file_extension_is_replaced() {
        let keys = DefaultKeyStrategy::default();
        let key = keys.object_key("u1", "profile", "image/png", "holiday.JPEG").unwrap();
        assert_eq!(key.file_name, "holiday.png");

        let key = keys.object_key("u1", "profile", "image/png", "noext").unwrap();
        assert_eq!(key.file_name, "noext.png");
    }

    #[test]
    fn unknown_content_type_is_rejected() {
        let keys = DefaultKeyStrategy::default();
        let err = keys.object_key("u1", "profile", "application/zip", "a.zip").unwrap_err();
        assert!(matches!(err, BlobError::UnsupportedContentType { .. }));
    }

    #[test]
    fn empty_segments_are_rejected() {
        let keys = DefaultKeyStrategy::default();
        assert!(keys.object_key("", "profile", "image/png", "a.png").is_err());
        assert!(keys.object_key("u1", "a/b", "image/png", "a.png").is_err());
        assert!(keys.object_key("u1", "profile", "image/png", "  ").is_err());
    }

    #[test]
    fn derived_key_only_swaps_content_type_and_id() {
        let keys = DefaultKeyStrategy::default();
        let source = keys.object_key("u1", "date", "image/png", "a.png").unwrap();
        let derived = keys.derived_key(&source, "image/jpeg", "blur").unwrap();

        assert_eq!(derived.tenant_prefix, source.tenant_prefix);
        assert_eq!(derived.owner_id, source.owner_id);
        assert_eq!(derived.purpose, source.purpose);
        assert_eq!(derived.content_type, "image/jpeg");
        assert_eq!(derived.file_name, "a.jpg");
        assert_ne!(derived.object_id, source.object_id);

        let again = keys.derived_key(&source, "image/jpeg", "blur").unwrap();
        assert_eq!(again, derived);
    }

    #[test]
    fn parse_round_trips_and_rejects_foreign_keys() {
        let keys = DefaultKeyStrategy::new("tenants/acme");
        let key = keys.object_key("u1", "date", "image/jpeg", "a.jpg").unwrap();
        let parsed: MediaKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);

        assert!("profiles/u1/a.jpg".parse::<MediaKey>().is_err());
        assert!("profiles/u1/files/date/image/jpeg/id/a.jpg".parse::<MediaKey>().is_err());
        assert!("profiles/u1/media/date/image/jpeg//a.jpg".parse::<MediaKey>().is_err());
    }

    #[test]
    fn storage_path_excludes_file_name() {
        let key: MediaKey = "profiles/u1/media/date/image/jpeg/abc/a.jpg".parse().unwrap();
        assert_eq!(key.storage_path(), "profiles/u1/media/date/image/jpeg/abc");
        assert_eq!(key.extension(), Some("jpg"));
    }
}
