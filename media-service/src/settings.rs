use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use media_blob::{BlobConfig, S3Config, UploadRules, DEFAULT_TENANT_PREFIX};
use media_core::{MediaConfigSnapshot, MediaError};

use crate::transform::{DEFAULT_BLUR_SIGMA, DEFAULT_JPEG_QUALITY};

const MIB: u64 = 1024 * 1024;

/// Everything the media service reads from configuration
#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub host: String,
    pub port: u16,
    pub bucket: String,
    pub s3: S3Config,
    pub tenant_prefix: String,
    pub part_size: u64,
    pub min_part_size: u64,
    pub max_parts: u32,
    pub max_bytes: u64,
    pub url_expiry: Duration,
    pub request_timeout: Duration,
    pub max_in_flight: usize,
    pub blur_sigma: f32,
    pub blur_quality: u8,
    pub notify_topic: String,
    /// Topic carrying inbound `derive-blur` events
    pub events_topic: String,
    /// Push endpoint per topic
    pub event_endpoints: HashMap<String, String>,
    /// Accept `x-owner-id` from a trusted gateway as the caller identity
    pub trust_owner_header: bool,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3030,
            bucket: "media".to_string(),
            s3: S3Config::default(),
            tenant_prefix: DEFAULT_TENANT_PREFIX.to_string(),
            part_size: 5 * MIB,
            min_part_size: 5 * MIB,
            max_parts: 10_000,
            max_bytes: 5 * 1024 * MIB,
            url_expiry: Duration::from_secs(600),
            request_timeout: Duration::from_secs(10),
            max_in_flight: 8,
            blur_sigma: DEFAULT_BLUR_SIGMA,
            blur_quality: DEFAULT_JPEG_QUALITY,
            notify_topic: "profiles".to_string(),
            events_topic: "media-events".to_string(),
            event_endpoints: HashMap::new(),
            trust_owner_header: false,
        }
    }
}

impl MediaSettings {
    pub fn from_config(config: &MediaConfigSnapshot) -> Result<Self> {
        let defaults = Self::default();

        let port = match config.get("http.port") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                MediaError::bad_request(format!("http.port is not a port number: {raw}"))
                    .with_code("media/config/invalid")
                    .into_anyhow()
            })?,
            None => defaults.port,
        };

        let s3 = S3Config {
            region: config.get_string("s3.region").unwrap_or(defaults.s3.region),
            endpoint_url: config.get_string("s3.endpoint"),
            access_key_id: config.get_string("s3.access_key_id"),
            secret_access_key: config.get_string("s3.secret_access_key"),
            force_path_style: config.get_bool("s3.force_path_style").unwrap_or(defaults.s3.force_path_style),
            public_domain: config.get_string("s3.public_domain"),
        };

        let settings = Self {
            host: config.get_string("http.host").unwrap_or(defaults.host),
            port,
            bucket: config.get_string("s3.bucket").unwrap_or(defaults.bucket),
            s3,
            tenant_prefix: config.get_string("keys.tenant_prefix").unwrap_or(defaults.tenant_prefix),
            part_size: config.get_u64("upload.part_size").unwrap_or(defaults.part_size),
            min_part_size: config.get_u64("upload.min_part_size").unwrap_or(defaults.min_part_size),
            max_parts: config
                .get_u64("upload.max_parts")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.max_parts),
            max_bytes: config.get_u64("upload.max_bytes").unwrap_or(defaults.max_bytes),
            url_expiry: config.get_duration_secs("upload.url_expiry_secs").unwrap_or(defaults.url_expiry),
            request_timeout: config
                .get_duration_secs("upload.request_timeout_secs")
                .unwrap_or(defaults.request_timeout),
            max_in_flight: config.get_usize("upload.max_in_flight").unwrap_or(defaults.max_in_flight),
            blur_sigma: config.get_f32("blur.sigma").unwrap_or(defaults.blur_sigma),
            blur_quality: config
                .get_u64("blur.quality")
                .and_then(|v| u8::try_from(v).ok())
                .unwrap_or(defaults.blur_quality),
            notify_topic: config.get_string("events.notify_topic").unwrap_or(defaults.notify_topic),
            events_topic: config.get_string("events.topic").unwrap_or(defaults.events_topic),
            event_endpoints: config.section("events.endpoint"),
            trust_owner_header: config
                .get_bool("auth.trust_owner_header")
                .unwrap_or(defaults.trust_owner_header),
        };

        if settings.part_size < settings.min_part_size {
            return Err(MediaError::bad_request(format!(
                "upload.part_size {} is below upload.min_part_size {}",
                settings.part_size, settings.min_part_size
            ))
            .with_code("media/config/invalid")
            .into_anyhow());
        }
        Ok(settings)
    }

    pub fn blob_config(&self) -> BlobConfig {
        BlobConfig::new()
            .with_max_blob_bytes(self.max_bytes)
            .with_url_expiry(self.url_expiry)
            .with_request_timeout(self.request_timeout)
            .with_upload_rules(
                UploadRules::new()
                    .with_part_size(self.part_size)
                    .with_max_parts(self.max_parts)
                    .with_max_in_flight(self.max_in_flight),
            )
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_core::MediaConfig;

    #[test]
    fn defaults_when_config_is_empty() {
        let settings = MediaSettings::from_config(&MediaConfig::new().snapshot()).unwrap();
        assert_eq!(settings.url_expiry, Duration::from_secs(600));
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.max_in_flight, 8);
        assert_eq!(settings.notify_topic, "profiles");
        assert!(!settings.trust_owner_header);
        assert_eq!(settings.listen_addr(), "127.0.0.1:3030");
    }

    #[test]
    fn reads_env_style_keys() {
        let mut config = MediaConfig::new();
        config.load_vars(
            "MEDIA__",
            vec![
                ("MEDIA__S3__BUCKET".to_string(), "purely-public-assets".to_string()),
                ("MEDIA__UPLOAD__PART_SIZE".to_string(), "6000000".to_string()),
                ("MEDIA__UPLOAD__MIN_PART_SIZE".to_string(), "5000000".to_string()),
                ("MEDIA__BLUR__SIGMA".to_string(), "12.5".to_string()),
                ("MEDIA__EVENTS__ENDPOINT__PROFILES".to_string(), "http://profiles/internal/events".to_string()),
            ],
        );

        let settings = MediaSettings::from_config(&config.snapshot()).unwrap();
        assert_eq!(settings.bucket, "purely-public-assets");
        assert_eq!(settings.part_size, 6_000_000);
        assert_eq!(settings.blur_sigma, 12.5);
        assert_eq!(
            settings.event_endpoints.get("profiles").map(String::as_str),
            Some("http://profiles/internal/events")
        );
        assert_eq!(settings.blob_config().upload_rules.part_size, 6_000_000);
    }

    #[test]
    fn rejects_part_size_below_minimum() {
        let mut config = MediaConfig::new();
        config.set("upload.part_size", "1000");
        assert!(MediaSettings::from_config(&config.snapshot()).is_err());

        config.set("http.port", "not-a-port");
        config.set("upload.part_size", "6000000");
        assert!(MediaSettings::from_config(&config.snapshot()).is_err());
    }
}
