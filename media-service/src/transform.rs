use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

pub const DEFAULT_BLUR_SIGMA: f32 = 40.0;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// A pure bytes-to-bytes media transform
#[async_trait]
pub trait MediaTransform: Send + Sync {
    /// Stable name; part of the derivative key seed
    fn name(&self) -> &'static str;

    fn output_content_type(&self) -> &'static str;

    async fn apply(&self, source: Bytes) -> Result<Bytes>;
}

/// Gaussian blur re-encoded as JPEG
#[derive(Debug, Clone, Copy)]
pub struct BlurTransform {
    sigma: f32,
    quality: u8,
}

impl BlurTransform {
    pub fn new(sigma: f32, quality: u8) -> Self {
        Self {
            sigma: if sigma > 0.0 { sigma } else { DEFAULT_BLUR_SIGMA },
            quality: quality.clamp(1, 100),
        }
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    fn blur_sync(source: &[u8], sigma: f32, quality: u8) -> Result<Vec<u8>> {
        let decoded = image::load_from_memory(source).context("source is not a decodable image")?;
        let blurred = decoded.blur(sigma).to_rgb8();

        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode_image(&blurred)
            .context("jpeg encode failed")?;
        Ok(out.into_inner())
    }
}

impl Default for BlurTransform {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_SIGMA, DEFAULT_JPEG_QUALITY)
    }
}

#[async_trait]
impl MediaTransform for BlurTransform {
    fn name(&self) -> &'static str {
        "blur"
    }

    fn output_content_type(&self) -> &'static str {
        "image/jpeg"
    }

    async fn apply(&self, source: Bytes) -> Result<Bytes> {
        let (sigma, quality) = (self.sigma, self.quality);
        let input_len = source.len();
        let encoded = tokio::task::spawn_blocking(move || Self::blur_sync(&source, sigma, quality))
            .await
            .map_err(|e| anyhow!("blur task failed: {e}"))??;

        debug!(input_len, output_len = encoded.len(), sigma, "blurred image");
        Ok(Bytes::from(encoded))
    }
}
