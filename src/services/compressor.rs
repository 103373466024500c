//! Best-effort size reduction for staged uploads.
//!
//! Images are bounded to a maximum box and re-encoded as WebP; everything else
//! passes through untouched. A failed image transform never fails the upload:
//! the staged original is returned instead.

use anyhow::{Result, anyhow};
use image::{DynamicImage, GenericImageView, imageops::FilterType};
use std::path::{Path, PathBuf};

use crate::config::UploadConfig;
use crate::services::classifier::Strategy;
use crate::services::stage::{StagedFile, TempStage};

pub const WEBP_MIME: &str = "image/webp";

/// The asset that is actually uploaded: either the staged file itself or a
/// derived file owned by the current pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedAsset {
    pub local_path: PathBuf,
    pub mime_type: String,
    pub byte_size: u64,
    pub derived: bool,
}

impl ProcessedAsset {
    fn passthrough(staged: &StagedFile, byte_size: u64) -> Self {
        Self {
            local_path: staged.local_path.clone(),
            mime_type: staged.declared_mime_type.clone(),
            byte_size,
            derived: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageCompressor {
    max_width: u32,
    max_height: u32,
    quality: u8,
}

impl ImageCompressor {
    pub fn new(max_width: u32, max_height: u32, quality: u8) -> Self {
        Self {
            max_width: max_width.max(1),
            max_height: max_height.max(1),
            quality: quality.min(100),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(
            config.image_max_width,
            config.image_max_height,
            config.image_quality,
        )
    }

    /// Returns `(asset, original_size)`. Sizes come from filesystem metadata and
    /// fall back to 0 when the probe fails.
    pub async fn compress(
        &self,
        staged: &StagedFile,
        strategy: Strategy,
        stage: &dyn TempStage,
    ) -> (ProcessedAsset, u64) {
        let original_size = probe_size(&staged.local_path).await;

        if strategy == Strategy::Passthrough {
            return (ProcessedAsset::passthrough(staged, original_size), original_size);
        }

        let output = stage.allocate("webp");
        match self.transcode(&staged.local_path, &output).await {
            Ok(()) => {
                let byte_size = probe_size(&output).await;
                tracing::info!(
                    "🗜️ Compressed {}: {:.2} MB -> {:.2} MB",
                    staged.declared_name,
                    original_size as f64 / 1024.0 / 1024.0,
                    byte_size as f64 / 1024.0 / 1024.0
                );
                (
                    ProcessedAsset {
                        local_path: output,
                        mime_type: WEBP_MIME.to_string(),
                        byte_size,
                        derived: true,
                    },
                    original_size,
                )
            }
            Err(e) => {
                tracing::warn!(
                    "Image compression failed for {}, uploading original: {}",
                    staged.declared_name,
                    e
                );
                stage.release(&output).await;
                (ProcessedAsset::passthrough(staged, original_size), original_size)
            }
        }
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        let data = tokio::fs::read(input).await?;
        let compressor = self.clone();
        let encoded = tokio::task::spawn_blocking(move || compressor.encode(&data))
            .await
            .map_err(|e| anyhow!("Compression task failed: {}", e))??;
        tokio::fs::write(output, encoded).await?;
        Ok(())
    }

    /// Decodes, bounds and re-encodes image bytes as WebP.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let img =
            image::load_from_memory(data).map_err(|e| anyhow!("Failed to load image: {}", e))?;
        let img = self.constrain(img);

        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8();
        let encoder = webp::Encoder::from_rgba(&rgba, width, height);
        let encoded = encoder.encode(self.quality as f32);

        Ok(encoded.to_vec())
    }

    /// Shrinks to fit the bounding box preserving aspect ratio. Never upscales.
    pub fn constrain(&self, img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        if width <= self.max_width && height <= self.max_height {
            return img;
        }
        let (w, h) = fit_within(width, height, self.max_width, self.max_height);
        img.resize_exact(w, h, FilterType::Lanczos3)
    }
}

/// Largest size with the same aspect ratio that fits in `max_w` x `max_h`.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let ratio = f64::min(
        max_w as f64 / width as f64,
        max_h as f64 / height as f64,
    );
    let w = ((width as f64 * ratio).round() as u32).clamp(1, max_w.max(1));
    let h = ((height as f64 * ratio).round() as u32).clamp(1, max_h.max(1));
    (w, h)
}

pub async fn probe_size(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(e) => {
            tracing::warn!("Size probe failed for {}: {}", path.display(), e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_fit_within_preserves_aspect() {
        assert_eq!(fit_within(2400, 1600, 1920, 1080), (1620, 1080));
        assert_eq!(fit_within(3840, 1080, 1920, 1080), (1920, 540));
        assert_eq!(fit_within(1000, 4000, 1920, 1080), (270, 1080));
    }

    #[test]
    fn test_fit_within_never_upscales() {
        assert_eq!(fit_within(800, 600, 1920, 1080), (800, 600));
        assert_eq!(fit_within(1920, 1080, 1920, 1080), (1920, 1080));
    }

    #[test]
    fn test_encode_bounds_large_image() {
        let compressor = ImageCompressor::new(1920, 1080, 80);
        let encoded = compressor.encode(&png(2400, 1600)).unwrap();

        let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::WebP).unwrap();
        let (w, h) = decoded.dimensions();
        assert!(w <= 1920 && h <= 1080);
        let ratio = w as f64 / h as f64;
        assert!((ratio - 1.5).abs() < 0.01, "ratio {ratio}");
    }

    #[test]
    fn test_encode_keeps_small_image_size() {
        let compressor = ImageCompressor::new(1920, 1080, 80);
        let encoded = compressor.encode(&png(800, 600)).unwrap();
        let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::WebP).unwrap();
        assert_eq!(decoded.dimensions(), (800, 600));
    }

    #[test]
    fn test_zero_bounds_shrink_to_a_single_pixel() {
        assert_eq!(fit_within(64, 32, 0, 0), (1, 1));

        let compressor = ImageCompressor::new(0, 0, 80);
        let encoded = compressor.encode(&png(64, 32)).unwrap();
        let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::WebP).unwrap();
        assert_eq!(decoded.dimensions(), (1, 1));
    }

    #[test]
    fn test_encode_rejects_garbage() {
        let compressor = ImageCompressor::new(1920, 1080, 80);
        assert!(compressor.encode(b"definitely not an image").is_err());
    }
}
