//! Gallery Preview Generation
//!
//! Re-encodes a JPEG at a fixed quality, halving very large sources, and
//! splices the original application segments back in so the preview keeps
//! its capture metadata.

use std::path::Path;

use blu_core::PreviewConfig;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use tracing::{debug, info, warn};

use crate::error::{ImageError, ImageResult};
use crate::segment::{frame_header, is_jpeg, FrameHeader, JpegSegment, JpegSegmentScanner, SOI};

/// Generates downscaled, metadata-preserving previews
#[derive(Debug, Clone)]
pub struct PreviewGenerator {
    scanner: JpegSegmentScanner,
    large_image_threshold: u32,
    quality: u8,
}

impl Default for PreviewGenerator {
    fn default() -> Self {
        Self::from_config(&PreviewConfig::default())
    }
}

impl PreviewGenerator {
    pub fn new(large_image_threshold: u32, quality: u8) -> Self {
        Self {
            scanner: JpegSegmentScanner::new(),
            large_image_threshold,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        Self::new(config.large_image_threshold, config.quality)
    }

    /// Build a preview for `input`.
    ///
    /// Non-JPEG input, or anything the codec rejects, is returned unchanged.
    pub fn generate_preview(&self, input: Bytes, file_name: &str) -> Bytes {
        match self.recompress(&input) {
            Ok(preview) => {
                info!(
                    file_name,
                    original_kb = input.len() / 1024,
                    preview_kb = preview.len() / 1024,
                    "Generated preview (metadata preserved)"
                );
                Bytes::from(preview)
            }
            Err(ImageError::NotJpeg) => {
                debug!(file_name, "Not a JPEG, skipping compression");
                input
            }
            Err(e) => {
                warn!(file_name, error = %e, "Preview generation failed, keeping original");
                input
            }
        }
    }

    fn recompress(&self, input: &[u8]) -> ImageResult<Vec<u8>> {
        if !is_jpeg(input) {
            return Err(ImageError::NotJpeg);
        }

        let segments = self.scanner.scan(input);
        let header = frame_header(&segments);
        let app_segments: Vec<&JpegSegment> = segments.iter().filter(|s| s.is_app()).collect();

        let mut image = image::load_from_memory_with_format(input, ImageFormat::Jpeg)?;
        let (width, height) = (image.width(), image.height());

        if width > self.large_image_threshold || height > self.large_image_threshold {
            let (half_width, half_height) = ((width / 2).max(1), (height / 2).max(1));
            debug!(width, height, half_width, half_height, "Halving large image");
            image = image.resize_exact(half_width, half_height, FilterType::Triangle);
        }

        let encoded = self.encode(&image, header.as_ref())?;
        if !encoded.starts_with(&SOI) {
            return Err(ImageError::Encode("encoder output lacks SOI".to_string()));
        }

        let extra: usize = app_segments.iter().map(|s| s.bytes().len()).sum();
        let mut output = Vec::with_capacity(encoded.len() + extra);
        output.extend_from_slice(&SOI);
        for segment in &app_segments {
            output.extend_from_slice(segment.bytes());
        }
        output.extend_from_slice(&encoded[SOI.len()..]);

        Ok(output)
    }

    fn encode(&self, image: &DynamicImage, header: Option<&FrameHeader>) -> ImageResult<Vec<u8>> {
        let width = u16::try_from(image.width())
            .map_err(|_| ImageError::Encode(format!("width {} too large", image.width())))?;
        let height = u16::try_from(image.height())
            .map_err(|_| ImageError::Encode(format!("height {} too large", image.height())))?;

        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, self.quality);
        encoder.set_sampling_factor(source_sampling(header));

        let grayscale = header.map(FrameHeader::is_grayscale).unwrap_or(false);
        let result = if grayscale {
            encoder.encode(image.to_luma8().as_raw(), width, height, ColorType::Luma)
        } else {
            encoder.encode(image.to_rgb8().as_raw(), width, height, ColorType::Rgb)
        };
        result.map_err(|e| ImageError::Encode(e.to_string()))?;

        Ok(out)
    }

    /// File name callers store the preview under
    pub fn preview_name(file_name: &str) -> String {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("image");
        format!("{}_preview.jpg", stem)
    }
}

/// Chroma subsampling of the source: luma sampling factors relative to the
/// largest chroma factors
fn source_sampling(header: Option<&FrameHeader>) -> SamplingFactor {
    let Some((luma, chroma)) = header.and_then(|h| h.components.split_first()) else {
        return SamplingFactor::F_2_2;
    };
    if chroma.is_empty() {
        return SamplingFactor::F_1_1;
    }

    let chroma_h = chroma.iter().map(|c| c.horizontal).max().unwrap_or(1);
    let chroma_v = chroma.iter().map(|c| c.vertical).max().unwrap_or(1);
    let ratio = |luma: u8, chroma: u8| (chroma > 0 && luma % chroma == 0).then(|| luma / chroma);

    match (ratio(luma.horizontal, chroma_h), ratio(luma.vertical, chroma_v)) {
        (Some(1), Some(1)) => SamplingFactor::F_1_1,
        (Some(2), Some(1)) => SamplingFactor::F_2_1,
        (Some(1), Some(2)) => SamplingFactor::F_1_2,
        (Some(4), Some(1)) => SamplingFactor::F_4_1,
        _ => SamplingFactor::F_2_2,
    }
}
