//! EXIF Metadata Extraction
//!
//! Reads image dimensions from the frame header and a handful of camera
//! tags from the EXIF APP1 container. Extraction never fails: anything
//! missing or unreadable stays at its sentinel value.

use std::io::Cursor;

use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cursor::TiffCursor;
use crate::error::ImageResult;
use crate::segment::{JpegSegmentScanner, EXIF_SIGNATURE};

/// Value of string fields that could not be recovered
pub const UNKNOWN: &str = "unknown";

const TAG_MODEL: u16 = 0x0110;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_EXPOSURE_TIME: u16 = 0x829A;
const TAG_ISO: u16 = 0x8827;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_RATIONAL: u16 = 5;

const IFD_ENTRY_SIZE: usize = 12;

/// IFD0 plus the one EXIF sub-directory it points to
const MAX_IFD_DEPTH: usize = 1;

/// Camera metadata recorded for a gallery entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub capture_time: String,
    pub camera_model: String,
    pub exposure: String,
    pub iso: String,
    pub width: u32,
    pub height: u32,
}

impl Default for ImageMetadata {
    fn default() -> Self {
        Self {
            capture_time: UNKNOWN.to_string(),
            camera_model: UNKNOWN.to_string(),
            exposure: UNKNOWN.to_string(),
            iso: UNKNOWN.to_string(),
            width: 0,
            height: 0,
        }
    }
}

/// Fields whose extraction was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExifField {
    TiffHeader,
    Directory,
    CameraModel,
    CaptureTime,
    Exposure,
    Iso,
}

/// What the extractor found in the EXIF container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExifPresence {
    /// No EXIF APP1 segment in the stream
    Absent,
    /// Container parsed without hitting bounds
    Parsed,
    /// Container present but some reads ran past its end
    Partial { skipped: Vec<ExifField> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExifReport {
    pub metadata: ImageMetadata,
    pub exif: ExifPresence,
}

/// Extracts [`ImageMetadata`] from JPEG bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifMetadataExtractor {
    scanner: JpegSegmentScanner,
}

impl ExifMetadataExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extract(&self, jpeg: &[u8]) -> ImageMetadata {
        self.extract_detailed(jpeg).metadata
    }

    /// Like [`extract`](Self::extract), also telling absent EXIF apart from damaged EXIF
    pub fn extract_detailed(&self, jpeg: &[u8]) -> ExifReport {
        let mut metadata = ImageMetadata::default();

        match read_dimensions(jpeg) {
            Ok((width, height)) => {
                metadata.width = width;
                metadata.height = height;
            }
            Err(e) => debug!(error = %e, "Could not read image dimensions"),
        }

        let exif = self
            .scanner
            .scan(jpeg)
            .into_iter()
            .find(|s| s.is_exif())
            .map(|segment| {
                let tiff = &segment.payload()[EXIF_SIGNATURE.len()..];
                let mut skipped = Vec::new();
                parse_tiff(tiff, &mut metadata, &mut skipped);
                if skipped.is_empty() {
                    ExifPresence::Parsed
                } else {
                    debug!(?skipped, "EXIF container partially read");
                    ExifPresence::Partial { skipped }
                }
            })
            .unwrap_or(ExifPresence::Absent);

        ExifReport { metadata, exif }
    }
}

fn read_dimensions(jpeg: &[u8]) -> ImageResult<(u32, u32)> {
    let reader = ImageReader::with_format(Cursor::new(jpeg), ImageFormat::Jpeg);
    Ok(reader.into_dimensions()?)
}

fn parse_tiff(tiff: &[u8], metadata: &mut ImageMetadata, skipped: &mut Vec<ExifField>) {
    let cursor = match TiffCursor::new(tiff) {
        Ok(cursor) => cursor,
        Err(_) => {
            skipped.push(ExifField::TiffHeader);
            return;
        }
    };

    match cursor.first_ifd_offset() {
        Ok(offset) => {
            let mut walker = IfdWalker {
                cursor,
                metadata,
                skipped,
                visited: Vec::new(),
            };
            walker.walk(offset, 0);
        }
        Err(_) => skipped.push(ExifField::TiffHeader),
    }
}

struct IfdWalker<'a, 'm> {
    cursor: TiffCursor<'a>,
    metadata: &'m mut ImageMetadata,
    skipped: &'m mut Vec<ExifField>,
    visited: Vec<usize>,
}

impl IfdWalker<'_, '_> {
    fn walk(&mut self, offset: usize, depth: usize) {
        if self.visited.contains(&offset) {
            debug!(offset, "IFD offset cycle, skipping");
            return;
        }
        self.visited.push(offset);

        let count = match self.cursor.u16_at(offset) {
            Ok(count) => count as usize,
            Err(_) => {
                self.skipped.push(ExifField::Directory);
                return;
            }
        };

        for index in 0..count {
            let entry = offset + 2 + index * IFD_ENTRY_SIZE;
            if self.cursor.bytes_at(entry, IFD_ENTRY_SIZE).is_err() {
                self.skipped.push(ExifField::Directory);
                break;
            }
            self.visit_entry(entry, depth);
        }
    }

    fn visit_entry(&mut self, entry: usize, depth: usize) {
        // The entry itself was bounds-checked by the caller
        let (Ok(tag), Ok(kind), Ok(count)) = (
            self.cursor.u16_at(entry),
            self.cursor.u16_at(entry + 2),
            self.cursor.u32_at(entry + 4),
        ) else {
            return;
        };
        let count = count as usize;

        match tag {
            TAG_EXIF_IFD => {
                if depth < MAX_IFD_DEPTH {
                    if let Ok(offset) = self.cursor.u32_at(entry + 8) {
                        self.walk(offset as usize, depth + 1);
                    }
                }
            }
            TAG_MODEL if kind == TYPE_ASCII => {
                self.record(ExifField::CameraModel, self.ascii(entry, count), |m, v| {
                    m.camera_model = v
                });
            }
            TAG_DATE_TIME_ORIGINAL if kind == TYPE_ASCII => {
                self.record(ExifField::CaptureTime, self.ascii(entry, count), |m, v| {
                    m.capture_time = v
                });
            }
            TAG_EXPOSURE_TIME if kind == TYPE_RATIONAL => {
                match self.exposure(entry) {
                    Ok(Some(exposure)) => self.metadata.exposure = exposure,
                    Ok(None) => {}
                    Err(_) => self.skipped.push(ExifField::Exposure),
                }
            }
            TAG_ISO if kind == TYPE_SHORT => {
                // Short values sit inline in the value slot
                self.record(
                    ExifField::Iso,
                    self.cursor.u16_at(entry + 8).map(|iso| iso.to_string()),
                    |m, v| m.iso = v,
                );
            }
            _ => {}
        }
    }

    fn record(
        &mut self,
        field: ExifField,
        value: ImageResult<String>,
        apply: impl FnOnce(&mut ImageMetadata, String),
    ) {
        match value {
            Ok(value) => apply(&mut *self.metadata, value),
            Err(_) => self.skipped.push(field),
        }
    }

    /// ASCII value, inline when it fits the four-byte slot
    fn ascii(&self, entry: usize, count: usize) -> ImageResult<String> {
        let raw = if count <= 4 {
            self.cursor.bytes_at(entry + 8, count)?
        } else {
            let offset = self.cursor.u32_at(entry + 8)? as usize;
            self.cursor.bytes_at(offset, count)?
        };

        let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    fn exposure(&self, entry: usize) -> ImageResult<Option<String>> {
        let offset = self.cursor.u32_at(entry + 8)? as usize;
        let numerator = self.cursor.u32_at(offset)?;
        let denominator = self.cursor.u32_at(offset + 4)?;
        Ok(format_exposure(numerator, denominator))
    }
}

/// `1/D` for shutter speeds faster than a third of a second, decimal
/// seconds otherwise
pub fn format_exposure(numerator: u32, denominator: u32) -> Option<String> {
    if numerator == 1 && denominator > 3 {
        Some(format!("1/{}", denominator))
    } else if denominator > 0 {
        Some(format!("{:.6}s", numerator as f64 / denominator as f64))
    } else {
        None
    }
}
