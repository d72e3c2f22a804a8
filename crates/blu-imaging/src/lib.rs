//! # blu-imaging
//!
//! Image handling for the photo pipeline:
//! - JPEG marker segment scanning
//! - EXIF capture metadata extraction
//! - Preview generation with metadata preservation

pub mod cursor;
pub mod error;
pub mod exif;
pub mod preview;
pub mod segment;

#[cfg(test)]
mod testing;

pub use error::{ImageError, ImageResult};
pub use exif::{ExifField, ExifMetadataExtractor, ExifPresence, ExifReport, ImageMetadata, UNKNOWN};
pub use preview::PreviewGenerator;
pub use segment::{is_jpeg, FrameHeader, JpegSegment, JpegSegmentScanner};
