//! JPEG Segment Scanner
//!
//! Splits the header portion of a JPEG stream into marker segments. Scanning
//! stops at start-of-scan: entropy-coded data is never walked.

use tracing::debug;

/// Start-of-image marker bytes
pub const SOI: [u8; 2] = [0xFF, 0xD8];

pub const MARKER_EOI: u8 = 0xD9;
pub const MARKER_SOS: u8 = 0xDA;
pub const MARKER_APP0: u8 = 0xE0;
pub const MARKER_APP1: u8 = 0xE1;
pub const MARKER_APP15: u8 = 0xEF;

/// Signature opening an EXIF APP1 payload
pub const EXIF_SIGNATURE: &[u8; 6] = b"Exif\0\0";

/// Check the start-of-image signature
pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[..2] == SOI
}

/// A marker segment, stored with its marker and length header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegSegment {
    marker: u8,
    bytes: Vec<u8>,
}

impl JpegSegment {
    pub fn marker(&self) -> u8 {
        self.marker
    }

    /// Raw bytes: `FF`, marker, two length bytes, payload
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Segment body after the length header
    pub fn payload(&self) -> &[u8] {
        &self.bytes[4..]
    }

    /// APP0 through APP15
    pub fn is_app(&self) -> bool {
        (MARKER_APP0..=MARKER_APP15).contains(&self.marker)
    }

    pub fn is_exif(&self) -> bool {
        self.marker == MARKER_APP1 && self.payload().starts_with(EXIF_SIGNATURE)
    }

    /// Start-of-frame markers carry the image geometry
    pub fn is_start_of_frame(&self) -> bool {
        matches!(self.marker, 0xC0..=0xCF) && !matches!(self.marker, 0xC4 | 0xC8 | 0xCC)
    }
}

/// Per-component sampling factors from a start-of-frame segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSampling {
    pub id: u8,
    pub horizontal: u8,
    pub vertical: u8,
}

/// Geometry declared by a start-of-frame segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub width: u16,
    pub height: u16,
    pub components: Vec<ComponentSampling>,
}

impl FrameHeader {
    fn parse(segment: &JpegSegment) -> Option<Self> {
        let payload = segment.payload();
        if payload.len() < 6 {
            return None;
        }
        let height = u16::from_be_bytes([payload[1], payload[2]]);
        let width = u16::from_be_bytes([payload[3], payload[4]]);
        let count = payload[5] as usize;

        let components = payload[6..]
            .chunks_exact(3)
            .take(count)
            .map(|c| ComponentSampling {
                id: c[0],
                horizontal: c[1] >> 4,
                vertical: c[1] & 0x0F,
            })
            .collect::<Vec<_>>();

        if components.len() != count {
            return None;
        }

        Some(Self {
            width,
            height,
            components,
        })
    }

    pub fn is_grayscale(&self) -> bool {
        self.components.len() == 1
    }
}

/// Scanner for JPEG marker segments
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegSegmentScanner;

impl JpegSegmentScanner {
    pub fn new() -> Self {
        Self
    }

    /// Collect every segment ahead of the scan data, in stream order.
    ///
    /// Returns an empty list for non-JPEG input. Truncated or malformed
    /// headers end the scan and keep what was collected so far.
    pub fn scan(&self, data: &[u8]) -> Vec<JpegSegment> {
        let mut segments = Vec::new();
        if !is_jpeg(data) {
            return segments;
        }

        let mut pos = 2;
        while pos + 4 <= data.len() {
            if data[pos] != 0xFF {
                debug!(offset = pos, "Expected marker prefix, stopping scan");
                break;
            }

            let marker = data[pos + 1];
            match marker {
                // Fill byte ahead of a marker
                0xFF => {
                    pos += 1;
                    continue;
                }
                MARKER_EOI | MARKER_SOS => break,
                // Standalone markers carry no length
                0x01 | 0xD0..=0xD7 => {
                    pos += 2;
                    continue;
                }
                _ => {}
            }

            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            if length < 2 || pos + 2 + length > data.len() {
                debug!(offset = pos, marker, length, "Segment exceeds buffer, stopping scan");
                break;
            }

            segments.push(JpegSegment {
                marker,
                bytes: data[pos..pos + 2 + length].to_vec(),
            });
            pos += 2 + length;
        }

        segments
    }

    /// Application segments only, original order preserved
    pub fn app_segments(&self, data: &[u8]) -> Vec<JpegSegment> {
        self.scan(data).into_iter().filter(JpegSegment::is_app).collect()
    }
}

/// First start-of-frame header among scanned segments
pub fn frame_header(segments: &[JpegSegment]) -> Option<FrameHeader> {
    segments
        .iter()
        .find(|s| s.is_start_of_frame())
        .and_then(FrameHeader::parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{encode_rgb_jpeg, segment};

    #[test]
    fn test_non_jpeg_yields_nothing() {
        let scanner = JpegSegmentScanner::new();
        assert!(scanner.scan(b"\x89PNG\r\n\x1a\n").is_empty());
        assert!(scanner.scan(&[0xFF, 0xD8]).is_empty());
        assert!(scanner.scan(&[]).is_empty());
    }

    #[test]
    fn test_two_app_segments_in_order() {
        let app0 = segment(0xE0, b"JFIF\0\x01\x01");
        let app1 = segment(0xE1, b"Exif\0\0MM\0*");
        let mut data = SOI.to_vec();
        data.extend_from_slice(&app0);
        data.extend_from_slice(&app1);
        data.extend_from_slice(&[0xFF, 0xD9]);

        let segments = JpegSegmentScanner::new().scan(&data);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].bytes(), app0.as_slice());
        assert_eq!(segments[1].bytes(), app1.as_slice());
        assert!(segments[1].is_exif());
    }

    #[test]
    fn test_stops_at_start_of_scan() {
        let app0 = segment(0xE0, b"JFIF\0");
        let mut data = SOI.to_vec();
        data.extend_from_slice(&app0);
        data.extend_from_slice(&segment(0xDA, &[1, 1, 0, 0, 63, 0]));
        // Looks like another APP segment but sits in scan data
        data.extend_from_slice(&segment(0xE2, b"ICC_PROFILE\0"));

        let segments = JpegSegmentScanner::new().app_segments(&data);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].bytes(), app0.as_slice());
    }

    #[test]
    fn test_truncated_segment_keeps_prefix() {
        let app0 = segment(0xE0, b"JFIF\0");
        let mut data = SOI.to_vec();
        data.extend_from_slice(&app0);
        // APP1 claims 200 bytes but only a few follow
        data.extend_from_slice(&[0xFF, 0xE1, 0x00, 0xC8, b'E', b'x']);

        let segments = JpegSegmentScanner::new().scan(&data);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].marker(), MARKER_APP0);
    }

    #[test]
    fn test_invalid_length_stops_scan() {
        let mut data = SOI.to_vec();
        data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x01, 0x00, 0x00]);
        assert!(JpegSegmentScanner::new().scan(&data).is_empty());
    }

    #[test]
    fn test_frame_header_from_encoded_jpeg() {
        let jpeg = encode_rgb_jpeg(40, 24);
        let segments = JpegSegmentScanner::new().scan(&jpeg);
        let header = frame_header(&segments).unwrap();

        assert_eq!(header.width, 40);
        assert_eq!(header.height, 24);
        assert_eq!(header.components.len(), 3);
        assert!(!header.is_grayscale());
    }
}
