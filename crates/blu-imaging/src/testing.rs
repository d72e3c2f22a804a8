//! Fixture builders shared by the imaging tests

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::segment::{EXIF_SIGNATURE, SOI};

/// Raw segment bytes for `marker` wrapping `payload`
pub(crate) fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let length = (payload.len() + 2) as u16;
    let mut bytes = vec![0xFF, marker];
    bytes.extend_from_slice(&length.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

pub(crate) fn encode_rgb_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 85)
        .encode_image(&img)
        .unwrap();
    buf
}

pub(crate) fn encode_gray_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |x, y| Luma([((x * 3 + y) % 256) as u8]));
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 85)
        .encode_image(&img)
        .unwrap();
    buf
}

/// Replace the application segments right after SOI with `segments`
pub(crate) fn with_app_segments(jpeg: &[u8], segments: &[Vec<u8>]) -> Vec<u8> {
    let mut pos = 2;
    while pos + 4 <= jpeg.len() && jpeg[pos] == 0xFF && (0xE0..=0xEF).contains(&jpeg[pos + 1]) {
        let length = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        pos += 2 + length;
    }

    let mut out = SOI.to_vec();
    for segment in segments {
        out.extend_from_slice(segment);
    }
    out.extend_from_slice(&jpeg[pos..]);
    out
}

/// Tag values to place in a generated TIFF block
#[derive(Debug, Clone, Default)]
pub(crate) struct ExifFixture {
    pub big_endian: bool,
    pub model: Option<&'static str>,
    pub date_time: Option<&'static str>,
    pub exposure: Option<(u32, u32)>,
    pub iso: Option<u16>,
}

struct Writer {
    buf: Vec<u8>,
    big_endian: bool,
}

impl Writer {
    fn u16(&mut self, v: u16) {
        let bytes = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&bytes);
    }

    fn u32(&mut self, v: u32) {
        let bytes = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&bytes);
    }

    fn entry(&mut self, tag: u16, kind: u16, count: u32, value: u32) {
        self.u16(tag);
        self.u16(kind);
        self.u32(count);
        self.u32(value);
    }
}

fn nul_terminated(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

/// TIFF block: IFD0 with the model and an EXIF pointer, EXIF IFD with the rest
pub(crate) fn build_tiff(fixture: &ExifFixture) -> Vec<u8> {
    let model = fixture.model.map(nul_terminated);
    let date = fixture.date_time.map(nul_terminated);
    let has_exif_ifd = fixture.exposure.is_some() || fixture.iso.is_some() || date.is_some();

    let ifd0_entries = model.is_some() as usize + has_exif_ifd as usize;
    let ifd0_offset = 8;
    let model_offset = ifd0_offset + 2 + 12 * ifd0_entries + 4;
    let model_len = model.as_ref().map_or(0, Vec::len);
    let exif_offset = (model_offset + model_len + 1) & !1;

    let exif_entries =
        fixture.exposure.is_some() as usize + fixture.iso.is_some() as usize + date.is_some() as usize;
    let exif_data_offset = exif_offset + 2 + 12 * exif_entries + 4;
    let exposure_offset = exif_data_offset;
    let date_offset = exif_data_offset + if fixture.exposure.is_some() { 8 } else { 0 };

    let mut w = Writer {
        buf: Vec::new(),
        big_endian: fixture.big_endian,
    };
    w.buf.extend_from_slice(if fixture.big_endian { b"MM" } else { b"II" });
    w.u16(42);
    w.u32(ifd0_offset as u32);

    w.u16(ifd0_entries as u16);
    if let Some(model) = &model {
        w.entry(0x0110, 2, model.len() as u32, model_offset as u32);
    }
    if has_exif_ifd {
        w.entry(0x8769, 4, 1, exif_offset as u32);
    }
    w.u32(0);
    if let Some(model) = &model {
        w.buf.extend_from_slice(model);
    }

    if has_exif_ifd {
        w.buf.resize(exif_offset, 0);
        w.u16(exif_entries as u16);
        if fixture.exposure.is_some() {
            w.entry(0x829A, 5, 1, exposure_offset as u32);
        }
        if let Some(iso) = fixture.iso {
            w.u16(0x8827);
            w.u16(3);
            w.u32(1);
            w.u16(iso);
            w.u16(0);
        }
        if let Some(date) = &date {
            w.entry(0x9003, 2, date.len() as u32, date_offset as u32);
        }
        w.u32(0);
        if let Some((num, den)) = fixture.exposure {
            w.u32(num);
            w.u32(den);
        }
        if let Some(date) = &date {
            w.buf.extend_from_slice(date);
        }
    }

    w.buf
}

/// Complete APP1 segment carrying `tiff`
pub(crate) fn exif_segment(tiff: &[u8]) -> Vec<u8> {
    let mut payload = EXIF_SIGNATURE.to_vec();
    payload.extend_from_slice(tiff);
    segment(0xE1, &payload)
}
