//! Imaging errors
//!
//! These never cross the public extraction or preview entry points; they
//! decide which fields fall back to sentinels and when a preview passes the
//! input through untouched.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Input is not a JPEG stream")]
    NotJpeg,
    #[error("Read of {needed} bytes at offset {offset} exceeds {len}-byte buffer")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },
    #[error("Invalid TIFF header")]
    InvalidTiff,
    #[error("Decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Encode failed: {0}")]
    Encode(String),
}

pub type ImageResult<T> = Result<T, ImageError>;
