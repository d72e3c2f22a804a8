//! Bounds-checked reads over a TIFF block

use crate::error::{ImageError, ImageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// Reader over a TIFF block. Offsets are relative to the block start, as
/// TIFF offsets are.
#[derive(Debug, Clone, Copy)]
pub struct TiffCursor<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> TiffCursor<'a> {
    /// Read the byte-order marker (`II` or `MM`) heading the block
    pub fn new(data: &'a [u8]) -> ImageResult<Self> {
        if data.len() < 8 {
            return Err(ImageError::Truncated {
                offset: 0,
                needed: 8,
                len: data.len(),
            });
        }

        let order = match &data[..2] {
            b"II" => ByteOrder::LittleEndian,
            b"MM" => ByteOrder::BigEndian,
            _ => return Err(ImageError::InvalidTiff),
        };

        Ok(Self { data, order })
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset of the first image file directory
    pub fn first_ifd_offset(&self) -> ImageResult<usize> {
        self.u32_at(4).map(|v| v as usize)
    }

    pub fn bytes_at(&self, offset: usize, needed: usize) -> ImageResult<&'a [u8]> {
        offset
            .checked_add(needed)
            .filter(|&end| end <= self.data.len())
            .map(|end| &self.data[offset..end])
            .ok_or(ImageError::Truncated {
                offset,
                needed,
                len: self.data.len(),
            })
    }

    pub fn u16_at(&self, offset: usize) -> ImageResult<u16> {
        let b = self.bytes_at(offset, 2)?;
        let raw = [b[0], b[1]];
        Ok(match self.order {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        })
    }

    pub fn u32_at(&self, offset: usize) -> ImageResult<u32> {
        let b = self.bytes_at(offset, 4)?;
        let raw = [b[0], b[1], b[2], b[3]];
        Ok(match self.order {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        })
    }
}
