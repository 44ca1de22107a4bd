//! The `Subblock`: one compressed tile, as described by a directory entry.

use crate::error::{CziError, DataError};

/// Pixel layout declared by a subblock's directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    Bgr24,
    Bgr48,
}

impl PixelType {
    /// CZI pixel-type codes; only the two this crate supports are mapped.
    pub fn from_code(code: i32) -> Result<Self, CziError> {
        match code {
            3 => Ok(PixelType::Bgr24),
            8 => Ok(PixelType::Bgr48),
            other => Err(DataError::UnsupportedPixelType(other).into()),
        }
    }
}

/// Compression scheme declared by a subblock's directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zstd0,
    Zstd1,
}

impl Compression {
    pub fn from_code(code: i32) -> Result<Self, CziError> {
        match code {
            0 => Ok(Compression::None),
            5 => Ok(Compression::Zstd0),
            6 => Ok(Compression::Zstd1),
            1 => Err(DataError::UnsupportedCompression {
                name: "JPEG".to_string(),
            }
            .into()),
            4 => Err(DataError::UnsupportedCompression {
                name: "LZW".to_string(),
            }
            .into()),
            other => Err(DataError::UnsupportedCompression {
                name: format!("code {other}"),
            }
            .into()),
        }
    }
}

/// One tile in a CZI container, as read from the sub-block directory.
#[derive(Debug, Clone)]
pub struct Subblock {
    /// Absolute offset (within the containing byte source) of the
    /// `ZISRAWSUBBLOCK` segment header.
    pub file_pos: i64,
    /// `round_nearest(dim_size / stored_size)`, the power-of-two pyramid level.
    pub downsample_i: i64,
    pub pixel_type: PixelType,
    pub compression: Compression,
    /// Level-0 pixel coordinates, after origin adjustment (shifted so the
    /// minimum-x/minimum-y subblock across the whole file sits at 0). Divide
    /// by `downsample_i` to get this tile's placement within its own level.
    pub x: i32,
    pub y: i32,
    /// Mosaic draw order; higher paints in front.
    pub z: i32,
    /// Stored (post-downsample) pixel dimensions.
    pub w: u32,
    pub h: u32,
    pub scene: i8,
}
