//! Codec façade: turns compressed subblock bytes into an ARGB32 buffer.
//!
//! Every `(compression, pixel_type)` pair the CZI format can declare for a
//! subblock is dispatched here. Unknown or unimplemented combinations are a
//! [`DataError::UnsupportedCompression`]/[`DataError::UnsupportedPixelType`],
//! never a silent fallback.

mod pack;
mod zstd_codec;

use crate::czi::subblock::{Compression, PixelType};
use crate::error::CziError;

/// A decoded tile: premultiplied ARGB32 pixels, row-major, stride `width * 4`.
#[derive(Debug, Clone)]
pub struct Argb32Buffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub struct DecodeParams<'a> {
    pub compression: Compression,
    pub pixel_type: PixelType,
    pub src: &'a [u8],
    pub expected_w: u32,
    pub expected_h: u32,
}

/// Decode one subblock's compressed pixel bytes into an ARGB32 buffer.
pub fn decode_tile(params: DecodeParams<'_>) -> Result<Argb32Buffer, CziError> {
    let DecodeParams {
        compression,
        pixel_type,
        src,
        expected_w,
        expected_h,
    } = params;

    tracing::trace!(?compression, ?pixel_type, expected_w, expected_h, "decoding tile");

    let pixel_bytes = match compression {
        Compression::None => src.to_vec(),
        Compression::Zstd0 => zstd_codec::decompress_v0(src, expected_w, expected_h, pixel_type)
            .map_err(|e| log_decode_error(e, "zstd v0 decompress failed"))?,
        Compression::Zstd1 => zstd_codec::decompress_v1(src, expected_w, expected_h, pixel_type)
            .map_err(|e| log_decode_error(e, "zstd v1 decompress failed"))?,
    };

    let pixels = match pixel_type {
        PixelType::Bgr24 => pack::pack_bgr24(&pixel_bytes, expected_w, expected_h)
            .map_err(|e| log_decode_error(e, "bgr24 pack failed"))?,
        PixelType::Bgr48 => pack::pack_bgr48(&pixel_bytes, expected_w, expected_h)
            .map_err(|e| log_decode_error(e, "bgr48 pack failed"))?,
    };

    Ok(Argb32Buffer {
        width: expected_w,
        height: expected_h,
        pixels,
    })
}

fn log_decode_error(err: CziError, context: &str) -> CziError {
    tracing::error!(error = %err, context);
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_uncompressed_bgr24_256x256() {
        let src = vec![0u8; 256 * 256 * 3];
        let buf = decode_tile(DecodeParams {
            compression: Compression::None,
            pixel_type: PixelType::Bgr24,
            src: &src,
            expected_w: 256,
            expected_h: 256,
        })
        .unwrap();

        assert_eq!(buf.width, 256);
        assert_eq!(buf.height, 256);
        assert_eq!(buf.pixels.len(), 256 * 256 * 4);
        assert_eq!(buf.pixels[3], 0xFF); // alpha of first pixel
    }

    #[test]
    fn test_decode_zstd0_bgr24() {
        let raw = vec![7u8; 4 * 4 * 3];
        let compressed = zstd::bulk::compress(&raw, 3).unwrap();
        let buf = decode_tile(DecodeParams {
            compression: Compression::Zstd0,
            pixel_type: PixelType::Bgr24,
            src: &compressed,
            expected_w: 4,
            expected_h: 4,
        })
        .unwrap();
        assert_eq!(buf.pixels.len(), 4 * 4 * 4);
    }
}
