//! ZSTD v0 / v1 pixel decompression, including CZI's "HiLo" byte unpacking.

use crate::czi::subblock::PixelType;
use crate::error::{CziError, DataError};

fn pixel_byte_size(pixel_type: PixelType) -> usize {
    match pixel_type {
        PixelType::Bgr24 => 3,
        PixelType::Bgr48 => 6,
    }
}

/// ZSTD v0: the whole slice is a zstd frame, no payload header.
pub fn decompress_v0(
    src: &[u8],
    width: u32,
    height: u32,
    pixel_type: PixelType,
) -> Result<Vec<u8>, CziError> {
    let expected = width as usize * height as usize * pixel_byte_size(pixel_type);
    zstd::bulk::decompress(src, expected)
        .map_err(|e| DataError::Codec(format!("zstd v0 decompress failed: {e}")).into())
}

/// ZSTD v1: a 1- or 3-byte payload header precedes the zstd frame. A 3-byte
/// header whose chunk type is 1 and whose flags byte has bit 0 set means the
/// decompressed bytes are "HiLo" packed and must be unpacked before use.
pub fn decompress_v1(
    src: &[u8],
    width: u32,
    height: u32,
    pixel_type: PixelType,
) -> Result<Vec<u8>, CziError> {
    if src.is_empty() {
        return Err(DataError::SubblockOverflow {
            file_pos: 0,
            needed: 1,
            available: 0,
        }
        .into());
    }

    let header_size = src[0] as usize;
    let (hi_low_pack, payload) = match header_size {
        1 => (false, &src[1..]),
        3 => {
            if src.len() < 3 {
                return Err(DataError::SubblockOverflow {
                    file_pos: 0,
                    needed: 3,
                    available: src.len() as u64,
                }
                .into());
            }
            let chunk_type = src[1];
            let flags = src[2];
            let hi_low_pack = chunk_type == 1 && (flags & 1) != 0;
            (hi_low_pack, &src[3..])
        }
        other => {
            return Err(DataError::Codec(format!(
                "zstd v1 payload header has unsupported size {other}"
            ))
            .into())
        }
    };

    let expected = width as usize * height as usize * pixel_byte_size(pixel_type);
    let decompressed = zstd::bulk::decompress(payload, expected)
        .map_err(|e| DataError::Codec(format!("zstd v1 decompress failed: {e}")))?;

    if hi_low_pack {
        hi_low_unpack(&decompressed)
    } else {
        Ok(decompressed)
    }
}

/// Un-interleave a HiLo-packed buffer: the first half holds the low bytes of
/// each sample, the second half holds the high bytes; the result interleaves
/// them back as `[low0, high0, low1, high1, ...]`.
fn hi_low_unpack(src: &[u8]) -> Result<Vec<u8>, CziError> {
    if src.len() % 2 != 0 {
        return Err(DataError::MalformedHiLo(src.len()).into());
    }
    let half = src.len() / 2;
    let mut out = vec![0u8; src.len()];
    for i in 0..half {
        out[2 * i] = src[i];
        out[2 * i + 1] = src[half + i];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hi_low_unpack_interleaves() {
        let src = [1u8, 2, 3, 10, 20, 30];
        let out = hi_low_unpack(&src).unwrap();
        assert_eq!(out, vec![1, 10, 2, 20, 3, 30]);
    }

    #[test]
    fn test_hi_low_unpack_odd_length_errors() {
        let src = [1u8, 2, 3];
        assert!(hi_low_unpack(&src).is_err());
    }

    #[test]
    fn test_decompress_v0_roundtrip() {
        let raw: Vec<u8> = (0..(4 * 4 * 3)).map(|i| (i % 256) as u8).collect();
        let compressed = zstd::bulk::compress(&raw, 3).unwrap();
        let out = decompress_v0(&compressed, 4, 4, PixelType::Bgr24).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_decompress_v1_without_header_flag() {
        let raw: Vec<u8> = (0..(2 * 2 * 3)).map(|i| (i % 256) as u8).collect();
        let compressed = zstd::bulk::compress(&raw, 3).unwrap();
        let mut src = vec![1u8]; // 1-byte header, no HiLo
        src.extend_from_slice(&compressed);
        let out = decompress_v1(&src, 2, 2, PixelType::Bgr24).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_decompress_v1_with_hi_low_pack() {
        // width=2, height=1, Bgr24 -> 6 expected bytes.
        let packed = [1u8, 2, 3, 10, 20, 30]; // lows then highs, what the frame carries
        let expected_raw = [1u8, 10, 2, 20, 3, 30]; // interleaved result
        let compressed = zstd::bulk::compress(&packed, 3).unwrap();
        let mut src = vec![3u8, 1, 1]; // header_size=3, chunk_type=1, flags bit0 set
        src.extend_from_slice(&compressed);

        let out = decompress_v1(&src, 2, 1, PixelType::Bgr24).unwrap();
        assert_eq!(out, expected_raw);
    }
}
