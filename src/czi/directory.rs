//! Parsing of `DirectoryEntryDV` records out of the subblock directory
//! segment, and the dimension-character dispatch table.

use crate::error::{CziError, DataError};
use crate::io::{read_f32_le, read_i32_le, read_i64_le};

use super::segment::DIMENSION_ENTRY_SIZE;
use super::subblock::{Compression, PixelType, Subblock};

/// One parsed `DimensionEntryDV` record: a single dimension's extent for one
/// subblock (e.g. `'X'`, size 512, start_coordinate 0.0).
#[derive(Debug, Clone, Copy)]
pub struct DimensionEntry {
    pub dimension: char,
    pub start: i32,
    pub size: i32,
    pub start_coordinate: f32,
    pub stored_size: i32,
}

fn parse_dimension_entry(buf: &[u8]) -> Result<DimensionEntry, CziError> {
    let dimension = buf[0] as char;
    let start = read_i32_le(&buf[4..8]);
    let size = read_i32_le(&buf[8..12]);
    let start_coordinate = read_f32_le(&buf[12..16]);
    let stored_size = read_i32_le(&buf[16..20]);

    if size < 0 {
        return Err(DataError::InvalidDimensionSize {
            dimension,
            stored_size: size,
        }
        .into());
    }

    Ok(DimensionEntry {
        dimension,
        start,
        size,
        start_coordinate,
        stored_size,
    })
}

/// Parse one `DirectoryEntryDV` (32-byte fixed prefix followed by
/// `dimension_count` 20-byte `DimensionEntryDV` records) and fold it, along
/// with the caller-supplied scene/size lookups, into a [`Subblock`].
pub fn parse_directory_entry(buf: &[u8]) -> Result<(Subblock, usize), CziError> {
    if buf.len() < 32 {
        return Err(DataError::TrailingDirectoryBytes {
            expected: 32,
            trailing: buf.len(),
        }
        .into());
    }

    let pixel_type = PixelType::from_code(read_i32_le(&buf[2..6]))?;
    let file_pos = read_i64_le(&buf[6..14]);
    let _file_part = read_i32_le(&buf[14..18]);
    let compression = Compression::from_code(read_i32_le(&buf[18..22]))?;
    let _pyramid_type = buf[22];
    let dimension_count = read_i32_le(&buf[24..28]) as usize;

    let mut offset = 32;
    let mut x = 0i32;
    let mut y = 0i32;
    let mut w = 0u32;
    let mut h = 0u32;
    let mut z = 0i32;
    let mut scene = -1i8;
    let mut downsample_x = 1i64;
    let mut has_x = false;
    let mut has_y = false;

    for _ in 0..dimension_count {
        let end = offset + DIMENSION_ENTRY_SIZE;
        if end > buf.len() {
            return Err(DataError::TrailingDirectoryBytes {
                expected: end as u32,
                trailing: buf.len(),
            }
            .into());
        }
        let entry = parse_dimension_entry(&buf[offset..end])?;
        offset = end;

        match entry.dimension {
            // `size` is the dimension's level-0 footprint; `stored_size` is
            // the actual pixel count in the encoded buffer. Their ratio is
            // the subblock's pyramid downsample factor. `x`/`y` stay in
            // level-0 coordinates here; origin adjustment and per-level
            // downsample division happen once the full subblock set is known.
            'X' => {
                if entry.stored_size <= 0 {
                    return Err(DataError::InvalidDimensionSize {
                        dimension: 'X',
                        stored_size: entry.stored_size,
                    }
                    .into());
                }
                x = entry.start;
                w = entry.stored_size as u32;
                has_x = true;
                downsample_x = (entry.size as i64).max(1) / (entry.stored_size as i64);
            }
            'Y' => {
                if entry.stored_size <= 0 {
                    return Err(DataError::InvalidDimensionSize {
                        dimension: 'Y',
                        stored_size: entry.stored_size,
                    }
                    .into());
                }
                y = entry.start;
                h = entry.stored_size as u32;
                has_y = true;
            }
            'M' => z = entry.start,
            'S' => scene = entry.start as i8,
            // C (channel) must stay at 0 for this reader's pixel model.
            'C' => {
                if entry.start != 0 {
                    return Err(DataError::NonZeroChannel(entry.start).into());
                }
            }
            _ => return Err(DataError::UnknownDimension(entry.dimension).into()),
        }
    }

    if !has_x {
        return Err(DataError::MissingDimension { dimension: 'X' }.into());
    }
    if !has_y {
        return Err(DataError::MissingDimension { dimension: 'Y' }.into());
    }

    let downsample_i = downsample_x.max(1);
    let subblock = Subblock {
        file_pos,
        downsample_i,
        pixel_type,
        compression,
        x,
        y,
        z,
        w,
        h,
        scene,
    };

    Ok((subblock, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_dim(dim: char, start: i32, size: i32) -> Vec<u8> {
        let mut buf = vec![0u8; 20];
        buf[0] = dim as u8;
        buf[4..8].copy_from_slice(&start.to_le_bytes());
        buf[8..12].copy_from_slice(&size.to_le_bytes());
        buf[12..16].copy_from_slice(&0.0f32.to_le_bytes());
        buf[16..20].copy_from_slice(&size.to_le_bytes());
        buf
    }

    fn encode_directory_entry(
        pixel_type: i32,
        file_pos: i64,
        compression: i32,
        dims: &[(char, i32, i32)],
    ) -> Vec<u8> {
        let mut buf = vec![0u8; 32];
        buf[0..2].copy_from_slice(b"DV");
        buf[2..6].copy_from_slice(&pixel_type.to_le_bytes());
        buf[6..14].copy_from_slice(&file_pos.to_le_bytes());
        buf[14..18].copy_from_slice(&0i32.to_le_bytes());
        buf[18..22].copy_from_slice(&compression.to_le_bytes());
        buf[24..28].copy_from_slice(&(dims.len() as i32).to_le_bytes());
        for (d, start, size) in dims {
            buf.extend_from_slice(&encode_dim(*d, *start, *size));
        }
        buf
    }

    #[test]
    fn test_parse_simple_entry() {
        let buf = encode_directory_entry(
            3,
            1000,
            0,
            &[('X', 0, 512), ('Y', 0, 256), ('C', 0, 1)],
        );
        let (subblock, consumed) = parse_directory_entry(&buf).unwrap();
        assert_eq!(subblock.file_pos, 1000);
        assert_eq!(subblock.w, 512);
        assert_eq!(subblock.h, 256);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_nonzero_channel_rejected() {
        let buf = encode_directory_entry(3, 0, 0, &[('X', 0, 8), ('Y', 0, 8), ('C', 1, 1)]);
        let err = parse_directory_entry(&buf).unwrap_err();
        assert!(matches!(
            err,
            CziError::Data(DataError::NonZeroChannel(1))
        ));
    }

    #[test]
    fn test_scene_dimension_captured() {
        let buf = encode_directory_entry(
            3,
            0,
            0,
            &[('X', 0, 8), ('Y', 0, 8), ('S', 2, 1)],
        );
        let (subblock, _) = parse_directory_entry(&buf).unwrap();
        assert_eq!(subblock.scene, 2);
    }

    #[test]
    fn test_truncated_entry_errors() {
        let mut buf = encode_directory_entry(3, 0, 0, &[('X', 0, 8)]);
        buf.truncate(buf.len() - 5);
        let err = parse_directory_entry(&buf).unwrap_err();
        assert!(matches!(
            err,
            CziError::Data(DataError::TrailingDirectoryBytes { .. })
        ));
    }

    #[test]
    fn test_missing_x_dimension_rejected() {
        let buf = encode_directory_entry(3, 0, 0, &[('Y', 0, 8)]);
        let err = parse_directory_entry(&buf).unwrap_err();
        assert!(matches!(
            err,
            CziError::Data(DataError::MissingDimension { dimension: 'X' })
        ));
    }

    #[test]
    fn test_missing_y_dimension_rejected() {
        let buf = encode_directory_entry(3, 0, 0, &[('X', 0, 8)]);
        let err = parse_directory_entry(&buf).unwrap_err();
        assert!(matches!(
            err,
            CziError::Data(DataError::MissingDimension { dimension: 'Y' })
        ));
    }

    #[test]
    fn test_mosaic_dimension_sets_z_not_zeta() {
        let buf = encode_directory_entry(
            3,
            0,
            0,
            &[('X', 0, 8), ('Y', 0, 8), ('M', 3, 1)],
        );
        let (subblock, _) = parse_directory_entry(&buf).unwrap();
        assert_eq!(subblock.z, 3);
    }

    #[test]
    fn test_downsample_computed_from_stored_size_ratio() {
        let mut buf = vec![0u8; 32];
        buf[0..2].copy_from_slice(b"DV");
        buf[2..6].copy_from_slice(&3i32.to_le_bytes());
        buf[24..28].copy_from_slice(&2i32.to_le_bytes());

        let mut dim_x = vec![0u8; 20];
        dim_x[0] = b'X';
        dim_x[8..12].copy_from_slice(&2048i32.to_le_bytes()); // size (level-0 extent)
        dim_x[16..20].copy_from_slice(&512i32.to_le_bytes()); // stored_size
        buf.extend_from_slice(&dim_x);

        let mut dim_y = vec![0u8; 20];
        dim_y[0] = b'Y';
        dim_y[8..12].copy_from_slice(&1024i32.to_le_bytes());
        dim_y[16..20].copy_from_slice(&256i32.to_le_bytes());
        buf.extend_from_slice(&dim_y);

        let (subblock, _) = parse_directory_entry(&buf).unwrap();
        assert_eq!(subblock.downsample_i, 4);
        assert_eq!(subblock.w, 512);
        assert_eq!(subblock.h, 256);
    }

    #[test]
    fn test_unknown_dimension_rejected() {
        let buf = encode_directory_entry(3, 0, 0, &[('X', 0, 8), ('Y', 0, 8), ('T', 0, 1)]);
        let err = parse_directory_entry(&buf).unwrap_err();
        assert!(matches!(
            err,
            CziError::Data(DataError::UnknownDimension('T'))
        ));
    }

    #[test]
    fn test_zero_stored_size_x_rejected() {
        let mut buf = vec![0u8; 32];
        buf[0..2].copy_from_slice(b"DV");
        buf[2..6].copy_from_slice(&3i32.to_le_bytes());
        buf[24..28].copy_from_slice(&1i32.to_le_bytes());

        let mut dim_x = vec![0u8; 20];
        dim_x[0] = b'X';
        dim_x[8..12].copy_from_slice(&8i32.to_le_bytes()); // size
        dim_x[16..20].copy_from_slice(&0i32.to_le_bytes()); // stored_size
        buf.extend_from_slice(&dim_x);

        let err = parse_directory_entry(&buf).unwrap_err();
        assert!(matches!(
            err,
            CziError::Data(DataError::InvalidDimensionSize {
                dimension: 'X',
                stored_size: 0
            })
        ));
    }

    #[test]
    fn test_unsupported_pixel_type_rejected() {
        let buf = encode_directory_entry(99, 0, 0, &[]);
        let err = parse_directory_entry(&buf).unwrap_err();
        assert!(matches!(
            err,
            CziError::Data(DataError::UnsupportedPixelType(99))
        ));
    }
}
