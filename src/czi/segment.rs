//! Generic CZI segment header and the fixed layout constants for each
//! segment kind.

use crate::error::{CziError, DataError, IoError};
use crate::io::{read_i64_le, RangeReader};

pub const SEGMENT_HEADER_SIZE: u64 = 32;
pub const FILE_HEADER_SIZE: u64 = 544;
pub const SUBBLOCK_HEADER_SIZE: u64 = 288;
pub const DIRECTORY_SUBHEADER_SIZE: u64 = 128;
pub const METADATA_SUBHEADER_SIZE: u64 = 256;
pub const ATTACH_HEADER_SIZE: u64 = 256;
pub const ATTACHMENT_ENTRY_SIZE: usize = 128;
pub const DIRECTORY_ENTRY_PREFIX_SIZE: usize = 32;
pub const DIMENSION_ENTRY_SIZE: usize = 20;

pub const SID_FILE: &str = "ZISRAWFILE";
pub const SID_DIRECTORY: &str = "ZISRAWDIRECTORY";
pub const SID_METADATA: &str = "ZISRAWMETADATA";
pub const SID_SUBBLOCK: &str = "ZISRAWSUBBLOCK";
pub const SID_ATTACH: &str = "ZISRAWATTACH";
pub const SID_ATTDIR: &str = "ZISRAWATTDIR";

/// The 32-byte header every segment starts with.
#[derive(Debug, Clone)]
pub struct SegmentHeader {
    pub sid: String,
    pub allocated_size: i64,
    pub used_size: i64,
}

/// Read and parse the generic segment header at `offset`.
pub async fn read_segment_header(
    reader: &dyn RangeReader,
    offset: u64,
) -> Result<SegmentHeader, CziError> {
    let buf = reader
        .read_exact_at(offset, SEGMENT_HEADER_SIZE as usize)
        .await?;

    let sid_bytes = &buf[0..16];
    let sid_len = sid_bytes.iter().position(|&b| b == 0).unwrap_or(16);
    let sid = String::from_utf8_lossy(&sid_bytes[..sid_len]).into_owned();
    let allocated_size = read_i64_le(&buf[16..24]);
    let used_size = read_i64_le(&buf[24..32]);

    Ok(SegmentHeader {
        sid,
        allocated_size,
        used_size,
    })
}

/// Verify a segment's id matches what the caller expects to find there.
pub fn expect_sid(
    header: &SegmentHeader,
    expected: &'static str,
    offset: u64,
) -> Result<(), CziError> {
    if header.sid != expected {
        return Err(DataError::UnexpectedSegment {
            found: header.sid.clone(),
            expected,
            offset,
        }
        .into());
    }
    Ok(())
}

/// Read a bounded-width ASCII field that is *not* null-terminated: trailing
/// null bytes (if any) are trimmed, but the field is otherwise taken at face
/// value for its declared width. Used for attachment entry strings.
pub fn read_fixed_ascii(buf: &[u8]) -> String {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

pub(crate) fn io_bounds_err(offset: u64, requested: u64, size: u64) -> CziError {
    IoError::RangeOutOfBounds {
        offset,
        requested,
        size,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::LocalFileReader;
    use std::io::Write;

    fn encode_header(sid: &str, allocated: i64, used: i64) -> Vec<u8> {
        let mut buf = vec![0u8; 32];
        let sid_bytes = sid.as_bytes();
        buf[..sid_bytes.len()].copy_from_slice(sid_bytes);
        buf[16..24].copy_from_slice(&allocated.to_le_bytes());
        buf[24..32].copy_from_slice(&used.to_le_bytes());
        buf
    }

    #[tokio::test]
    async fn test_read_segment_header() {
        let mut data = encode_header(SID_FILE, 544, 300);
        data.resize(544, 0);
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&data).unwrap();
        let reader = LocalFileReader::open(f.path().to_str().unwrap()).await.unwrap();

        let header = read_segment_header(&reader, 0).await.unwrap();
        assert_eq!(header.sid, "ZISRAWFILE");
        assert_eq!(header.allocated_size, 544);
        assert_eq!(header.used_size, 300);
    }

    #[test]
    fn test_expect_sid_mismatch() {
        let header = SegmentHeader {
            sid: "ZISRAWDIRECTORY".to_string(),
            allocated_size: 0,
            used_size: 0,
        };
        let err = expect_sid(&header, SID_FILE, 0).unwrap_err();
        assert!(matches!(
            err,
            CziError::Data(DataError::UnexpectedSegment { .. })
        ));
    }

    #[test]
    fn test_read_fixed_ascii_trims_nulls() {
        let mut buf = vec![0u8; 8];
        buf[..4].copy_from_slice(b"JPG\0"[..4].as_ref());
        assert_eq!(read_fixed_ascii(&buf), "JPG");
    }
}
