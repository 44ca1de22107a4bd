use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Positioned-read abstraction over a random-access byte source.
///
/// The rest of this crate never opens a file or holds a seek cursor; every
/// read goes through `read_exact_at` with an explicit offset, so two callers
/// can read concurrently without racing on a shared cursor.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Identifier for logging and cache keys (typically the file path).
    fn identifier(&self) -> &str;
}

// CZI is little-endian only; no big-endian helpers are needed.

/// Read a little-endian u16 from a byte slice.
#[inline]
pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

/// Read a little-endian u32 from a byte slice.
#[inline]
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Read a little-endian i32 from a byte slice.
#[inline]
pub fn read_i32_le(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Read a little-endian u64 from a byte slice.
#[inline]
pub fn read_u64_le(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Read a little-endian i64 from a byte slice.
#[inline]
pub fn read_i64_le(bytes: &[u8]) -> i64 {
    i64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Read a little-endian f32 from a byte slice.
#[inline]
pub fn read_f32_le(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
