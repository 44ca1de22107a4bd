use std::os::unix::fs::FileExt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::RangeReader;
use crate::error::IoError;

/// Local-file implementation of [`RangeReader`].
///
/// The file is opened once, at construction, and its size is cached so that
/// `size()` never needs a syscall. Positional reads run on `spawn_blocking`
/// so a slow disk never stalls the async runtime's worker pool; `std::fs`
/// is used rather than `tokio::fs` because `read_at` on a shared `std::fs::File`
/// needs no mutable cursor and is trivially safe to call from many blocking
/// tasks at once.
#[derive(Clone)]
pub struct LocalFileReader {
    file: Arc<std::fs::File>,
    size: u64,
    identifier: String,
}

impl LocalFileReader {
    /// Open `path` and cache its size.
    pub async fn open(path: impl Into<String>) -> Result<Self, IoError> {
        let path = path.into();
        let path_for_blocking = path.clone();

        let (file, size) = tokio::task::spawn_blocking(move || -> Result<_, IoError> {
            let file = std::fs::File::open(&path_for_blocking).map_err(|e| IoError::Open {
                path: path_for_blocking.clone(),
                message: e.to_string(),
            })?;
            let size = file
                .metadata()
                .map_err(|e| IoError::Open {
                    path: path_for_blocking.clone(),
                    message: e.to_string(),
                })?
                .len();
            Ok((file, size))
        })
        .await
        .expect("spawn_blocking panicked opening file")?;

        Ok(Self {
            file: Arc::new(file),
            size,
            identifier: path,
        })
    }
}

#[async_trait]
impl RangeReader for LocalFileReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if offset + len as u64 > self.size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Bytes::new());
        }

        let file = self.file.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = BytesMut::zeroed(len);
            file.read_exact_at(&mut buf, offset)
                .map_err(|e| IoError::Read {
                    offset,
                    message: e.to_string(),
                })?;
            Ok(buf.freeze())
        })
        .await
        .expect("spawn_blocking panicked reading file")
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
