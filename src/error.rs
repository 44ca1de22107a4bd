use thiserror::Error;

/// The three error kinds a caller needs to distinguish.
///
/// `Io` means the byte source itself failed; `Data` means the bytes were
/// read successfully but violate the CZI format; `Internal` means an
/// invariant the rest of this crate relies on was violated and should be
/// unreachable in a correctly-formed slide.
#[derive(Debug, Error)]
pub enum CziError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// I/O errors from the underlying byte source.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Requested range exceeds the resource's size.
    #[error("range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Opening the backing file failed.
    #[error("failed to open {path}: {message}")]
    Open { path: String, message: String },

    /// A positional read returned fewer bytes than requested, or failed outright.
    #[error("short read at offset {offset}: {message}")]
    Read { offset: u64, message: String },
}

/// Errors raised when bytes were read but violate the CZI format.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("missing ZISRAWFILE magic at offset {offset}")]
    BadMagic { offset: u64 },

    #[error("unexpected segment id {found:?} at offset {offset}, expected {expected}")]
    UnexpectedSegment {
        found: String,
        expected: &'static str,
        offset: u64,
    },

    #[error("directory entry is missing required dimension '{dimension}'")]
    MissingDimension { dimension: char },

    #[error("dimension '{dimension}' has non-positive stored size {stored_size}")]
    InvalidDimensionSize { dimension: char, stored_size: i32 },

    #[error("unknown dimension character '{0}'")]
    UnknownDimension(char),

    #[error("scene index {scene} out of range [0, {nscene})")]
    SceneOutOfRange { scene: i32, nscene: i32 },

    #[error("level {level} out of range [0, {nlevels})")]
    LevelOutOfRange { level: usize, nlevels: usize },

    #[error("channel dimension must be 0, got {0}")]
    NonZeroChannel(i32),

    #[error("unsupported pixel type {0}")]
    UnsupportedPixelType(i32),

    #[error("unsupported compression: {name}")]
    UnsupportedCompression { name: String },

    #[error("malformed HiLo payload: odd pixel byte length {0}")]
    MalformedHiLo(usize),

    #[error("directory has {trailing} trailing bytes after {expected} entries")]
    TrailingDirectoryBytes { expected: u32, trailing: usize },

    #[error("subblock at {file_pos} needs {needed} bytes but only {available} are allocated")]
    SubblockOverflow {
        file_pos: i64,
        needed: u64,
        available: u64,
    },

    #[error("attachment '{name}' declares unsupported file type '{file_type}'")]
    UnsupportedAttachment { name: String, file_type: String },

    #[error("embedded CZI attachment '{name}' must contain exactly one subblock, found {count}")]
    EmbeddedSubblockCount { name: String, count: usize },

    #[error("metadata XML is not valid UTF-8: {0}")]
    InvalidXmlEncoding(String),

    #[error("metadata XML parse error: {0}")]
    XmlParse(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("level downsample {0} is not a power of two")]
    NonPowerOfTwoDownsample(i64),

    #[error("slide has no pyramid levels")]
    NoLevels,
}

/// Invariant violations that should be unreachable for a well-formed slide.
#[derive(Debug, Clone, Error)]
pub enum InternalError {
    #[error("grid misaligned: tile offset ({x}, {y}) exceeds tile advance ({adv_x}, {adv_y})")]
    GridMisaligned {
        x: f64,
        y: f64,
        adv_x: f64,
        adv_y: f64,
    },

    #[error("range grid queried before finish_adding_tiles was called")]
    GridNotFrozen,

    #[error("scene {scene} had no subblocks after population")]
    EmptyScene { scene: i32 },

    #[error("grid produced tile id {0} with no matching subblock")]
    UnknownTileId(i64),
}
