//! # czi-slide
//!
//! A reader for Zeiss CZI whole-slide images: segment/directory parsing,
//! metadata XML flattening, tile decoding, and pyramid-level region
//! painting, built around range-based byte access so a slide never needs
//! to be read into memory wholesale.
//!
//! ## Architecture
//!
//! - [`io`] - range-based byte access (local files today) plus a block cache
//! - [`czi`] - CZI segment/directory/metadata parsing and the subblock pixel reader
//! - [`codec`] - compressed subblock bytes -> ARGB32 buffers
//! - [`grid`] - the tile spatial index and back-to-front paint order
//! - [`cache`] - the bounded, singleflight-protected decoded-tile cache
//! - [`slide`] - the `Slide` type: opened pyramid, associated images, region painting
//! - [`property`] - the read-only property table populated from metadata
//! - [`hash`] - the `openslide.quickhash-1` accumulator
//! - [`config`] - CLI and tunable configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use czi_slide::Slide;
//!
//! #[tokio::main]
//! async fn main() {
//!     let slide = Slide::open("sample.czi").await.expect("open slide");
//!     println!("levels: {}", slide.level_count());
//!     let region = slide.paint_region(0, 0, 0, 256, 256).await.expect("paint region");
//!     println!("decoded {}x{} region", region.width, region.height);
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod czi;
pub mod error;
pub mod grid;
pub mod hash;
pub mod io;
pub mod property;
pub mod slide;

pub use cache::{EntryRef, TileCache, TileFingerprint, DEFAULT_CACHE_SIZE};
pub use codec::{decode_tile, Argb32Buffer, DecodeParams};
pub use config::{CacheConfig, Cli, Command, DebugFlags, GridConfig, DEFAULT_GRID_BIN_SIZE};
pub use czi::{open_czi, read_subblock_pixels, AssociatedImageData, CziDocument, ImageMetadata};
pub use error::{CziError, DataError, InternalError, IoError};
pub use grid::{Grid, PaintSink, RangeGrid, RangeGridBuilder, Region, SimpleGrid, TilemapGrid, TilemapGridBuilder};
pub use hash::HashAccumulator;
pub use io::{LocalFileReader, RangeReader};
pub use property::PropertyTable;
pub use slide::{AssociatedImage, Level, LevelInfo, Slide};
