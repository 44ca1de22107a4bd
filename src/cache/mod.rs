//! Decoded-tile cache: a bounded, thread-safe store of ARGB32 tile buffers.

mod tile_cache;

pub use tile_cache::{EntryRef, TileCache, TileFingerprint, DEFAULT_CACHE_SIZE};
