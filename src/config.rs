//! Configuration and debug-flag handling.
//!
//! This module provides:
//! - [`DebugFlags`], parsed from `OPENSLIDE_DEBUG` (comma-separated tokens)
//! - [`CacheConfig`] / [`GridConfig`] tunables with sensible defaults
//! - [`Cli`], the thin `clap`-derived argument parser for the binary
//!
//! # Environment Variables
//!
//! - `OPENSLIDE_DEBUG` - comma-separated debug tokens, e.g. `tiles`
//! - `CZI_CACHE_BYTES` - tile cache budget in bytes (default 64 MiB)
//! - `CZI_GRID_BIN_SIZE` - bin size for the mosaic spatial index

use clap::{Parser, Subcommand};

use crate::cache::DEFAULT_CACHE_SIZE;

/// Default bin size for the mosaic `RangeGrid`'s spatial index: roughly
/// `3 * typical_tile_dim` per the design note on coarse bin granularity.
pub const DEFAULT_GRID_BIN_SIZE: i64 = 768;

/// Debug flags recognized in `OPENSLIDE_DEBUG`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    /// Log every tile paint (grid lookup + cache hit/miss) at trace level.
    pub tiles: bool,
}

impl DebugFlags {
    pub fn from_env() -> Self {
        let raw = std::env::var("OPENSLIDE_DEBUG").unwrap_or_default();
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Self {
        let mut flags = DebugFlags::default();
        for token in raw.split(',').map(str::trim) {
            if token == "tiles" {
                flags.tiles = true;
            }
        }
        flags
    }
}

/// Tunables for the decoded-tile cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub budget_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_CACHE_SIZE,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let budget_bytes = std::env::var("CZI_CACHE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CACHE_SIZE);
        Self { budget_bytes }
    }

    /// The default budget for a pyramid whose largest tile is
    /// `max_tile_w x max_tile_h`: enough for two decoded ARGB32 tiles at
    /// that size, or `DEFAULT_CACHE_SIZE`, whichever is larger.
    pub fn for_level(max_tile_w: u32, max_tile_h: u32) -> Self {
        let geometric = 2 * 4 * max_tile_w as u64 * max_tile_h as u64;
        Self {
            budget_bytes: geometric.max(DEFAULT_CACHE_SIZE),
        }
    }
}

/// Tunables for the mosaic grid's spatial index.
#[derive(Debug, Clone, Copy)]
pub struct GridConfig {
    pub bin_size: i64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            bin_size: DEFAULT_GRID_BIN_SIZE,
        }
    }
}

impl GridConfig {
    pub fn from_env() -> Self {
        let bin_size = std::env::var("CZI_GRID_BIN_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_GRID_BIN_SIZE);
        Self { bin_size: bin_size.max(1) }
    }
}

/// czi-slide - inspect and extract regions from Zeiss CZI whole-slide images.
#[derive(Parser, Debug, Clone)]
#[command(name = "czi-slide")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose (debug level) logging.
    #[arg(short, long, default_value_t = false, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print slide properties and pyramid level geometry.
    Info {
        /// Path to the .czi file.
        path: String,
    },
    /// Decode a pixel region from a level and write it out as a PPM image.
    Region {
        /// Path to the .czi file.
        path: String,
        #[arg(long, default_value_t = 0)]
        level: usize,
        #[arg(long)]
        x: i64,
        #[arg(long)]
        y: i64,
        #[arg(long)]
        w: i64,
        #[arg(long)]
        h: i64,
        /// Output PPM path.
        #[arg(long)]
        out: String,
    },
    /// Open the slide and report success/failure without printing anything.
    Check {
        /// Path to the .czi file.
        path: String,
    },
}
