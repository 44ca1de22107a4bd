//! A single pyramid level: its dimensions, tile geometry, and the grid that
//! answers "which tiles cover this region".

use crate::czi::subblock::Subblock;
use crate::grid::Grid;

/// Snapshot of one level's geometry, queryable without touching storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    pub width: i64,
    pub height: i64,
    pub tile_width: i64,
    pub tile_height: i64,
    pub downsample: f64,
}

/// One pyramid level: geometry plus the tiles that cover it.
pub struct Level {
    pub info: LevelInfo,
    pub grid: Grid,
    /// Indexed by tile id, as produced by the grid builder that built `grid`.
    pub subblocks: Vec<Subblock>,
}

impl Level {
    pub fn subblock(&self, tile_id: i64) -> Option<&Subblock> {
        self.subblocks.get(tile_id as usize)
    }
}
