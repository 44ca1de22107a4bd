use std::collections::{HashMap, HashSet};

use crate::error::CziError;

use super::{PaintSink, Region};

#[derive(Debug, Clone, Copy)]
struct RangeTileData {
    id: i64,
    x: i64,
    y: i64,
    w: u32,
    h: u32,
    z: i32,
}

fn bin_range(start: i64, len: i64, bin_size: i64) -> (i64, i64) {
    let first = start.div_euclid(bin_size);
    let last = (start + len - 1).div_euclid(bin_size);
    (first, last)
}

/// Mutable, bin-indexed builder for overlapping mosaic tiles.
///
/// `add_tile` pushes a reference into every coarse bin the tile's rectangle
/// intersects; [`RangeGridBuilder::finish_adding_tiles`] freezes those bins
/// into the read-only representation `RangeGrid::paint_region` queries.
/// Built and frozen are distinct types: there is no way to call
/// `paint_region` before freezing, or `add_tile` after.
pub struct RangeGridBuilder {
    bin_size: i64,
    tiles: Vec<RangeTileData>,
    init_bins: HashMap<(i64, i64), Vec<usize>>,
}

impl RangeGridBuilder {
    /// `bin_size` should be roughly `3 * typical_tile_dim`, per the design note.
    pub fn new(bin_size: i64) -> Self {
        Self {
            bin_size: bin_size.max(1),
            tiles: Vec::new(),
            init_bins: HashMap::new(),
        }
    }

    /// Add a tile and return its id.
    pub fn add_tile(&mut self, x: i64, y: i64, w: u32, h: u32, z: i32) -> i64 {
        let id = self.tiles.len() as i64;
        let index = self.tiles.len();
        self.tiles.push(RangeTileData { id, x, y, w, h, z });

        let (col_start, col_end) = bin_range(x, w as i64, self.bin_size);
        let (row_start, row_end) = bin_range(y, h as i64, self.bin_size);
        for row in row_start..=row_end {
            for col in col_start..=col_end {
                self.init_bins.entry((col, row)).or_default().push(index);
            }
        }
        id
    }

    pub fn finish_adding_tiles(self) -> RangeGrid {
        let bounds = if self.tiles.is_empty() {
            (0, 0, 0, 0)
        } else {
            let min_x = self.tiles.iter().map(|t| t.x).min().unwrap();
            let min_y = self.tiles.iter().map(|t| t.y).min().unwrap();
            let max_x = self.tiles.iter().map(|t| t.x + t.w as i64).max().unwrap();
            let max_y = self.tiles.iter().map(|t| t.y + t.h as i64).max().unwrap();
            (min_x, min_y, max_x - min_x, max_y - min_y)
        };

        RangeGrid {
            bin_size: self.bin_size,
            tiles: self.tiles,
            bins: self.init_bins,
            bounds,
        }
    }
}

/// Frozen, read-only bin-indexed grid.
pub struct RangeGrid {
    bin_size: i64,
    tiles: Vec<RangeTileData>,
    bins: HashMap<(i64, i64), Vec<usize>>,
    bounds: (i64, i64, i64, i64),
}

impl RangeGrid {
    pub fn bounds(&self) -> (i64, i64, i64, i64) {
        self.bounds
    }

    pub async fn paint_region(
        &self,
        sink: &mut dyn PaintSink,
        region: Region,
    ) -> Result<(), CziError> {
        if region.w <= 0 || region.h <= 0 || self.tiles.is_empty() {
            return Ok(());
        }

        let (col_start, col_end) = bin_range(region.x, region.w, self.bin_size);
        let (row_start, row_end) = bin_range(region.y, region.h, self.bin_size);

        let mut candidates: HashSet<usize> = HashSet::new();
        for row in row_start..=row_end {
            for col in col_start..=col_end {
                if let Some(indices) = self.bins.get(&(col, row)) {
                    candidates.extend(indices.iter().copied());
                }
            }
        }

        let mut visible: Vec<&RangeTileData> = candidates
            .into_iter()
            .map(|i| &self.tiles[i])
            .filter(|t| region.intersects(t.x, t.y, t.w as i64, t.h as i64))
            .collect();

        // Back-to-front: decreasing y, then decreasing x; z breaks ties
        // between tiles at (roughly) the same position, higher z last.
        visible.sort_by(|a, b| {
            b.y.cmp(&a.y)
                .then_with(|| b.x.cmp(&a.x))
                .then_with(|| a.z.cmp(&b.z))
        });

        for tile in visible {
            sink.paint_tile(tile.id, tile.x - region.x, tile.y - region.y, tile.w, tile.h)
                .await?;
        }
        Ok(())
    }
}
