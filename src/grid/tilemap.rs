use std::collections::HashMap;

use crate::error::CziError;

use super::{PaintSink, Region};

#[derive(Debug, Clone, Copy)]
struct TilemapTile {
    id: i64,
    offset_x: i64,
    offset_y: i64,
    w: u32,
    h: u32,
}

/// Mutable builder for a sparse, per-tile-offset grid.
///
/// Tiles are added once during open; [`TilemapGridBuilder::finish`] freezes
/// the grid into a read-only [`TilemapGrid`].
pub struct TilemapGridBuilder {
    tile_advance_x: i64,
    tile_advance_y: i64,
    tiles: HashMap<(i64, i64), TilemapTile>,
    next_id: i64,
    min_x: i64,
    min_y: i64,
    max_x: i64,
    max_y: i64,
}

impl TilemapGridBuilder {
    pub fn new(tile_advance_x: i64, tile_advance_y: i64) -> Self {
        Self {
            tile_advance_x,
            tile_advance_y,
            tiles: HashMap::new(),
            next_id: 0,
            min_x: i64::MAX,
            min_y: i64::MAX,
            max_x: i64::MIN,
            max_y: i64::MIN,
        }
    }

    /// Add (or replace) the tile at grid cell `(col, row)`.
    pub fn add_tile(&mut self, col: i64, row: i64, offset_x: i64, offset_y: i64, w: u32, h: u32) {
        let id = self.next_id;
        self.next_id += 1;

        let abs_x = col * self.tile_advance_x + offset_x;
        let abs_y = row * self.tile_advance_y + offset_y;
        self.min_x = self.min_x.min(abs_x);
        self.min_y = self.min_y.min(abs_y);
        self.max_x = self.max_x.max(abs_x + w as i64);
        self.max_y = self.max_y.max(abs_y + h as i64);

        self.tiles.insert(
            (col, row),
            TilemapTile {
                id,
                offset_x,
                offset_y,
                w,
                h,
            },
        );
    }

    pub fn finish(self) -> TilemapGrid {
        let bounds = if self.tiles.is_empty() {
            (0, 0, 0, 0)
        } else {
            (self.min_x, self.min_y, self.max_x - self.min_x, self.max_y - self.min_y)
        };

        // How many extra grid cells, in each direction, must be scanned to
        // catch a tile whose per-cell offset pushes it outside its nominal
        // cell. Conservative: the largest observed offset magnitude.
        let mut extra_left = 0i64;
        let mut extra_right = 0i64;
        let mut extra_top = 0i64;
        let mut extra_bottom = 0i64;
        for tile in self.tiles.values() {
            if tile.offset_x < 0 {
                extra_left = extra_left.max(div_ceil(-tile.offset_x, self.tile_advance_x.max(1)));
            }
            if tile.offset_x > 0 {
                extra_right = extra_right.max(div_ceil(tile.offset_x, self.tile_advance_x.max(1)));
            }
            if tile.offset_y < 0 {
                extra_top = extra_top.max(div_ceil(-tile.offset_y, self.tile_advance_y.max(1)));
            }
            if tile.offset_y > 0 {
                extra_bottom = extra_bottom.max(div_ceil(tile.offset_y, self.tile_advance_y.max(1)));
            }
        }

        TilemapGrid {
            tile_advance_x: self.tile_advance_x,
            tile_advance_y: self.tile_advance_y,
            tiles: self.tiles,
            bounds,
            extra_left,
            extra_right,
            extra_top,
            extra_bottom,
        }
    }
}

fn div_ceil(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

/// Frozen, read-only sparse grid with per-tile offsets.
pub struct TilemapGrid {
    tile_advance_x: i64,
    tile_advance_y: i64,
    tiles: HashMap<(i64, i64), TilemapTile>,
    bounds: (i64, i64, i64, i64),
    extra_left: i64,
    extra_right: i64,
    extra_top: i64,
    extra_bottom: i64,
}

impl TilemapGrid {
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

        let start_col = region.x.div_euclid(self.tile_advance_x.max(1)) - self.extra_left;
        let end_col =
            (region.x + region.w - 1).div_euclid(self.tile_advance_x.max(1)) + 1 + self.extra_right;
        let start_row = region.y.div_euclid(self.tile_advance_y.max(1)) - self.extra_top;
        let end_row =
            (region.y + region.h - 1).div_euclid(self.tile_advance_y.max(1)) + 1 + self.extra_bottom;

        for row in (start_row..end_row).rev() {
            for col in (start_col..end_col).rev() {
                let Some(tile) = self.tiles.get(&(col, row)) else {
                    continue;
                };
                let abs_x = col * self.tile_advance_x + tile.offset_x;
                let abs_y = row * self.tile_advance_y + tile.offset_y;
                if !region.intersects(abs_x, abs_y, tile.w as i64, tile.h as i64) {
                    continue;
                }
                sink.paint_tile(tile.id, abs_x - region.x, abs_y - region.y, tile.w, tile.h)
                    .await?;
            }
        }
        Ok(())
    }
}
