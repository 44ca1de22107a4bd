use crate::error::{CziError, InternalError};

use super::{PaintSink, Region};

/// A regular array of identically-sized tiles.
///
/// Tile `(col, row)` occupies `[col*tile_w, (col+1)*tile_w) x [row*tile_h,
/// (row+1)*tile_h)`. Tile ids are `row * tiles_across + col`.
pub struct SimpleGrid {
    tiles_across: i64,
    tiles_down: i64,
    tile_w: i64,
    tile_h: i64,
}

impl SimpleGrid {
    pub fn new(tiles_across: i64, tiles_down: i64, tile_w: i64, tile_h: i64) -> Self {
        Self {
            tiles_across,
            tiles_down,
            tile_w,
            tile_h,
        }
    }

    pub fn bounds(&self) -> (i64, i64, i64, i64) {
        (0, 0, self.tiles_across * self.tile_w, self.tiles_down * self.tile_h)
    }

    pub async fn paint_region(
        &self,
        sink: &mut dyn PaintSink,
        region: Region,
    ) -> Result<(), CziError> {
        if self.tile_w <= 0 || self.tile_h <= 0 {
            return Err(InternalError::GridMisaligned {
                x: 0.0,
                y: 0.0,
                adv_x: self.tile_w as f64,
                adv_y: self.tile_h as f64,
            }
            .into());
        }

        if region.w <= 0 || region.h <= 0 {
            return Ok(());
        }

        let start_col = (region.x.div_euclid(self.tile_w)).max(0);
        let start_row = (region.y.div_euclid(self.tile_h)).max(0);
        let end_col = ((region.x + region.w - 1).div_euclid(self.tile_w) + 1).min(self.tiles_across);
        let end_row = ((region.y + region.h - 1).div_euclid(self.tile_h) + 1).min(self.tiles_down);

        if start_col >= end_col || start_row >= end_row {
            return Ok(());
        }

        // Bottom-right to top-left: later tiles never need to paint over
        // earlier ones, but this keeps iteration order uniform with the
        // other two grid variants.
        for row in (start_row..end_row).rev() {
            for col in (start_col..end_col).rev() {
                let tile_x = col * self.tile_w;
                let tile_y = row * self.tile_h;
                let dst_x = tile_x - region.x;
                let dst_y = tile_y - region.y;
                let tile_id = row * self.tiles_across + col;
                sink.paint_tile(tile_id, dst_x, dst_y, self.tile_w as u32, self.tile_h as u32)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct RecordingSink {
        calls: Vec<(i64, i64, i64)>,
    }

    #[async_trait]
    impl PaintSink for RecordingSink {
        async fn paint_tile(
            &mut self,
            tile_id: i64,
            dst_x: i64,
            dst_y: i64,
            _w: u32,
            _h: u32,
        ) -> Result<(), CziError> {
            self.calls.push((tile_id, dst_x, dst_y));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_full_grid_paint() {
        let grid = SimpleGrid::new(2, 2, 256, 256);
        let mut sink = RecordingSink { calls: vec![] };
        grid.paint_region(&mut sink, Region { x: 0, y: 0, w: 512, h: 512 })
            .await
            .unwrap();
        assert_eq!(sink.calls.len(), 4);
        // bottom-right to top-left: tile 3 first, tile 0 last.
        assert_eq!(sink.calls[0].0, 3);
        assert_eq!(sink.calls[3].0, 0);
    }

    #[tokio::test]
    async fn test_partial_query_clamped() {
        let grid = SimpleGrid::new(4, 4, 100, 100);
        let mut sink = RecordingSink { calls: vec![] };
        grid.paint_region(&mut sink, Region { x: 50, y: 50, w: 60, h: 60 })
            .await
            .unwrap();
        // spans tiles (0,0) and (1,1) diagonally plus (0,1)/(1,0)
        assert_eq!(sink.calls.len(), 4);
    }

    #[tokio::test]
    async fn test_query_outside_bounds_paints_nothing() {
        let grid = SimpleGrid::new(2, 2, 256, 256);
        let mut sink = RecordingSink { calls: vec![] };
        grid.paint_region(&mut sink, Region { x: 10_000, y: 10_000, w: 10, h: 10 })
            .await
            .unwrap();
        assert!(sink.calls.is_empty());
    }

    #[tokio::test]
    async fn test_negative_origin_clamped_to_zero() {
        let grid = SimpleGrid::new(2, 2, 256, 256);
        let mut sink = RecordingSink { calls: vec![] };
        grid.paint_region(&mut sink, Region { x: -100, y: -100, w: 356, h: 356 })
            .await
            .unwrap();
        // should still enumerate tile (0,0) and its neighbours, clamped.
        assert!(!sink.calls.is_empty());
    }
}
