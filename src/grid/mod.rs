//! The tile grid: a spatial index from level coordinates to the tiles that
//! intersect a query rectangle, in back-to-front paint order.
//!
//! Three variants share one contract. Rather than a trait object (the
//! source format's vendor set is closed and each grid variant has a
//! different internal layout), `Grid` is a tagged union and `paint_region`
//! is a single `match`.

mod range;
mod simple;
mod tilemap;

pub use range::{RangeGrid, RangeGridBuilder};
pub use simple::SimpleGrid;
pub use tilemap::{TilemapGrid, TilemapGridBuilder};

use async_trait::async_trait;

use crate::error::CziError;

/// Receives one call per tile that intersects a painted region, already
/// translated to the tile's destination offset within the query rectangle.
#[async_trait]
pub trait PaintSink: Send {
    /// `tile_id` identifies the tile to the caller (an index into whatever
    /// per-format tile table the grid was built from). `dst_x`/`dst_y` are
    /// the offset, in query-relative pixels, at which the tile's top-left
    /// corner should be composited; `w`/`h` are the tile's pixel dimensions.
    async fn paint_tile(
        &mut self,
        tile_id: i64,
        dst_x: i64,
        dst_y: i64,
        w: u32,
        h: u32,
    ) -> Result<(), CziError>;
}

/// A query rectangle in level coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl Region {
    pub fn intersects(&self, other_x: i64, other_y: i64, other_w: i64, other_h: i64) -> bool {
        self.x < other_x + other_w
            && other_x < self.x + self.w
            && self.y < other_y + other_h
            && other_y < self.y + self.h
    }
}

/// The tagged union of grid variants.
pub enum Grid {
    Simple(SimpleGrid),
    Tilemap(TilemapGrid),
    Range(RangeGrid),
}

impl Grid {
    pub async fn paint_region(
        &self,
        sink: &mut dyn PaintSink,
        region: Region,
    ) -> Result<(), CziError> {
        match self {
            Grid::Simple(g) => g.paint_region(sink, region).await,
            Grid::Tilemap(g) => g.paint_region(sink, region).await,
            Grid::Range(g) => g.paint_region(sink, region).await,
        }
    }

    pub fn bounds(&self) -> (i64, i64, i64, i64) {
        match self {
            Grid::Simple(g) => g.bounds(),
            Grid::Tilemap(g) => g.bounds(),
            Grid::Range(g) => g.bounds(),
        }
    }
}
