//! The `Slide` object: an opened CZI, its pyramid, and paint orchestration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{TileCache, TileFingerprint};
use crate::codec::Argb32Buffer;
use crate::config::{CacheConfig, DebugFlags, GridConfig};
use crate::czi::subblock::Subblock;
use crate::czi::{open_czi, read_subblock_pixels, AssociatedImageData, CziDocument};
use crate::error::{CziError, DataError, InternalError};
use crate::grid::{Grid, PaintSink, Region, RangeGridBuilder};
use crate::io::{LocalFileReader, RangeReader};
use crate::property::PropertyTable;

use super::associated_image::AssociatedImage;
use super::level::{Level, LevelInfo};

/// An opened CZI slide: properties, pyramid levels, associated images, and
/// the decoded-tile cache backing `paint_region`.
pub struct Slide<R: RangeReader> {
    reader: Arc<R>,
    properties: PropertyTable,
    levels: Vec<Level>,
    associated_images: HashMap<String, AssociatedImage>,
    cache: Arc<TileCache>,
    quickhash: String,
    debug: DebugFlags,
}

impl Slide<LocalFileReader> {
    /// Open a `.czi` file on the local filesystem with default tuning.
    #[tracing::instrument(skip_all, fields(path))]
    pub async fn open(path: impl Into<String>) -> Result<Self, CziError> {
        let path = path.into();
        tracing::Span::current().record("path", &path.as_str());
        let reader = LocalFileReader::open(path).await?;
        Self::from_reader(reader, CacheConfig::default(), GridConfig::default()).await
    }
}

impl<R: RangeReader> Slide<R> {
    /// Open a slide from any byte source, with explicit cache/grid tuning.
    #[tracing::instrument(skip_all)]
    pub async fn from_reader(
        reader: R,
        cache_config: CacheConfig,
        grid_config: GridConfig,
    ) -> Result<Self, CziError> {
        let reader = Arc::new(reader);
        let doc = open_czi(reader.as_ref()).await.map_err(|e| {
            tracing::error!(error = %e, "failed to open CZI document");
            e
        })?;
        let levels = build_levels(&doc, &grid_config).map_err(|e| {
            tracing::error!(error = %e, "failed to build pyramid levels");
            e
        })?;
        let associated_images = build_associated_images(doc.associated_images);

        // The cache must hold at least two decoded tiles at the pyramid's
        // largest tile size, regardless of what the caller's config asked
        // for, chosen once here since only the opened pyramid knows its
        // tile geometry.
        let max_tile_w = levels.iter().map(|l| l.info.tile_width).max().unwrap_or(0) as u32;
        let max_tile_h = levels.iter().map(|l| l.info.tile_height).max().unwrap_or(0) as u32;
        let budget_bytes = cache_config
            .budget_bytes
            .max(CacheConfig::for_level(max_tile_w, max_tile_h).budget_bytes);
        let cache = Arc::new(TileCache::with_budget(budget_bytes));

        tracing::debug!(
            nlevels = levels.len(),
            nassociated = associated_images.len(),
            budget_bytes,
            "slide opened"
        );

        Ok(Self {
            reader,
            properties: doc.properties,
            levels,
            associated_images,
            cache,
            quickhash: doc.quickhash,
            debug: DebugFlags::from_env(),
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level_info(&self, level: usize) -> Option<LevelInfo> {
        self.levels.get(level).map(|l| l.info)
    }

    pub fn dimensions(&self) -> Option<(i64, i64)> {
        self.levels.first().map(|l| (l.info.width, l.info.height))
    }

    pub fn properties(&self) -> &PropertyTable {
        &self.properties
    }

    pub fn quickhash(&self) -> &str {
        &self.quickhash
    }

    pub fn associated_image(&self, name: &str) -> Option<&AssociatedImage> {
        self.associated_images.get(name)
    }

    pub fn associated_image_names(&self) -> impl Iterator<Item = &str> {
        self.associated_images.keys().map(String::as_str)
    }

    /// Decode and composite the tiles covering `(x, y, w, h)` at `level`
    /// into a single packed ARGB32 buffer, back-to-front per the grid's
    /// paint order.
    #[tracing::instrument(skip(self), fields(level, x, y, w, h))]
    pub async fn paint_region(
        &self,
        level: usize,
        x: i64,
        y: i64,
        w: i64,
        h: i64,
    ) -> Result<Argb32Buffer, CziError> {
        let level_data = self.levels.get(level).ok_or_else(|| {
            let err = DataError::LevelOutOfRange {
                level,
                nlevels: self.levels.len(),
            };
            tracing::error!(error = %err, "paint_region: level out of range");
            err
        })?;

        let mut out = Argb32Buffer {
            width: w.max(0) as u32,
            height: h.max(0) as u32,
            pixels: vec![0u8; (w.max(0) * h.max(0) * 4) as usize],
        };

        let mut sink = BlitSink {
            reader: self.reader.as_ref(),
            cache: self.cache.as_ref(),
            level_identity: level,
            subblocks: &level_data.subblocks,
            region_x: x,
            region_y: y,
            out: &mut out,
            log_tiles: self.debug.tiles,
        };

        level_data
            .grid
            .paint_region(&mut sink, Region { x, y, w, h })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "paint_region: grid paint failed");
                e
            })?;

        Ok(out)
    }
}

/// Bridges grid paint callbacks to cache lookups and ARGB32 compositing.
struct BlitSink<'a, R: RangeReader> {
    reader: &'a R,
    cache: &'a TileCache,
    level_identity: usize,
    subblocks: &'a [Subblock],
    region_x: i64,
    region_y: i64,
    out: &'a mut Argb32Buffer,
    log_tiles: bool,
}

#[async_trait]
impl<'a, R: RangeReader> PaintSink for BlitSink<'a, R> {
    async fn paint_tile(
        &mut self,
        tile_id: i64,
        dst_x: i64,
        dst_y: i64,
        _w: u32,
        _h: u32,
    ) -> Result<(), CziError> {
        let subblock = self
            .subblocks
            .get(tile_id as usize)
            .ok_or(InternalError::UnknownTileId(tile_id))?;

        let fingerprint = TileFingerprint::new(self.level_identity, tile_id, subblock.z);
        if self.log_tiles {
            tracing::trace!(tile_id, dst_x, dst_y, "painting tile");
        }
        let reader = self.reader;
        let entry = self
            .cache
            .get_or_decode(fingerprint, || async move {
                read_subblock_pixels(reader, subblock).await
            })
            .await?;

        blit(&entry, dst_x, dst_y, self.out);
        Ok(())
    }
}

/// Copy `src`'s pixels into `out` at `(dst_x, dst_y)`, clipping to both
/// buffers' bounds. `dst_x`/`dst_y` can be negative when the tile spills
/// past the top-left of the requested region.
fn blit(src: &Argb32Buffer, dst_x: i64, dst_y: i64, out: &mut Argb32Buffer) {
    let out_w = out.width as i64;
    let out_h = out.height as i64;
    let src_w = src.width as i64;
    let src_h = src.height as i64;

    let copy_w = (src_w + dst_x.min(0)).min(out_w - dst_x.max(0));
    let copy_h = (src_h + dst_y.min(0)).min(out_h - dst_y.max(0));
    if copy_w <= 0 || copy_h <= 0 {
        return;
    }

    let src_x0 = (-dst_x).max(0);
    let src_y0 = (-dst_y).max(0);
    let out_x0 = dst_x.max(0);
    let out_y0 = dst_y.max(0);

    for row in 0..copy_h {
        let src_row_start = ((src_y0 + row) * src_w + src_x0) as usize * 4;
        let out_row_start = ((out_y0 + row) * out_w + out_x0) as usize * 4;
        let len = copy_w as usize * 4;
        out.pixels[out_row_start..out_row_start + len]
            .copy_from_slice(&src.pixels[src_row_start..src_row_start + len]);
    }
}

fn build_levels(doc: &CziDocument, grid_config: &GridConfig) -> Result<Vec<Level>, CziError> {
    // Scene 0 (or the scene-agnostic sentinel, scene < 0) is treated as the
    // slide; other scenes are discoverable via properties but not painted.
    // Levels coarser than max_downsample are dropped so every scene's
    // pyramid could retain the same level count (short-scene elimination).
    let mut by_downsample: HashMap<i64, Vec<Subblock>> = HashMap::new();
    for subblock in &doc.subblocks {
        let downsample_i = subblock.downsample_i;
        if downsample_i <= 0 || downsample_i & (downsample_i - 1) != 0 {
            return Err(DataError::NonPowerOfTwoDownsample(downsample_i).into());
        }
        if subblock.scene > 0 || subblock.downsample_i > doc.max_downsample {
            continue;
        }
        by_downsample
            .entry(subblock.downsample_i)
            .or_default()
            .push(subblock.clone());
    }

    if by_downsample.is_empty() {
        return Err(DataError::NoLevels.into());
    }

    let mut downsamples: Vec<i64> = by_downsample.keys().copied().collect();
    downsamples.sort_unstable();

    let mut levels = Vec::with_capacity(downsamples.len());
    for downsample in downsamples {
        let subblocks = by_downsample.remove(&downsample).unwrap();
        let tile_w = subblocks.iter().map(|s| s.w as i64).max().unwrap_or(0);
        let tile_h = subblocks.iter().map(|s| s.h as i64).max().unwrap_or(0);

        let mut builder = RangeGridBuilder::new(grid_config.bin_size);
        for subblock in &subblocks {
            // `subblock.x`/`y` are level-0, origin-adjusted; divide by this
            // level's downsample to get the level-local grid placement.
            builder.add_tile(
                subblock.x as i64 / downsample,
                subblock.y as i64 / downsample,
                subblock.w,
                subblock.h,
                subblock.z,
            );
        }
        let grid = builder.finish_adding_tiles();
        let (_, _, width, height) = grid.bounds();

        levels.push(Level {
            info: LevelInfo {
                width,
                height,
                tile_width: tile_w,
                tile_height: tile_h,
                downsample: downsample as f64,
            },
            grid: Grid::Range(grid),
            subblocks,
        });
    }

    Ok(levels)
}

fn build_associated_images(
    images: Vec<AssociatedImageData>,
) -> HashMap<String, AssociatedImage> {
    images
        .into_iter()
        .map(|img| {
            let width = img.buffer.width;
            let height = img.buffer.height;
            (
                img.name,
                AssociatedImage {
                    width,
                    height,
                    buffer: Arc::new(img.buffer),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::czi::subblock::{Compression, PixelType};

    fn subblock(downsample_i: i64) -> Subblock {
        Subblock {
            file_pos: 0,
            downsample_i,
            pixel_type: PixelType::Bgr24,
            compression: Compression::None,
            x: 0,
            y: 0,
            z: 0,
            w: 8,
            h: 8,
            scene: -1,
        }
    }

    #[test]
    fn test_build_levels_rejects_non_power_of_two_downsample() {
        let doc = CziDocument {
            properties: PropertyTable::new(),
            subblocks: vec![subblock(3)],
            metadata: Default::default(),
            nscene: 1,
            max_downsample: 3,
            associated_images: Vec::new(),
            quickhash: String::new(),
        };
        let err = build_levels(&doc, &GridConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            CziError::Data(DataError::NonPowerOfTwoDownsample(3))
        ));
    }

    #[test]
    fn test_blit_fully_inside() {
        let src = Argb32Buffer {
            width: 2,
            height: 2,
            pixels: vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16],
        };
        let mut out = Argb32Buffer {
            width: 4,
            height: 4,
            pixels: vec![0u8; 4 * 4 * 4],
        };
        blit(&src, 1, 1, &mut out);
        let row1_start = (1 * 4 + 1) * 4;
        assert_eq!(&out.pixels[row1_start..row1_start + 4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_blit_clips_negative_offset() {
        let src = Argb32Buffer {
            width: 2,
            height: 1,
            pixels: vec![9, 9, 9, 9, 5, 5, 5, 5],
        };
        let mut out = Argb32Buffer {
            width: 1,
            height: 1,
            pixels: vec![0u8; 4],
        };
        blit(&src, -1, 0, &mut out);
        assert_eq!(&out.pixels[0..4], &[5, 5, 5, 5]);
    }

    #[test]
    fn test_blit_clips_past_right_edge() {
        let src = Argb32Buffer {
            width: 2,
            height: 1,
            pixels: vec![1, 1, 1, 1, 2, 2, 2, 2],
        };
        let mut out = Argb32Buffer {
            width: 1,
            height: 1,
            pixels: vec![0u8; 4],
        };
        blit(&src, 0, 0, &mut out);
        assert_eq!(&out.pixels[0..4], &[1, 1, 1, 1]);
    }
}
