//! The `Czi` document: top-level open sequence tying segment, directory,
//! and metadata XML parsing together.
//!
//! `open_czi` runs the same seven steps a CZI reader always runs, in order:
//! locate the three directory positions from the file header, read and
//! parse the metadata XML, read the subblock directory (building the
//! in-memory tile list and scene count), validate every scene ended up with
//! at least one subblock, pull associated images out of the attachment
//! directory, and finally fold the primary/file GUIDs and metadata bytes
//! into the quickhash.

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::{decode_tile, Argb32Buffer, DecodeParams};
use crate::error::{CziError, DataError, InternalError, IoError};
use crate::hash::HashAccumulator;
use crate::io::{read_i32_le, read_i64_le, RangeReader};
use crate::property::PropertyTable;

use super::directory::parse_directory_entry;
use super::segment::{
    expect_sid, read_fixed_ascii, read_segment_header, ATTACHMENT_ENTRY_SIZE, ATTACH_HEADER_SIZE,
    DIRECTORY_SUBHEADER_SIZE, METADATA_SUBHEADER_SIZE, SEGMENT_HEADER_SIZE, SID_ATTACH,
    SID_ATTDIR, SID_DIRECTORY, SID_FILE, SID_METADATA, SID_SUBBLOCK,
};
use super::subblock::Subblock;
use super::xml::{parse_metadata_xml, ImageMetadata};

/// An associated (non-pyramid) image: label, preview, or thumbnail.
#[derive(Debug, Clone)]
pub struct AssociatedImageData {
    pub name: String,
    pub buffer: Argb32Buffer,
}

/// Everything `Slide::open` needs, parsed out of one CZI byte source.
pub struct CziDocument {
    pub properties: PropertyTable,
    pub subblocks: Vec<Subblock>,
    pub metadata: ImageMetadata,
    pub nscene: i32,
    /// `min over scenes of (max over that scene's subblocks of downsample_i)`:
    /// the coarsest downsample every scene has coverage at, so every scene's
    /// pyramid could retain the same number of levels. Only `scene <= 0` is
    /// actually painted (see `slide::build_levels`), but all scenes still
    /// bound how many levels are worth keeping.
    pub max_downsample: i64,
    pub associated_images: Vec<AssociatedImageData>,
    pub quickhash: String,
}

struct FileInfo {
    subblk_dir_pos: i64,
    meta_pos: i64,
    att_dir_pos: i64,
    primary_file_guid: [u8; 16],
    file_guid: [u8; 16],
}

pub async fn open_czi(reader: &dyn RangeReader) -> Result<CziDocument, CziError> {
    let file_info = create_czi(reader).await?;
    let xml_bytes = read_czi_meta_xml(reader, file_info.meta_pos).await?;
    let xml_text = std::str::from_utf8(&xml_bytes)
        .map_err(|e| DataError::InvalidXmlEncoding(e.to_string()))?;

    let mut properties = PropertyTable::new();
    let metadata = parse_xml_set_properties(xml_text, &mut properties)?;
    publish_metadata_properties(&metadata, &mut properties);

    let (mut subblocks, nscene) =
        read_scenes_set_prop(reader, file_info.subblk_dir_pos, &mut properties).await?;
    adjust_coordinate_origin(&mut subblocks, &mut properties);
    validate_scenes(&subblocks, nscene)?;
    let max_downsample = publish_scene_regions(&subblocks, nscene, &mut properties);

    let associated_images = add_associated_images(reader, file_info.att_dir_pos).await?;

    let mut hasher = HashAccumulator::new();
    hasher.update_bytes(&file_info.primary_file_guid);
    hasher.update_bytes(&file_info.file_guid);
    hasher.update_bytes(&xml_bytes);
    let quickhash = hasher.finish();

    Ok(CziDocument {
        properties,
        subblocks,
        metadata,
        nscene,
        max_downsample,
        associated_images,
        quickhash,
    })
}

/// Publishes the handful of typed metadata fields the property table exposes
/// under well-known `openslide.*` keys, alongside the raw `zeiss.*` tree
/// [`parse_xml_set_properties`] already flattened.
fn publish_metadata_properties(metadata: &ImageMetadata, properties: &mut PropertyTable) {
    if let Some(mpp_x) = metadata.scaling_x_um {
        properties.set("openslide.mpp-x", mpp_x.to_string());
    }
    if let Some(mpp_y) = metadata.scaling_y_um {
        properties.set("openslide.mpp-y", mpp_y.to_string());
    }
    if let Some(power) = metadata.objective_power() {
        properties.set("openslide.objective-power", power.to_string());
    }
}

/// Shifts every subblock so the minimum x/y across the whole file sits at
/// the origin, and records the shift applied as `openslide.bounds-x`/`-y`
/// (the level-0 offset of the slide's content within the file's raw
/// coordinate space, before this adjustment).
fn adjust_coordinate_origin(subblocks: &mut [Subblock], properties: &mut PropertyTable) {
    let Some(min_x) = subblocks.iter().map(|s| s.x).min() else {
        return;
    };
    let min_y = subblocks.iter().map(|s| s.y).min().unwrap();

    for subblock in subblocks.iter_mut() {
        subblock.x -= min_x;
        subblock.y -= min_y;
    }

    properties.set("openslide.bounds-x", min_x.to_string());
    properties.set("openslide.bounds-y", min_y.to_string());
}

/// Publishes `openslide.region[i].{x,y,width,height}` (the level-0 bounding
/// box of each scene's subblocks) and returns `max_downsample`: the
/// coarsest downsample every scene has coverage at.
fn publish_scene_regions(subblocks: &[Subblock], nscene: i32, properties: &mut PropertyTable) -> i64 {
    let mut max_downsample = i64::MAX;

    for scene in 0..nscene {
        let in_scene: Vec<&Subblock> = subblocks
            .iter()
            .filter(|s| s.scene as i32 == scene || s.scene < 0)
            .collect();

        let level0: Vec<&&Subblock> = in_scene.iter().filter(|s| s.downsample_i == 1).collect();
        if !level0.is_empty() {
            let min_x = level0.iter().map(|s| s.x).min().unwrap();
            let min_y = level0.iter().map(|s| s.y).min().unwrap();
            let max_x = level0.iter().map(|s| s.x + s.w as i32).max().unwrap();
            let max_y = level0.iter().map(|s| s.y + s.h as i32).max().unwrap();
            properties.set(format!("openslide.region[{scene}].x"), min_x.to_string());
            properties.set(format!("openslide.region[{scene}].y"), min_y.to_string());
            properties.set(
                format!("openslide.region[{scene}].width"),
                (max_x - min_x).to_string(),
            );
            properties.set(
                format!("openslide.region[{scene}].height"),
                (max_y - min_y).to_string(),
            );
        }

        if let Some(scene_max) = in_scene.iter().map(|s| s.downsample_i).max() {
            max_downsample = max_downsample.min(scene_max);
        }
    }

    if max_downsample == i64::MAX {
        1
    } else {
        max_downsample
    }
}

/// Step 1: read the `ZISRAWFILE` header and pull out the three directory
/// positions plus the two GUIDs the hash is seeded with.
async fn create_czi(reader: &dyn RangeReader) -> Result<FileInfo, CziError> {
    let header = read_segment_header(reader, 0).await?;
    expect_sid(&header, SID_FILE, 0)?;

    let payload = reader
        .read_exact_at(SEGMENT_HEADER_SIZE, 112 - SEGMENT_HEADER_SIZE as usize)
        .await?;

    let primary_file_guid: [u8; 16] = payload[16..32].try_into().unwrap();
    let file_guid: [u8; 16] = payload[32..48].try_into().unwrap();
    let subblk_dir_pos = read_i64_le(&payload[52..60]);
    let meta_pos = read_i64_le(&payload[60..68]);
    let att_dir_pos = read_i64_le(&payload[72..80]);

    if subblk_dir_pos == 0 {
        return Err(DataError::BadMagic { offset: 0 }.into());
    }

    Ok(FileInfo {
        subblk_dir_pos,
        meta_pos,
        att_dir_pos,
        primary_file_guid,
        file_guid,
    })
}

/// Step 2: read the raw metadata XML bytes out of the `ZISRAWMETADATA` segment.
async fn read_czi_meta_xml(reader: &dyn RangeReader, meta_pos: i64) -> Result<Vec<u8>, CziError> {
    let offset = meta_pos as u64;
    let header = read_segment_header(reader, offset).await?;
    expect_sid(&header, SID_METADATA, offset)?;

    let subheader = reader
        .read_exact_at(offset + SEGMENT_HEADER_SIZE, 8)
        .await?;
    let xml_size = read_i32_le(&subheader[0..4]);
    if xml_size < 0 {
        return Err(DataError::InvalidXmlEncoding("negative xml_size".to_string()).into());
    }

    let xml_offset = offset + SEGMENT_HEADER_SIZE + METADATA_SUBHEADER_SIZE;
    let bytes = reader.read_exact_at(xml_offset, xml_size as usize).await?;
    Ok(bytes.to_vec())
}

/// Step 3: parse the XML into the property table and typed image fields.
fn parse_xml_set_properties(
    xml: &str,
    properties: &mut PropertyTable,
) -> Result<ImageMetadata, CziError> {
    parse_metadata_xml(xml, properties)
}

/// Step 4: read the subblock directory and build the flat tile list,
/// recording `zeiss.nscene` along the way.
async fn read_scenes_set_prop(
    reader: &dyn RangeReader,
    dir_pos: i64,
    properties: &mut PropertyTable,
) -> Result<(Vec<Subblock>, i32), CziError> {
    let offset = dir_pos as u64;
    let header = read_segment_header(reader, offset).await?;
    expect_sid(&header, SID_DIRECTORY, offset)?;

    let payload_offset = offset + SEGMENT_HEADER_SIZE;
    let entry_count_buf = reader.read_exact_at(payload_offset, 4).await?;
    let entry_count = read_i32_le(&entry_count_buf[0..4]).max(0) as usize;

    let entries_offset = payload_offset + DIRECTORY_SUBHEADER_SIZE;
    let remaining = header.used_size as u64 - DIRECTORY_SUBHEADER_SIZE;
    let buf = reader.read_exact_at(entries_offset, remaining as usize).await?;

    let mut subblocks = Vec::with_capacity(entry_count);
    let mut pos = 0usize;
    let mut max_scene = -1i32;
    for _ in 0..entry_count {
        let (subblock, consumed) = parse_directory_entry(&buf[pos..])?;
        pos += consumed;
        max_scene = max_scene.max(subblock.scene as i32);
        subblocks.push(subblock);
    }

    // A subblock with no 'S' dimension carries the scene=-1 sentinel and
    // belongs to every scene; such a file still has exactly one (implicit)
    // scene, not zero.
    let nscene = if subblocks.is_empty() {
        0
    } else {
        (max_scene + 1).max(1)
    };
    properties.set("zeiss.nscene", nscene.to_string());
    Ok((subblocks, nscene))
}

/// Every declared scene must have at least one subblock; an empty scene
/// means the directory and the image metadata disagree about geometry.
fn validate_scenes(subblocks: &[Subblock], nscene: i32) -> Result<(), CziError> {
    for scene in 0..nscene {
        if !subblocks.iter().any(|s| s.scene as i32 == scene || s.scene < 0) {
            return Err(InternalError::EmptyScene { scene }.into());
        }
    }
    Ok(())
}

/// Step 6: decode label/preview/thumbnail attachments from the attachment
/// directory. Attachments whose content isn't a single-subblock CZI or a
/// directly-decodable image are skipped rather than failing the whole open.
#[tracing::instrument(skip(reader))]
async fn add_associated_images(
    reader: &dyn RangeReader,
    att_dir_pos: i64,
) -> Result<Vec<AssociatedImageData>, CziError> {
    if att_dir_pos == 0 {
        return Ok(Vec::new());
    }

    let offset = att_dir_pos as u64;
    let header = read_segment_header(reader, offset).await?;
    expect_sid(&header, SID_ATTDIR, offset)?;

    let payload_offset = offset + SEGMENT_HEADER_SIZE;
    let count_buf = reader.read_exact_at(payload_offset, 4).await?;
    let count = read_i32_le(&count_buf[0..4]).max(0) as usize;

    let entries_offset = payload_offset + 128;
    let entries_buf = reader
        .read_exact_at(entries_offset, count * ATTACHMENT_ENTRY_SIZE)
        .await?;

    let mut images = Vec::new();
    for i in 0..count {
        let entry = &entries_buf[i * ATTACHMENT_ENTRY_SIZE..(i + 1) * ATTACHMENT_ENTRY_SIZE];
        let file_position = read_i64_le(&entry[12..20]);
        let content_file_type = read_fixed_ascii(&entry[40..48]);
        let raw_name = read_fixed_ascii(&entry[48..128]);

        // Only the three well-known associated images are surfaced; anything
        // else (e.g. a scanner-specific debug attachment) is skipped.
        let Some(name) = canonical_associated_image_name(&raw_name) else {
            continue;
        };

        match read_attachment_image(reader, file_position, &content_file_type, name).await {
            Ok(image) => images.push(image),
            Err(CziError::Data(DataError::UnsupportedAttachment { name, file_type })) => {
                tracing::debug!(name, file_type, "skipping unsupported attachment");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to read associated image");
                return Err(e);
            }
        }
    }
    Ok(images)
}

/// Maps a CZI attachment's raw entry name to the associated-image key
/// callers look it up by.
fn canonical_associated_image_name(raw_name: &str) -> Option<&'static str> {
    match raw_name {
        "Label" => Some("label"),
        "SlidePreview" => Some("macro"),
        "Thumbnail" => Some("thumbnail"),
        _ => None,
    }
}

/// Translates reads through `inner` by a fixed `base` offset, so the segment
/// positions an embedded CZI stores relative to its own start (per the
/// attachment's "relative to the enclosing attachment's data start" rule)
/// can be parsed with the exact same segment-reading code as a top-level file.
struct OffsetReader<'a> {
    inner: &'a dyn RangeReader,
    base: u64,
}

#[async_trait]
impl<'a> RangeReader for OffsetReader<'a> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.inner.read_exact_at(self.base + offset, len).await
    }

    fn size(&self) -> u64 {
        self.inner.size().saturating_sub(self.base)
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

/// Reads an embedded CZI's subblock directory and returns its one subblock,
/// erroring if it holds any other count.
async fn read_single_embedded_subblock(
    reader: &dyn RangeReader,
    dir_pos: i64,
    name: &str,
) -> Result<Subblock, CziError> {
    let offset = dir_pos as u64;
    let header = read_segment_header(reader, offset).await?;
    expect_sid(&header, SID_DIRECTORY, offset)?;

    let payload_offset = offset + SEGMENT_HEADER_SIZE;
    let entry_count_buf = reader.read_exact_at(payload_offset, 4).await?;
    let entry_count = read_i32_le(&entry_count_buf[0..4]).max(0) as usize;

    if entry_count != 1 {
        return Err(DataError::EmbeddedSubblockCount {
            name: name.to_string(),
            count: entry_count,
        }
        .into());
    }

    let entries_offset = payload_offset + DIRECTORY_SUBHEADER_SIZE;
    let remaining = header.used_size as u64 - DIRECTORY_SUBHEADER_SIZE;
    let buf = reader.read_exact_at(entries_offset, remaining as usize).await?;

    let (subblock, _) = parse_directory_entry(&buf)?;
    Ok(subblock)
}

/// Decodes an attachment whose content is itself a single-subblock CZI
/// (label/macro/thumbnail images are stored this way), by recursively
/// running the same file-header -> directory -> subblock sequence `open_czi`
/// runs on the top-level file, scoped to the attachment's data region.
#[tracing::instrument(skip(reader), fields(name))]
async fn read_attachment_image(
    reader: &dyn RangeReader,
    file_position: i64,
    content_file_type: &str,
    name: &str,
) -> Result<AssociatedImageData, CziError> {
    if content_file_type != "CZI" {
        return Err(DataError::UnsupportedAttachment {
            name: name.to_string(),
            file_type: content_file_type.to_string(),
        }
        .into());
    }

    let offset = file_position as u64;
    let header = read_segment_header(reader, offset).await?;
    expect_sid(&header, SID_ATTACH, offset)?;

    let data_offset = offset + SEGMENT_HEADER_SIZE + ATTACH_HEADER_SIZE;
    let embedded = OffsetReader {
        inner: reader,
        base: data_offset,
    };

    let file_info = create_czi(&embedded).await?;
    let subblock = read_single_embedded_subblock(&embedded, file_info.subblk_dir_pos, name).await?;
    let buffer = read_subblock_pixels(&embedded, &subblock).await?;

    Ok(AssociatedImageData {
        name: name.to_string(),
        buffer,
    })
}

/// Reads compressed tile pixels for a subblock and decodes them into a
/// packed ARGB32 buffer, fed to a [`crate::cache::TileCache`] by the slide.
pub async fn read_subblock_pixels(
    reader: &dyn RangeReader,
    subblock: &Subblock,
) -> Result<Argb32Buffer, CziError> {
    let offset = subblock.file_pos as u64;
    let header = read_segment_header(reader, offset).await?;
    expect_sid(&header, SID_SUBBLOCK, offset)?;

    let prefix = reader
        .read_exact_at(offset + SEGMENT_HEADER_SIZE, 16)
        .await?;
    let meta_size = read_i32_le(&prefix[0..4]).max(0) as u64;
    let data_size = read_i64_le(&prefix[8..16]);
    if data_size < 0 {
        return Err(DataError::SubblockOverflow {
            file_pos: subblock.file_pos,
            needed: 0,
            available: 0,
        }
        .into());
    }

    let pixel_offset = offset + super::segment::SUBBLOCK_HEADER_SIZE + meta_size;
    let raw = reader.read_exact_at(pixel_offset, data_size as usize).await?;

    decode_tile(DecodeParams {
        compression: subblock.compression,
        pixel_type: subblock.pixel_type,
        src: &raw,
        expected_w: subblock.w,
        expected_h: subblock.h,
    })
}
