//! End-to-end scenarios: minimal open, negative-origin tiles, multi-level
//! pyramids, short-scene elimination, unsupported compression, and embedded
//! associated images.

use std::io::Write;

use czi_slide::slide::Slide;

use super::czi_builder::{AttachmentSpec, CziFileBuilder, SubblockSpec};

async fn open_bytes(bytes: Vec<u8>) -> Result<Slide<czi_slide::io::LocalFileReader>, czi_slide::error::CziError> {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(&bytes).unwrap();
    Slide::open(f.path().to_str().unwrap()).await
}

#[tokio::test]
async fn minimal_single_scene_single_level_opens_and_paints() {
    let bytes = CziFileBuilder::new()
        .xml("<Root><Information><Image><SizeX>16</SizeX><SizeY>16</SizeY></Image></Information></Root>")
        .add_subblock(SubblockSpec::level0(0, 0, 16, 16).fill(0x42))
        .build();

    let slide = open_bytes(bytes).await.unwrap();
    assert_eq!(slide.level_count(), 1);
    assert_eq!(slide.dimensions(), Some((16, 16)));

    let region = slide.paint_region(0, 0, 0, 4, 4).await.unwrap();
    assert_eq!(region.width, 4);
    assert_eq!(region.height, 4);
    // BGR24 0x42 fill decodes to an opaque gray pixel in every channel.
    assert_eq!(&region.pixels[0..4], &[0x42, 0x42, 0x42, 0xff]);
}

#[tokio::test]
async fn negative_origin_tiles_shift_to_zero_and_publish_bounds() {
    let bytes = CziFileBuilder::new()
        .add_subblock(SubblockSpec::level0(-512, -512, 256, 256))
        .add_subblock(SubblockSpec::level0(-256, -512, 256, 256))
        .build();

    let slide = open_bytes(bytes).await.unwrap();
    assert_eq!(slide.properties().get("openslide.bounds-x"), Some("-512"));
    assert_eq!(slide.properties().get("openslide.bounds-y"), Some("-512"));
    assert_eq!(slide.dimensions(), Some((512, 256)));
}

#[tokio::test]
async fn multi_level_pyramid_keeps_one_level_per_downsample() {
    let bytes = CziFileBuilder::new()
        .add_subblock(SubblockSpec::level0(0, 0, 512, 512))
        .add_subblock(SubblockSpec::downsampled(0, 0, 512, 512, 256, 256))
        .build();

    let slide = open_bytes(bytes).await.unwrap();
    assert_eq!(slide.level_count(), 2);
    assert_eq!(slide.level_info(0).unwrap().downsample, 1.0);
    assert_eq!(slide.level_info(1).unwrap().downsample, 2.0);
}

#[tokio::test]
async fn short_scene_bounds_how_many_levels_are_kept() {
    // Scene 0 (painted) has a full pyramid down to downsample 8. Scene 1
    // (not painted, but still a declared scene) only reaches downsample 2,
    // so the kept pyramid must stop there even though scene 0 has more.
    let bytes = CziFileBuilder::new()
        .add_subblock(SubblockSpec::level0(0, 0, 256, 256).scene(0))
        .add_subblock(SubblockSpec::downsampled(0, 0, 256, 256, 128, 128).scene(0))
        .add_subblock(SubblockSpec::downsampled(0, 0, 256, 256, 64, 64).scene(0))
        .add_subblock(SubblockSpec::downsampled(0, 0, 256, 256, 32, 32).scene(0))
        .add_subblock(SubblockSpec::level0(0, 0, 256, 256).scene(1))
        .add_subblock(SubblockSpec::downsampled(0, 0, 256, 256, 128, 128).scene(1))
        .build();

    let slide = open_bytes(bytes).await.unwrap();
    assert_eq!(slide.level_count(), 2);
}

#[tokio::test]
async fn unsupported_compression_fails_to_open() {
    let bytes = CziFileBuilder::new()
        .add_subblock(SubblockSpec::level0(0, 0, 8, 8).compression(1)) // JPEG
        .build();

    let err = open_bytes(bytes).await.unwrap_err();
    assert!(matches!(
        err,
        czi_slide::error::CziError::Data(czi_slide::error::DataError::UnsupportedCompression { .. })
    ));
}

#[tokio::test]
async fn embedded_czi_attachment_becomes_an_associated_image() {
    let bytes = CziFileBuilder::new()
        .add_subblock(SubblockSpec::level0(0, 0, 8, 8))
        .add_attachment(AttachmentSpec::square("Label", 4, 0x99))
        .build();

    let slide = open_bytes(bytes).await.unwrap();
    let label = slide.associated_image("label").expect("label attachment");
    assert_eq!(label.width, 4);
    assert_eq!(label.height, 4);
}

#[tokio::test]
async fn non_square_embedded_attachment_keeps_its_own_dimensions() {
    // Label/macro images are frequently not square; a reader that guesses
    // dimensions from sqrt(data_size) would get this one wrong.
    let bytes = CziFileBuilder::new()
        .add_subblock(SubblockSpec::level0(0, 0, 8, 8))
        .add_attachment(AttachmentSpec::new("SlidePreview", 6, 3))
        .build();

    let slide = open_bytes(bytes).await.unwrap();
    let macro_image = slide.associated_image("macro").expect("macro attachment");
    assert_eq!(macro_image.width, 6);
    assert_eq!(macro_image.height, 3);
}

#[tokio::test]
async fn embedded_attachment_preserves_bgr_channel_order() {
    let bytes = CziFileBuilder::new()
        .add_subblock(SubblockSpec::level0(0, 0, 8, 8))
        .add_attachment(AttachmentSpec::new("Label", 2, 2).bgr(0xAA, 0x11, 0x00))
        .build();

    let slide = open_bytes(bytes).await.unwrap();
    let label = slide.associated_image("label").expect("label attachment");
    assert_eq!(&label.buffer.pixels[0..4], &[0xAA, 0x11, 0x00, 0xFF]);
}

#[tokio::test]
async fn painted_region_distinguishes_red_and_blue() {
    let bytes = CziFileBuilder::new()
        .add_subblock(SubblockSpec::level0(0, 0, 4, 4).bgr(0xAA, 0x00, 0x00))
        .build();

    let slide = open_bytes(bytes).await.unwrap();
    let region = slide.paint_region(0, 0, 0, 2, 2).await.unwrap();
    assert_eq!(&region.pixels[0..4], &[0xAA, 0x00, 0x00, 0xFF]);
}
