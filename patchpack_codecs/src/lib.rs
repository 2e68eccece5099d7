mod jpeg_codec;
mod lz4_codec;
mod passthrough;
mod png_codec;
mod zlib_codec;
mod zstd_codec;

pub use jpeg_codec::JpegCodec;
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use png_codec::PngCodec;
pub use zlib_codec::ZlibCodec;
pub use zstd_codec::ZstdCodec;

use std::sync::Arc;

use patchpack_core::format::{
    ArchiveHeader, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZLIB, CODEC_ZSTD, IMAGE_CODEC_JPEG,
    IMAGE_CODEC_PNG,
};
use patchpack_core::{Codec, CodecSet, Grid, ImageCodec};

/// Resolve a table codec from its on-disk id.
pub fn codec_by_id(id: u16) -> anyhow::Result<Arc<dyn Codec>> {
    match id {
        CODEC_PASSTHROUGH => Ok(Arc::new(PassThroughCodec)),
        CODEC_ZSTD => Ok(Arc::new(ZstdCodec::default())),
        CODEC_LZ4 => Ok(Arc::new(Lz4Codec)),
        CODEC_ZLIB => Ok(Arc::new(ZlibCodec::default())),
        _ => anyhow::bail!(
            "unknown table codec id {}; supported: 0 (passthrough), 1 (zstd), 2 (lz4), 3 (zlib)",
            id
        ),
    }
}

/// Resolve a table codec from its CLI name.
pub fn codec_by_name(name: &str, zstd_level: i32) -> anyhow::Result<Arc<dyn Codec>> {
    match name {
        "passthrough" | "pass" | "none" => Ok(Arc::new(PassThroughCodec)),
        "zstd" | "z" => Ok(Arc::new(ZstdCodec::new(zstd_level))),
        "lz4" | "l" => Ok(Arc::new(Lz4Codec)),
        "zlib" | "deflate" => Ok(Arc::new(ZlibCodec::default())),
        other => anyhow::bail!(
            "unknown table codec '{}'. Valid options: passthrough, zstd, lz4, zlib",
            other
        ),
    }
}

/// Resolve a patch image codec from its on-disk id.
pub fn image_codec_by_id(id: u16) -> anyhow::Result<Arc<dyn ImageCodec>> {
    match id {
        IMAGE_CODEC_PNG => Ok(Arc::new(PngCodec)),
        IMAGE_CODEC_JPEG => Ok(Arc::new(JpegCodec)),
        _ => anyhow::bail!("unknown image codec id {}; supported: 1 (png), 2 (jpeg)", id),
    }
}

/// Resolve a patch image codec from its CLI name.
pub fn image_codec_by_name(name: &str) -> anyhow::Result<Arc<dyn ImageCodec>> {
    match name {
        "png" => Ok(Arc::new(PngCodec)),
        "jpeg" | "jpg" => Ok(Arc::new(JpegCodec)),
        other => anyhow::bail!("unknown image codec '{}'. Valid options: png, jpeg", other),
    }
}

/// Codecs needed to read the archive described by `header`.
pub fn codec_set_for(header: &ArchiveHeader) -> anyhow::Result<CodecSet> {
    Ok(CodecSet {
        table: codec_by_id(header.table_codec)?,
        occupancy: image_codec_by_id(header.occupancy_codec)?,
        height: image_codec_by_id(header.height_codec)?,
    })
}

/// Zstd table, PNG occupancy, JPEG heights.
pub fn default_codec_set() -> CodecSet {
    CodecSet {
        table: Arc::new(ZstdCodec::default()),
        occupancy: Arc::new(PngCodec),
        height: Arc::new(JpegCodec),
    }
}

fn decode_luma(chunk: &[u8], format: image::ImageFormat) -> anyhow::Result<Grid> {
    let luma = image::load_from_memory_with_format(chunk, format)?.to_luma8();
    let (width, height) = luma.dimensions();
    Grid::from_raw(width, height, luma.into_raw())
}
