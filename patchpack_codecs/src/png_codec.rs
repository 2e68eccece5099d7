use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use patchpack_core::codec::{Grid, ImageCodec};
use patchpack_core::format::IMAGE_CODEC_PNG;

/// Lossless 8-bit grayscale PNG.
///
/// The default occupancy codec: bitmaps are 0/255 only, which deflate
/// squeezes to a few bytes per row. Also usable for height fields when exact
/// heights matter more than size.
pub struct PngCodec;

impl ImageCodec for PngCodec {
    fn id(&self) -> u16 {
        IMAGE_CODEC_PNG
    }

    fn name(&self) -> &'static str {
        "png"
    }

    fn encode(&self, grid: &Grid, _quality: u8) -> anyhow::Result<Vec<u8>> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out).write_image(&grid.data, grid.width, grid.height, ColorType::L8)?;
        Ok(out)
    }

    fn decode(&self, chunk: &[u8]) -> anyhow::Result<Grid> {
        crate::decode_luma(chunk, image::ImageFormat::Png)
    }
}
