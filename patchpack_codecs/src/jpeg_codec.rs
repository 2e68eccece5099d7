use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use patchpack_core::codec::{Grid, ImageCodec};
use patchpack_core::format::IMAGE_CODEC_JPEG;

/// Lossy 8-bit grayscale JPEG, the default height-field codec.
///
/// Decoded heights deviate from the encoded ones by a few quantization
/// steps; the deviation shrinks with higher quality and more blur passes
/// on the empty cells.
pub struct JpegCodec;

impl ImageCodec for JpegCodec {
    fn id(&self) -> u16 {
        IMAGE_CODEC_JPEG
    }

    fn name(&self) -> &'static str {
        "jpeg"
    }

    fn encode(&self, grid: &Grid, quality: u8) -> anyhow::Result<Vec<u8>> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
            &grid.data,
            grid.width,
            grid.height,
            ColorType::L8,
        )?;
        Ok(out)
    }

    fn decode(&self, chunk: &[u8]) -> anyhow::Result<Grid> {
        crate::decode_luma(chunk, image::ImageFormat::Jpeg)
    }
}
