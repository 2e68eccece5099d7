use patchpack_core::codec::Codec;
use patchpack_core::format::CODEC_PASSTHROUGH;

/// No-op codec: stores the merge table verbatim.
///
/// Useful for inspecting archives with a hex editor and for verifying the
/// table serialization independently of any compressor.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn id(&self) -> u16 {
        CODEC_PASSTHROUGH
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, compressed: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}
