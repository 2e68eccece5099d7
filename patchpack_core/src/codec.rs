use std::sync::Arc;

/// Byte-stream compression abstraction used for the merge table blob.
///
/// Each `Codec` implementation:
/// - Is identified by a stable numeric `id()` stored in the archive header.
/// - Compresses a whole buffer at once; the archive stores exactly one
///   table blob, so there is no framing or cross-call state.
pub trait Codec: Send + Sync {
    /// Stable codec ID stored in the archive header.
    fn id(&self) -> u16;

    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    fn compress(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    fn decompress(&self, compressed: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// Single-channel 8-bit raster, row-major.
///
/// Used for both the occupancy bitmap (0 = empty, 255 = occupied) and the
/// quantized height field of a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Grid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize],
        }
    }

    /// Wrap an existing pixel buffer, checking that it matches the dimensions.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> anyhow::Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            anyhow::bail!(
                "grid buffer holds {} pixels but {}x{} needs {}",
                data.len(),
                width,
                height,
                expected
            );
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        self.data[(y * self.width + x) as usize] = value;
    }
}

/// Image compression abstraction for patch rasters.
///
/// Occupancy bitmaps must go through a lossless implementation: the number
/// of occupied pixels is the patch's point count recorded in the merge table.
/// Height fields may use a lossy one; `quality` is in 1..=100 and ignored by
/// lossless codecs.
pub trait ImageCodec: Send + Sync {
    /// Stable codec ID stored in the archive header.
    fn id(&self) -> u16;

    fn name(&self) -> &'static str;

    fn encode(&self, grid: &Grid, quality: u8) -> anyhow::Result<Vec<u8>>;

    fn decode(&self, chunk: &[u8]) -> anyhow::Result<Grid>;
}

/// The three codecs an archive is written with, one per kind of payload.
#[derive(Clone)]
pub struct CodecSet {
    pub table: Arc<dyn Codec>,
    pub occupancy: Arc<dyn ImageCodec>,
    pub height: Arc<dyn ImageCodec>,
}

impl std::fmt::Debug for CodecSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecSet")
            .field("table", &self.table.name())
            .field("occupancy", &self.occupancy.name())
            .field("height", &self.height.name())
            .finish()
    }
}
