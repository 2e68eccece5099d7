/// Magic bytes for version 1 patch archives.
pub const MAGIC: &[u8; 8] = b"PPACK1\n\x00";

/// Current archive format version.
pub const FORMAT_VERSION: u16 = 1;

/// Fixed size of the archive header in bytes.
///   magic[8] + version:u16 + table_codec:u16 + occupancy_codec:u16
///   + height_codec:u16 + scan_count:u32 + patch_count:u32 + flags:u64
///   + table_offset:u64 + table_len:u32 + table_raw_len:u32
///   + table_checksum:u64 + reserved[8]
///   = 8 + 2 + 2 + 2 + 2 + 4 + 4 + 8 + 8 + 4 + 4 + 8 + 8 = 64
pub const HEADER_SIZE: u64 = 64;

/// Size of each ChunkEntry in the chunk index, in bytes.
///   offset:u64 + len:u32 + checksum:u64 + _pad[4]
///   = 8 + 4 + 8 + 4 = 24
pub const CHUNK_ENTRY_SIZE: u64 = 24;

/// Size of the index footer (single u64 offset) in bytes.
pub const FOOTER_SIZE: u64 = 8;

/// Chunks stored per patch: occupancy bitmap, then height field.
pub const CHUNKS_PER_PATCH: u64 = 2;

// ── Flags ──────────────────────────────────────────────────────────────────

/// Each chunk and the table blob carry an xxhash3-64 checksum.
pub const FLAG_HAS_CHECKSUM: u64 = 1 << 0;

// ── Codec IDs ──────────────────────────────────────────────────────────────

// Byte-stream codecs (merge table blob).
pub const CODEC_PASSTHROUGH: u16 = 0;
pub const CODEC_ZSTD: u16 = 1;
pub const CODEC_LZ4: u16 = 2;
pub const CODEC_ZLIB: u16 = 3;

// Image codecs (patch chunks).
pub const IMAGE_CODEC_PNG: u16 = 1;
pub const IMAGE_CODEC_JPEG: u16 = 2;

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 64-byte archive header.
#[derive(Debug, Clone, Default)]
pub struct ArchiveHeader {
    pub version: u16,
    pub table_codec: u16,
    pub occupancy_codec: u16,
    pub height_codec: u16,
    pub scan_count: u32,
    pub patch_count: u32,
    pub flags: u64,
    /// Byte offset of the compressed merge table blob.
    pub table_offset: u64,
    /// Stored (compressed) length of the table blob.
    pub table_len: u32,
    /// Serialized length of the table before compression.
    pub table_raw_len: u32,
    pub table_checksum: u64,
}

impl ArchiveHeader {
    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[..8].copy_from_slice(MAGIC);
        buf[8..10].copy_from_slice(&self.version.to_le_bytes());
        buf[10..12].copy_from_slice(&self.table_codec.to_le_bytes());
        buf[12..14].copy_from_slice(&self.occupancy_codec.to_le_bytes());
        buf[14..16].copy_from_slice(&self.height_codec.to_le_bytes());
        buf[16..20].copy_from_slice(&self.scan_count.to_le_bytes());
        buf[20..24].copy_from_slice(&self.patch_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.flags.to_le_bytes());
        buf[32..40].copy_from_slice(&self.table_offset.to_le_bytes());
        buf[40..44].copy_from_slice(&self.table_len.to_le_bytes());
        buf[44..48].copy_from_slice(&self.table_raw_len.to_le_bytes());
        buf[48..56].copy_from_slice(&self.table_checksum.to_le_bytes());
        // reserved[8] stays zero
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes, checking the magic.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> anyhow::Result<Self> {
        if &buf[..8] != MAGIC {
            anyhow::bail!("invalid magic bytes: not a patch archive");
        }
        Ok(Self {
            version: u16::from_le_bytes(buf[8..10].try_into()?),
            table_codec: u16::from_le_bytes(buf[10..12].try_into()?),
            occupancy_codec: u16::from_le_bytes(buf[12..14].try_into()?),
            height_codec: u16::from_le_bytes(buf[14..16].try_into()?),
            scan_count: u32::from_le_bytes(buf[16..20].try_into()?),
            patch_count: u32::from_le_bytes(buf[20..24].try_into()?),
            flags: u64::from_le_bytes(buf[24..32].try_into()?),
            table_offset: u64::from_le_bytes(buf[32..40].try_into()?),
            table_len: u32::from_le_bytes(buf[40..44].try_into()?),
            table_raw_len: u32::from_le_bytes(buf[44..48].try_into()?),
            table_checksum: u64::from_le_bytes(buf[48..56].try_into()?),
        })
    }

    /// Read just the header from the start of `path`.
    ///
    /// Lets callers pick codecs by id before opening the full archive.
    pub fn read_from_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        use std::io::Read;
        let mut f = std::fs::File::open(path)?;
        let mut buf = [0u8; HEADER_SIZE as usize];
        f.read_exact(&mut buf)?;
        Self::from_bytes(&buf)
    }

    pub fn has_flag(&self, flag: u64) -> bool {
        self.flags & flag != 0
    }

    /// Number of entries in the chunk index.
    pub fn chunk_count(&self) -> u64 {
        self.patch_count as u64 * CHUNKS_PER_PATCH
    }
}

// ── Chunk index entry ───────────────────────────────────────────────────────

/// One entry in the chunk index: locates a single compressed patch raster.
#[derive(Debug, Clone, Default)]
pub struct ChunkEntry {
    /// Byte offset of this chunk from the start of the file.
    pub offset: u64,
    /// Stored length of the chunk in bytes.
    pub len: u32,
    /// xxhash3-64 of the stored bytes.
    pub checksum: u64,
}

impl ChunkEntry {
    /// Serialize to exactly `CHUNK_ENTRY_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; CHUNK_ENTRY_SIZE as usize] {
        let mut buf = [0u8; CHUNK_ENTRY_SIZE as usize];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.len.to_le_bytes());
        buf[12..20].copy_from_slice(&self.checksum.to_le_bytes());
        // buf[20..24] = 4 bytes padding, stays zero
        buf
    }

    /// Deserialize from `CHUNK_ENTRY_SIZE` bytes.
    pub fn from_bytes(buf: &[u8; CHUNK_ENTRY_SIZE as usize]) -> anyhow::Result<Self> {
        Ok(Self {
            offset: u64::from_le_bytes(buf[0..8].try_into()?),
            len: u32::from_le_bytes(buf[8..12].try_into()?),
            checksum: u64::from_le_bytes(buf[12..20].try_into()?),
        })
    }
}

/// Flat chunk positions of patch `idx`: (occupancy, height).
#[inline]
pub fn chunk_positions(idx: u32) -> (u64, u64) {
    let base = idx as u64 * CHUNKS_PER_PATCH;
    (base, base + 1)
}
