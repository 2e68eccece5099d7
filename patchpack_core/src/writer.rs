use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use xxhash_rust::xxh3::xxh3_64;

use crate::codec::CodecSet;
use crate::format::{
    ArchiveHeader, ChunkEntry, CHUNK_ENTRY_SIZE, FLAG_HAS_CHECKSUM, FOOTER_SIZE, FORMAT_VERSION,
    HEADER_SIZE,
};
use crate::merge_table::MergeTable;

/// Compressed rasters of one patch.
#[derive(Debug, Clone)]
pub struct PatchChunks {
    pub occupancy: Vec<u8>,
    pub height: Vec<u8>,
}

/// Sizes reported once an archive is sealed.
#[derive(Debug, Clone, Default)]
pub struct ArchiveSummary {
    pub scan_count: u32,
    pub patch_count: u32,
    pub point_count: u64,
    /// Stored bytes of all patch chunks.
    pub chunk_bytes: u64,
    /// Stored bytes of the compressed merge table.
    pub table_bytes: u64,
    pub file_bytes: u64,
}

/// Writer for patch archive files.
///
/// # Write contract
/// Call [`push_patch`] once per patch in global index order; the chunks of
/// the n-th call become chunks `2n` and `2n+1`. Call [`finish`] with the
/// merge table describing exactly those patches to append the table, the
/// chunk index and footer, and write back the final header.
///
/// # Format layout written
/// ```text
/// [HEADER: 64 bytes placeholder]
/// [CHUNK 0] [CHUNK 1] ... [CHUNK 2N-1]   ← occupancy/height per patch
/// [MERGE TABLE: codec-compressed]
/// [CHUNK INDEX: 24 bytes × 2N]
/// [FOOTER: 8 bytes - u64 LE offset of chunk index]
/// ← seek back to 0, overwrite header with real values
/// ```
///
/// [`push_patch`]: ArchiveWriter::push_patch
/// [`finish`]: ArchiveWriter::finish
pub struct ArchiveWriter {
    file: BufWriter<File>,
    codecs: CodecSet,
    /// In-memory chunk index, appended to the file on `finish()`.
    entries: Vec<ChunkEntry>,
    /// Current write position in the file (mirrors the file cursor).
    current_offset: u64,
}

impl ArchiveWriter {
    /// Create a new archive at `path`, overwriting any existing file.
    pub fn create(path: impl AsRef<Path>, codecs: CodecSet) -> anyhow::Result<Self> {
        let mut file = BufWriter::new(File::create(path)?);
        // Placeholder header, overwritten in finish()
        file.write_all(&[0u8; HEADER_SIZE as usize])?;
        Ok(Self {
            file,
            codecs,
            entries: Vec::new(),
            current_offset: HEADER_SIZE,
        })
    }

    pub fn codecs(&self) -> &CodecSet {
        &self.codecs
    }

    /// Patches written so far; also the global index of the next patch.
    pub fn patch_count(&self) -> u32 {
        (self.entries.len() / 2) as u32
    }

    /// Append the chunks of the next patch and return its global index.
    pub fn push_patch(&mut self, chunks: &PatchChunks) -> anyhow::Result<u32> {
        let idx = self.patch_count();
        self.write_chunk(&chunks.occupancy)?;
        self.write_chunk(&chunks.height)?;
        Ok(idx)
    }

    fn write_chunk(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| anyhow::anyhow!("chunk of {} bytes exceeds the 4 GiB limit", bytes.len()))?;
        self.file.write_all(bytes)?;
        self.entries.push(ChunkEntry {
            offset: self.current_offset,
            len,
            checksum: xxh3_64(bytes),
        });
        self.current_offset += len as u64;
        Ok(())
    }

    /// Write the merge table, chunk index and footer, and seal the file by
    /// writing the final header.
    pub fn finish(mut self, table: &MergeTable) -> anyhow::Result<ArchiveSummary> {
        if table.patch_count() != self.patch_count() {
            anyhow::bail!(
                "merge table describes {} patches but {} were written",
                table.patch_count(),
                self.patch_count()
            );
        }
        let chunk_bytes = self.current_offset - HEADER_SIZE;

        // ── Merge table ─────────────────────────────────────────────────────
        let raw = table.to_bytes();
        let blob = self.codecs.table.compress(&raw)?;
        let table_offset = self.current_offset;
        self.file.write_all(&blob)?;
        self.current_offset += blob.len() as u64;

        // ── Chunk index ─────────────────────────────────────────────────────
        let index_offset = self.current_offset;
        for entry in &self.entries {
            self.file.write_all(&entry.to_bytes())?;
        }
        self.current_offset += self.entries.len() as u64 * CHUNK_ENTRY_SIZE;

        // ── Footer: 8-byte u64 LE offset of chunk index start ───────────────
        self.file.write_all(&index_offset.to_le_bytes())?;
        self.current_offset += FOOTER_SIZE;

        // ── Seek back to 0 and write the real header ────────────────────────
        let header = ArchiveHeader {
            version: FORMAT_VERSION,
            table_codec: self.codecs.table.id(),
            occupancy_codec: self.codecs.occupancy.id(),
            height_codec: self.codecs.height.id(),
            scan_count: table.scan_count(),
            patch_count: table.patch_count(),
            flags: FLAG_HAS_CHECKSUM,
            table_offset,
            table_len: u32::try_from(blob.len())?,
            table_raw_len: u32::try_from(raw.len())?,
            table_checksum: xxh3_64(&blob),
        };
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header.to_bytes())?;
        self.file.flush()?;

        Ok(ArchiveSummary {
            scan_count: header.scan_count,
            patch_count: header.patch_count,
            point_count: table.total_point_count(),
            chunk_bytes,
            table_bytes: blob.len() as u64,
            file_bytes: self.current_offset,
        })
    }
}
