use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use xxhash_rust::xxh3::xxh3_64;

use crate::codec::CodecSet;
use crate::error::PackError;
use crate::format::{
    chunk_positions, ArchiveHeader, ChunkEntry, CHUNK_ENTRY_SIZE, FLAG_HAS_CHECKSUM,
    FOOTER_SIZE, FORMAT_VERSION, HEADER_SIZE,
};
use crate::merge_table::MergeTable;
use crate::patch::Patch;
use crate::writer::PatchChunks;

/// Random-access reader for patch archive files.
///
/// # Open sequence
/// 1. Read the 64-byte header (magic, version, codec ids, patch count).
/// 2. Read, verify and decompress the merge table blob.
/// 3. Seek to `file_end - FOOTER_SIZE`, read the chunk index offset, and load the
///    full chunk index into RAM.
///
/// # Access pattern
/// [`read_patch_chunks`] seeks straight to the two chunks of one patch;
/// no other chunk is read or decoded.
///
/// [`read_patch_chunks`]: ArchiveReader::read_patch_chunks
pub struct ArchiveReader {
    file: File,
    pub header: ArchiveHeader,
    entries: Vec<ChunkEntry>,
    table: MergeTable,
    codecs: CodecSet,
}

impl ArchiveReader {
    /// Open an archive.
    ///
    /// `codecs` must match the codec ids stored in the header. Use
    /// [`ArchiveHeader::read_from_path`] and `patchpack_codecs::codec_set_for`
    /// to pick them automatically.
    pub fn open(path: impl AsRef<Path>, codecs: CodecSet) -> anyhow::Result<Self> {
        let mut file = File::open(path)?;

        // ── Read and validate header ────────────────────────────────────────
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header_buf)?;
        let header = ArchiveHeader::from_bytes(&header_buf)?;

        if header.version != FORMAT_VERSION {
            anyhow::bail!(
                "unsupported archive version {} (only version {} is supported)",
                header.version,
                FORMAT_VERSION
            );
        }
        for (what, stored, given) in [
            ("table", header.table_codec, codecs.table.id()),
            ("occupancy", header.occupancy_codec, codecs.occupancy.id()),
            ("height", header.height_codec, codecs.height.id()),
        ] {
            if stored != given {
                anyhow::bail!(
                    "codec mismatch: archive uses {} codec {} but provided codec has id {}",
                    what,
                    stored,
                    given
                );
            }
        }

        // ── Merge table ─────────────────────────────────────────────────────
        file.seek(SeekFrom::Start(header.table_offset))?;
        let mut blob = vec![0u8; header.table_len as usize];
        file.read_exact(&mut blob)?;
        if header.has_flag(FLAG_HAS_CHECKSUM) {
            let computed = xxh3_64(&blob);
            if computed != header.table_checksum {
                anyhow::bail!(
                    "merge table checksum mismatch: expected {:016x}, got {:016x}",
                    header.table_checksum,
                    computed
                );
            }
        }
        let raw = codecs.table.decompress(&blob)?;
        if raw.len() != header.table_raw_len as usize {
            anyhow::bail!(
                "merge table decompressed to {} bytes but header says {}",
                raw.len(),
                header.table_raw_len
            );
        }
        let table = MergeTable::from_bytes(&raw)?;
        if table.patch_count() != header.patch_count || table.scan_count() != header.scan_count {
            anyhow::bail!(
                "merge table holds {} scans / {} patches but header says {} / {}",
                table.scan_count(),
                table.patch_count(),
                header.scan_count,
                header.patch_count
            );
        }

        // ── Read footer → chunk index offset ────────────────────────────────
        let file_len = file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))? + FOOTER_SIZE;
        let mut footer_buf = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer_buf)?;
        let index_offset = u64::from_le_bytes(footer_buf);
        let index_end = index_offset
            .checked_add(header.chunk_count() * CHUNK_ENTRY_SIZE)
            .and_then(|end| end.checked_add(FOOTER_SIZE));
        if index_end != Some(file_len) {
            anyhow::bail!(
                "chunk index at offset {} does not hold {} entries before the footer",
                index_offset,
                header.chunk_count()
            );
        }

        // ── Load chunk index ────────────────────────────────────────────────
        file.seek(SeekFrom::Start(index_offset))?;
        let mut entries = Vec::with_capacity(header.chunk_count() as usize);
        let mut entry_buf = [0u8; CHUNK_ENTRY_SIZE as usize];
        for _ in 0..header.chunk_count() {
            file.read_exact(&mut entry_buf)?;
            entries.push(ChunkEntry::from_bytes(&entry_buf)?);
        }

        Ok(Self {
            file,
            header,
            entries,
            table,
            codecs,
        })
    }

    #[inline]
    pub fn patch_count(&self) -> u32 {
        self.header.patch_count
    }

    pub fn table(&self) -> &MergeTable {
        &self.table
    }

    pub fn codecs(&self) -> &CodecSet {
        &self.codecs
    }

    /// Access the raw `ChunkEntry` slice (for inspection).
    pub fn entries(&self) -> &[ChunkEntry] {
        &self.entries
    }

    /// Read the stored bytes of flat chunk `pos`, verifying its checksum.
    pub fn read_chunk(&mut self, pos: u64) -> anyhow::Result<Vec<u8>> {
        let entry = self
            .entries
            .get(pos as usize)
            .ok_or_else(|| {
                anyhow::anyhow!("chunk {} out of range (total {})", pos, self.entries.len())
            })?
            .clone();

        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut bytes = vec![0u8; entry.len as usize];
        self.file.read_exact(&mut bytes)?;

        if self.header.has_flag(FLAG_HAS_CHECKSUM) {
            let computed = xxh3_64(&bytes);
            if computed != entry.checksum {
                anyhow::bail!(
                    "chunk {} checksum mismatch: expected {:016x}, got {:016x}",
                    pos,
                    entry.checksum,
                    computed
                );
            }
        }
        Ok(bytes)
    }

    /// Read the occupancy and height chunks of patch `idx`.
    pub fn read_patch_chunks(&mut self, idx: u32) -> anyhow::Result<PatchChunks> {
        if idx >= self.patch_count() {
            return Err(PackError::PatchOutOfRange {
                index: idx,
                count: self.patch_count(),
            }
            .into());
        }
        let (occ_pos, height_pos) = chunk_positions(idx);
        Ok(PatchChunks {
            occupancy: self.read_chunk(occ_pos)?,
            height: self.read_chunk(height_pos)?,
        })
    }

    /// Decode the chunks of patch `idx` and attach its table row.
    pub fn decode_patch(&self, idx: u32, chunks: &PatchChunks) -> anyhow::Result<Patch> {
        let row = self.table.patch(idx).ok_or(PackError::PatchOutOfRange {
            index: idx,
            count: self.patch_count(),
        })?;
        let occupancy = self.codecs.occupancy.decode(&chunks.occupancy)?;
        let heights = self.codecs.height.decode(&chunks.height)?;
        Patch::from_parts(row, occupancy, heights)
    }

    /// Read and decode patch `idx`.
    pub fn load_patch(&mut self, idx: u32) -> anyhow::Result<Patch> {
        let chunks = self.read_patch_chunks(idx)?;
        self.decode_patch(idx, &chunks)
    }
}
