//! Scan-to-archive compression and selective reconstruction.

use std::path::PathBuf;

use glam::DVec3;
use rayon::prelude::*;

use crate::block::Block;
use crate::decompose::{Decomposer, DecompositionParams, PointCloud};
use crate::error::PackError;
use crate::geometry::Aabb3;
use crate::merge_table::{MergeTable, ScanMetadata};
use crate::patch::{decode_patch, encode_patch};
use crate::ranges::IndexRanges;
use crate::reader::ArchiveReader;
use crate::writer::{ArchiveSummary, ArchiveWriter, PatchChunks};

/// Provides the scans of a survey one at a time.
pub trait ScanSource {
    fn scan_count(&self) -> u32;

    fn load_scan(&mut self, ordinal: u32) -> anyhow::Result<PointCloud>;
}

/// Scans already held in memory.
pub struct MemoryScanSource {
    scans: Vec<PointCloud>,
}

impl MemoryScanSource {
    pub fn new(scans: Vec<PointCloud>) -> Self {
        Self { scans }
    }
}

impl ScanSource for MemoryScanSource {
    fn scan_count(&self) -> u32 {
        self.scans.len() as u32
    }

    fn load_scan(&mut self, ordinal: u32) -> anyhow::Result<PointCloud> {
        self.scans
            .get(ordinal as usize)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("scan {} out of range", ordinal))
    }
}

/// How patches are grouped into blocks.
#[derive(Debug, Clone, Default)]
pub enum CompressionMode {
    /// One block per input scan.
    #[default]
    PerScan,
    /// One block per modeled building element plus residual blocks, driven
    /// by an IFC model registered against the scans.
    EntityAligned {
        model: PathBuf,
        registration: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct CompressionParams {
    pub mode: CompressionMode,
    /// Raster edge length of every patch.
    pub img_size: u32,
    pub blur_iterations: u32,
    /// Height-field codec quality, 1..=100.
    pub quality: u8,
    pub decomposition: DecompositionParams,
}

impl Default for CompressionParams {
    fn default() -> Self {
        Self {
            mode: CompressionMode::PerScan,
            img_size: 32,
            blur_iterations: 8,
            quality: 75,
            decomposition: DecompositionParams::default(),
        }
    }
}

impl CompressionParams {
    /// Derive raster size, blur, quality and cell size from a single
    /// `ratio` in [0, 1]; larger ratios compress harder.
    pub fn from_ratio(ratio: f32) -> Self {
        let ratio = ratio.clamp(0.0, 1.0);
        let img_size = 2u32.pow((6.0 - 3.0 * ratio).round() as u32);
        let mut params = Self {
            img_size,
            blur_iterations: (8.0 + ratio * 24.0) as u32,
            quality: (50.0 + (1.0 - ratio) * 45.0) as u8,
            ..Self::default()
        };
        params.decomposition.max_points_per_cell =
            ((1.0 + ratio * 9.0) * (img_size * img_size) as f32) as u32;
        params
    }
}

/// Compress every scan of `source` into `writer`.
///
/// Scans are processed in order; each contributes one scan block whose
/// indices continue from the patches already written. Returns the archive
/// summary and the blocks, which belong in the sidecar.
pub fn build_archive(
    source: &mut dyn ScanSource,
    decomposer: &dyn Decomposer,
    params: &CompressionParams,
    mut writer: ArchiveWriter,
) -> anyhow::Result<(ArchiveSummary, Vec<Block>)> {
    if let CompressionMode::EntityAligned { .. } = params.mode {
        return Err(PackError::Unsupported("IFC entity-aligned compression").into());
    }

    let mut table = MergeTable::new();
    let mut blocks = Vec::new();

    for ordinal in 0..source.scan_count() {
        log::info!("processing scan {}...", ordinal);
        let cloud = source.load_scan(ordinal)?;

        log::info!("  computing patches...");
        let subsets = decomposer.decompose(&cloud, &params.decomposition);
        let patches: Vec<_> = subsets
            .par_iter()
            .map(|subset| {
                encode_patch(&cloud.points, subset, params.img_size, params.blur_iterations)
            })
            .collect();

        log::info!("  compressing {} patches...", patches.len());
        let codecs = writer.codecs().clone();
        let chunks = patches
            .par_iter()
            .map(|patch| {
                Ok(PatchChunks {
                    occupancy: codecs.occupancy.encode(&patch.occupancy, params.quality)?,
                    height: codecs.height.encode(&patch.heights, params.quality)?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let scan = ScanMetadata {
            origin: cloud.sensor_origin,
            ordinal,
            bbox_sensor: Aabb3::from_points(&cloud.points),
            patches: patches.iter().map(|p| p.row()).collect(),
        };
        let (next, assigned) = table.with_scan(scan)?;
        table = next;

        for chunk in &chunks {
            writer.push_patch(chunk)?;
        }
        log::debug!("  scan {} owns patches {:?}", ordinal, assigned);
        blocks.push(Block::scan(assigned));
    }

    let summary = writer.finish(&table)?;
    Ok((summary, blocks))
}

/// Decode the given patches and concatenate their points, in survey
/// coordinates, in ascending patch order. Overlapping patches are not
/// deduplicated.
///
/// Indices are checked against the archive before any chunk is read.
pub fn reconstruct(
    reader: &mut ArchiveReader,
    indices: &IndexRanges,
) -> anyhow::Result<Vec<DVec3>> {
    let count = reader.patch_count();
    if let Some(last) = indices.last().filter(|&last| last >= count) {
        return Err(PackError::PatchOutOfRange { index: last, count }.into());
    }

    let mut chunks = Vec::with_capacity(indices.len() as usize);
    for idx in indices.iter() {
        chunks.push((idx, reader.read_patch_chunks(idx)?));
    }

    let reader = &*reader;
    let decoded = chunks
        .par_iter()
        .map(|(idx, chunk)| {
            let origin = reader
                .table()
                .scan_of(*idx)
                .map(|scan| scan.origin)
                .ok_or_else(|| anyhow::anyhow!("patch {} belongs to no scan", idx))?;
            let patch = reader.decode_patch(*idx, chunk)?;
            Ok(decode_patch(&patch)
                .into_iter()
                .map(|p| origin + p.as_dvec3())
                .collect::<Vec<_>>())
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(decoded.into_iter().flatten().collect())
}
