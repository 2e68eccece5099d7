//! Per-scan and per-patch metadata, addressed by global patch index.
//!
//! The table is append-only. Patch rows are stored in the exact order their
//! patches were produced, so the global index of a patch is its row position
//! and lookups are a plain slice index.

use std::ops::Range;

use glam::{DVec3, Mat3, Vec3};

use crate::geometry::Aabb3;

/// Metadata of one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    /// Sensor position the scan was captured from, in survey coordinates.
    /// Patch geometry of the scan is stored relative to it.
    pub origin: DVec3,
    /// Position of the scan in the input survey.
    pub ordinal: u32,
    pub patch_count: u32,
    /// Bounds of the scan's points relative to `origin`.
    pub bbox_sensor: Aabb3,
    /// Union of the scan's patch bounds, each in its own patch frame.
    pub bbox_basis: Aabb3,
}

/// Placement of one patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRow {
    /// Number of points the patch reconstructs to.
    pub point_count: u32,
    /// Plane centroid, relative to the owning scan's origin.
    pub origin: Vec3,
    /// Bounds in the patch frame.
    pub bbox: Aabb3,
    /// Columns: u axis, v axis, normal.
    pub basis: Mat3,
}

/// Everything the compression of one scan contributes to the table.
#[derive(Debug, Clone)]
pub struct ScanMetadata {
    pub origin: DVec3,
    pub ordinal: u32,
    pub bbox_sensor: Aabb3,
    pub patches: Vec<PatchRow>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeTable {
    scans: Vec<ScanRow>,
    patches: Vec<PatchRow>,
}

impl MergeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one scan and its patches, returning the table together with
    /// the global indices assigned to the scan's patches.
    ///
    /// Fails if the table would exceed `u32::MAX` patches.
    pub fn with_scan(mut self, scan: ScanMetadata) -> anyhow::Result<(Self, Range<u32>)> {
        let first = self.patch_count();
        let patch_count = u32::try_from(scan.patches.len())
            .ok()
            .filter(|&n| first.checked_add(n).is_some())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "scan {} adds {} patches to a table of {}, exceeding the u32 index space",
                    scan.ordinal,
                    scan.patches.len(),
                    first
                )
            })?;
        let bbox_basis = scan
            .patches
            .iter()
            .fold(Aabb3::empty(), |acc, p| acc.union(&p.bbox));

        self.scans.push(ScanRow {
            origin: scan.origin,
            ordinal: scan.ordinal,
            patch_count,
            bbox_sensor: scan.bbox_sensor,
            bbox_basis,
        });
        self.patches.extend(scan.patches);

        Ok((self, first..first + patch_count))
    }

    /// Concatenate a table built independently after this one.
    ///
    /// Indices of `other` shift by `self.patch_count()`; blocks referring to
    /// them must be re-based with [`crate::Block::shifted`].
    pub fn merge(mut self, other: MergeTable) -> anyhow::Result<Self> {
        if self.patch_count().checked_add(other.patch_count()).is_none() {
            anyhow::bail!(
                "merging tables of {} and {} patches exceeds the u32 index space",
                self.patch_count(),
                other.patch_count()
            );
        }
        self.scans.extend(other.scans);
        self.patches.extend(other.patches);
        Ok(self)
    }

    #[inline]
    pub fn patch_count(&self) -> u32 {
        self.patches.len() as u32
    }

    #[inline]
    pub fn scan_count(&self) -> u32 {
        self.scans.len() as u32
    }

    #[inline]
    pub fn patch(&self, idx: u32) -> Option<&PatchRow> {
        self.patches.get(idx as usize)
    }

    pub fn patches(&self) -> &[PatchRow] {
        &self.patches
    }

    pub fn scans(&self) -> &[ScanRow] {
        &self.scans
    }

    /// The scan that produced patch `idx`.
    pub fn scan_of(&self, idx: u32) -> Option<&ScanRow> {
        let mut end = 0u64;
        self.scans.iter().find(|s| {
            end += s.patch_count as u64;
            (idx as u64) < end
        })
    }

    /// Points the whole archive reconstructs to.
    pub fn total_point_count(&self) -> u64 {
        self.patches.iter().map(|p| p.point_count as u64).sum()
    }

    // ── serialization ───────────────────────────────────────────────────────

    /// Serialize as little-endian parallel arrays:
    ///
    /// ```text
    /// scan_count:u32 patch_count:u32
    /// scan origins[3f64] | ordinals[u32] | patch counts[u32]
    ///   | sensor bboxes[6f32] | basis bboxes[6f32]
    /// patch point counts[u32] | origins[3f32] | bboxes[6f32] | bases[9f32]
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.scans.len() * 80 + self.patches.len() * 76);
        put_u32(&mut buf, self.scan_count());
        put_u32(&mut buf, self.patch_count());

        self.scans.iter().for_each(|s| put_dvec3(&mut buf, s.origin));
        self.scans.iter().for_each(|s| put_u32(&mut buf, s.ordinal));
        self.scans.iter().for_each(|s| put_u32(&mut buf, s.patch_count));
        self.scans.iter().for_each(|s| put_bbox(&mut buf, &s.bbox_sensor));
        self.scans.iter().for_each(|s| put_bbox(&mut buf, &s.bbox_basis));

        self.patches.iter().for_each(|p| put_u32(&mut buf, p.point_count));
        self.patches.iter().for_each(|p| put_vec3(&mut buf, p.origin));
        self.patches.iter().for_each(|p| put_bbox(&mut buf, &p.bbox));
        self.patches.iter().for_each(|p| {
            for v in p.basis.to_cols_array() {
                put_f32(&mut buf, v);
            }
        });

        buf
    }

    pub fn from_bytes(buf: &[u8]) -> anyhow::Result<Self> {
        let mut cur = Cursor { buf, pos: 0 };
        let scan_count = cur.u32()? as usize;
        let patch_count = cur.u32()? as usize;

        let origins = cur.many(scan_count, Cursor::dvec3)?;
        let ordinals = cur.many(scan_count, Cursor::u32)?;
        let patch_counts = cur.many(scan_count, Cursor::u32)?;
        let sensor_boxes = cur.many(scan_count, Cursor::bbox)?;
        let basis_boxes = cur.many(scan_count, Cursor::bbox)?;

        let point_counts = cur.many(patch_count, Cursor::u32)?;
        let patch_origins = cur.many(patch_count, Cursor::vec3)?;
        let patch_boxes = cur.many(patch_count, Cursor::bbox)?;
        let bases = cur.many(patch_count, Cursor::mat3)?;

        if cur.pos != buf.len() {
            anyhow::bail!(
                "merge table has {} trailing bytes",
                buf.len() - cur.pos
            );
        }
        let claimed: u64 = patch_counts.iter().map(|&c| c as u64).sum();
        if claimed != patch_count as u64 {
            anyhow::bail!(
                "merge table scans claim {} patches but {} patch rows are stored",
                claimed,
                patch_count
            );
        }

        let scans = (0..scan_count)
            .map(|i| ScanRow {
                origin: origins[i],
                ordinal: ordinals[i],
                patch_count: patch_counts[i],
                bbox_sensor: sensor_boxes[i],
                bbox_basis: basis_boxes[i],
            })
            .collect();
        let patches = (0..patch_count)
            .map(|i| PatchRow {
                point_count: point_counts[i],
                origin: patch_origins[i],
                bbox: patch_boxes[i],
                basis: bases[i],
            })
            .collect();

        Ok(Self { scans, patches })
    }
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_f32(buf: &mut Vec<u8>, v: f32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_dvec3(buf: &mut Vec<u8>, v: DVec3) {
    v.to_array()
        .into_iter()
        .for_each(|c| buf.extend_from_slice(&c.to_le_bytes()));
}

fn put_vec3(buf: &mut Vec<u8>, v: Vec3) {
    v.to_array().into_iter().for_each(|c| put_f32(buf, c));
}

fn put_bbox(buf: &mut Vec<u8>, b: &Aabb3) {
    put_vec3(buf, b.min);
    put_vec3(buf, b.max);
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn take<const N: usize>(&mut self) -> anyhow::Result<[u8; N]> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + N)
            .ok_or_else(|| anyhow::anyhow!("merge table truncated at byte {}", self.pos))?;
        self.pos += N;
        Ok(bytes.try_into()?)
    }

    fn u32(&mut self) -> anyhow::Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn f32(&mut self) -> anyhow::Result<f32> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    fn f64(&mut self) -> anyhow::Result<f64> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    fn dvec3(&mut self) -> anyhow::Result<DVec3> {
        Ok(DVec3::new(self.f64()?, self.f64()?, self.f64()?))
    }

    fn vec3(&mut self) -> anyhow::Result<Vec3> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    fn bbox(&mut self) -> anyhow::Result<Aabb3> {
        Ok(Aabb3 {
            min: self.vec3()?,
            max: self.vec3()?,
        })
    }

    fn mat3(&mut self) -> anyhow::Result<Mat3> {
        let mut cols = [0.0f32; 9];
        for c in &mut cols {
            *c = self.f32()?;
        }
        Ok(Mat3::from_cols_array(&cols))
    }

    fn many<T>(
        &mut self,
        count: usize,
        read: fn(&mut Self) -> anyhow::Result<T>,
    ) -> anyhow::Result<Vec<T>> {
        // Guard the allocation against a corrupted count.
        if count > self.buf.len().saturating_sub(self.pos) {
            anyhow::bail!("merge table claims {} rows past the end of the blob", count);
        }
        (0..count).map(|_| read(self)).collect()
    }
}
