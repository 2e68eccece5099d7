//! Patches: a point subset resampled as a height field over its best-fit plane.
//!
//! The plane frame's u/v axes span the patch's local bounding box, which is
//! divided into `img_size x img_size` cells. Each cell with at least one point
//! is marked in the occupancy bitmap and stores the mean height of its points,
//! quantized to 8 bits over the box's z range. Decoding emits one point per
//! occupied cell at the cell center.

use glam::{Mat3, Vec3};

use crate::codec::Grid;
use crate::geometry::{Aabb3, PlaneFit};
use crate::merge_table::PatchRow;

pub const OCCUPIED: u8 = 255;

#[derive(Debug, Clone)]
pub struct Patch {
    pub basis: Mat3,
    pub origin: Vec3,
    /// Bounds of the patch's points in the basis frame, relative to `origin`.
    pub local_bbox: Aabb3,
    pub occupancy: Grid,
    pub heights: Grid,
}

impl Patch {
    /// Points this patch decodes to.
    pub fn point_count(&self) -> u32 {
        self.occupancy.data.iter().filter(|&&v| v != 0).count() as u32
    }

    /// The merge-table row describing this patch.
    pub fn row(&self) -> PatchRow {
        PatchRow {
            point_count: self.point_count(),
            origin: self.origin,
            bbox: self.local_bbox,
            basis: self.basis,
        }
    }

    /// Reassemble a patch from its table row and decoded rasters.
    pub fn from_parts(row: &PatchRow, occupancy: Grid, heights: Grid) -> anyhow::Result<Self> {
        if (occupancy.width, occupancy.height) != (heights.width, heights.height) {
            anyhow::bail!(
                "occupancy is {}x{} but height field is {}x{}",
                occupancy.width,
                occupancy.height,
                heights.width,
                heights.height
            );
        }
        Ok(Self {
            basis: row.basis,
            origin: row.origin,
            local_bbox: row.bbox,
            occupancy,
            heights,
        })
    }
}

/// Resample `points[subset]` into a patch with an `img_size`² raster.
///
/// `blur_iterations` rounds of neighbour averaging fill the empty cells of
/// the height field, which keeps lossy image codecs from spending bits on
/// the edges between occupied and empty cells. Occupied cells keep their
/// measured height.
pub fn encode_patch(points: &[Vec3], subset: &[usize], img_size: u32, blur_iterations: u32) -> Patch {
    let img_size = img_size.max(1);
    let fit = PlaneFit::fit(subset.iter().map(|&i| points[i]));
    let to_local = fit.basis.transpose();
    let local: Vec<Vec3> = subset
        .iter()
        .map(|&i| to_local * (points[i] - fit.centroid))
        .collect();
    let bbox = Aabb3::from_points(&local);
    let extent = bbox.extent();

    let cells = (img_size * img_size) as usize;
    let mut sums = vec![0.0f32; cells];
    let mut counts = vec![0u32; cells];
    for p in &local {
        let x = cell_of(p.x, bbox.min.x, extent.x, img_size);
        let y = cell_of(p.y, bbox.min.y, extent.y, img_size);
        let h = if extent.z > f32::EPSILON {
            (p.z - bbox.min.z) / extent.z
        } else {
            0.0
        };
        let cell = (y * img_size + x) as usize;
        sums[cell] += h;
        counts[cell] += 1;
    }

    let mut occupancy = Grid::new(img_size, img_size);
    let mut heights = Grid::new(img_size, img_size);
    for y in 0..img_size {
        for x in 0..img_size {
            let cell = (y * img_size + x) as usize;
            if counts[cell] > 0 {
                occupancy.set(x, y, OCCUPIED);
                heights.set(x, y, quantize(sums[cell] / counts[cell] as f32));
            }
        }
    }
    fill_empty_cells(&mut heights, &occupancy, blur_iterations);

    Patch {
        basis: fit.basis,
        origin: fit.centroid,
        local_bbox: bbox,
        occupancy,
        heights,
    }
}

/// One point per occupied cell, relative to the owning scan's origin.
pub fn decode_patch(patch: &Patch) -> Vec<Vec3> {
    let Grid { width, height, .. } = patch.occupancy;
    let bbox = &patch.local_bbox;
    let extent = bbox.extent();

    let mut points = Vec::with_capacity(patch.point_count() as usize);
    for y in 0..height {
        for x in 0..width {
            if patch.occupancy.get(x, y) == 0 {
                continue;
            }
            let local = Vec3::new(
                bbox.min.x + (x as f32 + 0.5) / width as f32 * extent.x,
                bbox.min.y + (y as f32 + 0.5) / height as f32 * extent.y,
                bbox.min.z + patch.heights.get(x, y) as f32 / 255.0 * extent.z,
            );
            points.push(patch.origin + patch.basis * local);
        }
    }
    points
}

#[inline]
fn cell_of(v: f32, min: f32, extent: f32, size: u32) -> u32 {
    if extent <= f32::EPSILON {
        return 0;
    }
    let t = ((v - min) / extent * size as f32) as u32;
    t.min(size - 1)
}

#[inline]
fn quantize(t: f32) -> u8 {
    (t.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn fill_empty_cells(heights: &mut Grid, occupancy: &Grid, iterations: u32) {
    let (w, h) = (heights.width as i64, heights.height as i64);
    let mut known: Vec<bool> = occupancy.data.iter().map(|&v| v != 0).collect();

    for _ in 0..iterations {
        let mut next = heights.data.clone();
        let mut next_known = known.clone();
        let mut changed = false;
        for y in 0..h {
            for x in 0..w {
                let cell = (y * w + x) as usize;
                if occupancy.data[cell] != 0 {
                    continue;
                }
                let mut sum = 0u32;
                let mut n = 0u32;
                for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let neighbour = (ny * w + nx) as usize;
                    if known[neighbour] {
                        sum += heights.data[neighbour] as u32;
                        n += 1;
                    }
                }
                if n > 0 {
                    next[cell] = ((sum + n / 2) / n) as u8;
                    next_known[cell] = true;
                    changed = true;
                }
            }
        }
        heights.data = next;
        known = next_known;
        if !changed {
            break;
        }
    }
}
