use glam::{DVec3, Vec3};

use crate::geometry::{Aabb3, PlaneFit};

/// Indices into a scan's point list forming one patch.
pub type Subset = Vec<usize>;

/// A scan's points together with the sensor position they were captured from.
///
/// Points are relative to `sensor_origin`, which is kept in double precision
/// so georeferenced coordinates survive the narrowing to `f32`.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub points: Vec<Vec3>,
    pub sensor_origin: DVec3,
}

#[derive(Debug, Clone)]
pub struct DecompositionParams {
    /// Cells holding fewer points than this are never subdivided.
    pub min_points: u32,
    /// Cells holding more points than this are subdivided unless
    /// `min_points` forbids it.
    pub max_points_per_cell: u32,
    pub max_depth: u32,
    /// Cells are never split below this edge length.
    pub min_leaf_size: f32,
    /// Largest accepted standard deviation of a cell's points off its plane.
    pub dist_threshold: f32,
    /// Largest accepted surface variation (`λmin / Σλ`) of a cell.
    pub angle_threshold: f32,
}

impl Default for DecompositionParams {
    fn default() -> Self {
        Self {
            min_points: 3,
            max_points_per_cell: 32 * 32,
            max_depth: 6,
            min_leaf_size: 0.2,
            dist_threshold: 0.05,
            angle_threshold: 0.05,
        }
    }
}

/// Splits a point cloud into subsets, each of which becomes one patch.
pub trait Decomposer: Send + Sync {
    /// Every returned subset is non-empty. Subsets may not overlap, but
    /// together they need not cover every point.
    fn decompose(&self, cloud: &PointCloud, params: &DecompositionParams) -> Vec<Subset>;
}

/// Octree decomposition that keeps subdividing a cell until it is both
/// small enough for one raster and close enough to planar.
pub struct OctreeDecomposer;

impl Decomposer for OctreeDecomposer {
    fn decompose(&self, cloud: &PointCloud, params: &DecompositionParams) -> Vec<Subset> {
        if cloud.points.is_empty() {
            return Vec::new();
        }
        let root = Aabb3::from_points(&cloud.points).bounding_cube();
        let all: Subset = (0..cloud.points.len()).collect();

        let mut leaves = Vec::new();
        let mut stack = vec![(all, root, 0u32)];
        while let Some((subset, cell, depth)) = stack.pop() {
            if !should_split(&cloud.points, &subset, &cell, depth, params) {
                leaves.push(subset);
                continue;
            }
            let mut children: [Subset; 8] = Default::default();
            let center = cell.center();
            for i in subset {
                let p = cloud.points[i];
                let octant = (p.x >= center.x) as usize
                    | ((p.y >= center.y) as usize) << 1
                    | ((p.z >= center.z) as usize) << 2;
                children[octant].push(i);
            }
            // Reverse so leaves come out in octant order.
            for (octant, child) in children.into_iter().enumerate().rev() {
                if !child.is_empty() {
                    stack.push((child, cell.octant(octant), depth + 1));
                }
            }
        }

        log::debug!(
            "octree decomposition: {} points into {} patches",
            cloud.points.len(),
            leaves.len()
        );
        leaves
    }
}

fn should_split(
    points: &[Vec3],
    subset: &[usize],
    cell: &Aabb3,
    depth: u32,
    params: &DecompositionParams,
) -> bool {
    if depth >= params.max_depth || cell.extent().x * 0.5 < params.min_leaf_size {
        return false;
    }
    // A plane needs three points.
    if subset.len() < params.min_points.max(3) as usize {
        return false;
    }
    if subset.len() > params.max_points_per_cell as usize {
        return true;
    }
    let fit = PlaneFit::fit(subset.iter().map(|&i| points[i]));
    fit.thickness() > params.dist_threshold || fit.surface_variation() > params.angle_threshold
}
