use glam::{Mat3, Vec3};

/// Axis-aligned 3D box. An empty box has `min > max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb3 {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb3 {
    pub const fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut bbox = Self::empty();
        for p in points {
            bbox.extend(*p);
        }
        bbox
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn extend(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Aabb3) -> Aabb3 {
        Aabb3 {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Edge lengths; zero for an empty box.
    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Smallest cube sharing this box's center that contains it.
    pub fn bounding_cube(&self) -> Aabb3 {
        let half = self.extent().max_element() * 0.5;
        let c = self.center();
        Aabb3 {
            min: c - Vec3::splat(half),
            max: c + Vec3::splat(half),
        }
    }

    /// Child `octant` (bit 0 = x, bit 1 = y, bit 2 = z upper half).
    pub fn octant(&self, octant: usize) -> Aabb3 {
        let c = self.center();
        let pick = |bit: usize, lo: f32, mid: f32, hi: f32| {
            if octant & bit != 0 {
                (mid, hi)
            } else {
                (lo, mid)
            }
        };
        let (x0, x1) = pick(1, self.min.x, c.x, self.max.x);
        let (y0, y1) = pick(2, self.min.y, c.y, self.max.y);
        let (z0, z1) = pick(4, self.min.z, c.z, self.max.z);
        Aabb3 {
            min: Vec3::new(x0, y0, z0),
            max: Vec3::new(x1, y1, z1),
        }
    }
}

/// Least-squares plane through a point set.
#[derive(Debug, Clone, Copy)]
pub struct PlaneFit {
    pub centroid: Vec3,
    /// Columns: major in-plane axis, minor in-plane axis, normal.
    /// Always a right-handed orthonormal frame.
    pub basis: Mat3,
    /// Covariance eigenvalues, descending.
    pub eigenvalues: [f32; 3],
}

impl PlaneFit {
    pub fn fit(points: impl Iterator<Item = Vec3> + Clone) -> Self {
        let mut n = 0usize;
        let mut sum = Vec3::ZERO;
        for p in points.clone() {
            sum += p;
            n += 1;
        }
        if n == 0 {
            return Self {
                centroid: Vec3::ZERO,
                basis: Mat3::IDENTITY,
                eigenvalues: [0.0; 3],
            };
        }
        let centroid = sum / n as f32;

        let mut cov = [[0.0f64; 3]; 3];
        for p in points {
            let d = (p - centroid).as_dvec3().to_array();
            for i in 0..3 {
                for j in 0..3 {
                    cov[i][j] += d[i] * d[j];
                }
            }
        }
        for row in &mut cov {
            for v in row.iter_mut() {
                *v /= n as f64;
            }
        }

        let (values, vectors) = symmetric_eigen(cov);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

        let axis = |k: usize| {
            Vec3::new(
                vectors[0][k] as f32,
                vectors[1][k] as f32,
                vectors[2][k] as f32,
            )
            .normalize_or_zero()
        };
        let u = axis(order[0]);
        let v = axis(order[1]);
        let basis = if u == Vec3::ZERO || v == Vec3::ZERO {
            Mat3::IDENTITY
        } else {
            Mat3::from_cols(u, v, u.cross(v))
        };

        Self {
            centroid,
            basis,
            eigenvalues: order.map(|k| values[k].max(0.0) as f32),
        }
    }

    /// Standard deviation of the points along the normal.
    pub fn thickness(&self) -> f32 {
        self.eigenvalues[2].sqrt()
    }

    /// `λmin / Σλ`: 0 for a perfect plane, 1/3 for an isotropic blob.
    pub fn surface_variation(&self) -> f32 {
        let total: f32 = self.eigenvalues.iter().sum();
        if total <= f32::EPSILON {
            0.0
        } else {
            self.eigenvalues[2] / total
        }
    }
}

/// Cyclic Jacobi eigen-decomposition of a symmetric 3x3 matrix.
///
/// Returns the eigenvalues and a matrix whose columns are the matching
/// eigenvectors (`vectors[row][col]`).
fn symmetric_eigen(mut a: [[f64; 3]; 3]) -> ([f64; 3], [[f64; 3]; 3]) {
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    for _sweep in 0..32 {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off < 1e-24 {
            break;
        }
        for (p, q) in [(0, 1), (0, 2), (1, 2)] {
            if a[p][q].abs() < 1e-300 {
                continue;
            }
            let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            for k in 0..3 {
                let (akp, akq) = (a[k][p], a[k][q]);
                a[k][p] = c * akp - s * akq;
                a[k][q] = s * akp + c * akq;
            }
            for k in 0..3 {
                let (apk, aqk) = (a[p][k], a[q][k]);
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            for row in &mut v {
                let (vkp, vkq) = (row[p], row[q]);
                row[p] = c * vkp - s * vkq;
                row[q] = s * vkp + c * vkq;
            }
        }
    }

    ([a[0][0], a[1][1], a[2][2]], v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_fit_recovers_normal_of_tilted_plane() {
        let normal = Vec3::new(0.0, 0.6, 0.8);
        let u = Vec3::X;
        let v = normal.cross(u);
        let points: Vec<Vec3> = (0..20)
            .flat_map(|i| (0..10).map(move |j| (i as f32, j as f32)))
            .map(|(i, j)| Vec3::new(5.0, -2.0, 1.0) + u * i * 0.1 + v * j * 0.1)
            .collect();

        let fit = PlaneFit::fit(points.iter().copied());
        let n = fit.basis.z_axis;
        assert!(n.dot(normal).abs() > 0.999, "normal {n:?}");
        assert!(fit.thickness() < 1e-3);
        // longer side (20 samples along x) is the major axis
        assert!(fit.basis.x_axis.dot(u).abs() > 0.999);
        assert!((fit.basis.determinant() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn degenerate_inputs_fall_back_to_identity_frame() {
        let single = PlaneFit::fit([Vec3::new(1.0, 2.0, 3.0)].into_iter());
        assert_eq!(single.centroid, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(single.surface_variation(), 0.0);
        assert!((single.basis.determinant() - 1.0).abs() < 1e-4);

        let empty = PlaneFit::fit(std::iter::empty());
        assert_eq!(empty.basis, Mat3::IDENTITY);
    }

    #[test]
    fn octants_tile_the_parent() {
        let cube = Aabb3 {
            min: Vec3::ZERO,
            max: Vec3::splat(2.0),
        };
        let upper = cube.octant(7);
        assert_eq!(upper.min, Vec3::splat(1.0));
        assert_eq!(upper.max, Vec3::splat(2.0));
        let lower = cube.octant(0);
        assert_eq!(lower.max, Vec3::splat(1.0));
        let volume: f32 = (0..8).map(|o| cube.octant(o).extent().x.powi(3)).sum();
        assert!((volume - 8.0).abs() < 1e-6);
    }
}
