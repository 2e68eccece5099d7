use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use glam::DVec3;
use las::{Builder, Point, Reader, Transform, Vector, Writer};
use patchpack_core::{PointCloud, ScanSource};

/// Coordinate resolution of written LAS files, in metres.
const LAS_SCALE: f64 = 0.001;

/// A survey given as one LAS/LAZ file per scan.
///
/// LAS carries no sensor position, so each scan's sensor origin is taken to
/// be the center of its header bounds. Points are loaded relative to it.
pub struct LasScanSource {
    paths: Vec<PathBuf>,
}

impl LasScanSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl ScanSource for LasScanSource {
    fn scan_count(&self) -> u32 {
        self.paths.len() as u32
    }

    fn load_scan(&mut self, ordinal: u32) -> anyhow::Result<PointCloud> {
        let path = self
            .paths
            .get(ordinal as usize)
            .ok_or_else(|| anyhow::anyhow!("scan {} out of range", ordinal))?;
        let file = File::open(path).with_context(|| format!("opening scan {:?}", path))?;
        let mut reader = Reader::new(BufReader::new(file))
            .with_context(|| format!("reading LAS header of {:?}", path))?;

        let bounds = reader.header().bounds();
        let sensor_origin = DVec3::new(
            (bounds.min.x + bounds.max.x) * 0.5,
            (bounds.min.y + bounds.max.y) * 0.5,
            (bounds.min.z + bounds.max.z) * 0.5,
        );

        let mut points = Vec::with_capacity(reader.header().number_of_points() as usize);
        for point in reader.points() {
            let p = point?;
            points.push((DVec3::new(p.x, p.y, p.z) - sensor_origin).as_vec3());
        }
        log::debug!("loaded {} points from {:?}", points.len(), path);

        Ok(PointCloud {
            points,
            sensor_origin,
        })
    }
}

/// Write survey-coordinate `points` to a LAS 1.2 file at millimetre
/// resolution, offset to the center of their bounds.
pub fn write_las(path: &Path, points: &[DVec3]) -> anyhow::Result<()> {
    let offset = match points.split_first() {
        Some((first, rest)) => {
            let (min, max) = rest
                .iter()
                .fold((*first, *first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
            ((min + max) * 0.5).round()
        }
        None => DVec3::ZERO,
    };

    let mut builder = Builder::from((1, 2));
    builder.transforms = Vector {
        x: Transform {
            scale: LAS_SCALE,
            offset: offset.x,
        },
        y: Transform {
            scale: LAS_SCALE,
            offset: offset.y,
        },
        z: Transform {
            scale: LAS_SCALE,
            offset: offset.z,
        },
    };
    let header = builder.into_header()?;
    let mut writer =
        Writer::from_path(path, header).with_context(|| format!("creating {:?}", path))?;
    for p in points {
        writer.write_point(Point {
            x: p.x,
            y: p.y,
            z: p.z,
            ..Default::default()
        })?;
    }
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utm_points() -> Vec<DVec3> {
        (0..50)
            .map(|i| {
                let t = i as f64;
                DVec3::new(512_345.678 + t * 0.01, 5_000_000.3 + t * 0.02, 231.125)
            })
            .collect()
    }

    #[test]
    fn test_georeferenced_coordinates_keep_millimetres() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utm.las");
        let points = utm_points();
        write_las(&path, &points).unwrap();

        let mut source = LasScanSource::new(vec![path]);
        let cloud = source.load_scan(0).unwrap();
        assert_eq!(cloud.points.len(), points.len());
        assert!(cloud.sensor_origin.y > 4_999_999.0);

        for (restored, original) in cloud.points.iter().zip(&points) {
            let absolute = cloud.sensor_origin + restored.as_dvec3();
            assert!(
                (absolute - *original).abs().max_element() < 2e-3,
                "{absolute:?} drifted from {original:?}"
            );
        }
    }

    #[test]
    fn test_relative_points_stay_small() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utm.las");
        write_las(&path, &utm_points()).unwrap();

        let cloud = LasScanSource::new(vec![path]).load_scan(0).unwrap();
        assert!(cloud.points.iter().all(|p: &glam::Vec3| p.abs().max_element() < 1.0));
    }

    #[test]
    fn test_missing_scan_is_an_error() {
        let mut source = LasScanSource::new(Vec::new());
        assert!(source.load_scan(0).is_err());
    }
}
