//! Synthetic scenes: a value-noise textured plane rendered into a row of
//! pinhole cameras. Used by tests and benchmarks.

use crate::camera::MvsCamera;
use cv_core::geometry::{
    compose_pose, intersect_plane, invert_pose, unproject, CameraIntrinsics, PinholeModel,
};
use cv_core::Result;
use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, Point3, Vector3};

/// Textured plane through `(0, 0, depth)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticPlane {
    pub depth: f64,
    /// Unit normal, facing the cameras at the origin.
    pub normal: Vector3<f64>,
    /// Noise lattice cells per world unit.
    pub texture_frequency: f64,
}

impl SyntheticPlane {
    pub fn new(depth: f64, normal: Vector3<f64>) -> Self {
        Self {
            depth,
            normal: normal.normalize(),
            texture_frequency: 5.0,
        }
    }

    pub fn fronto_parallel(depth: f64) -> Self {
        Self::new(depth, -Vector3::z())
    }

    pub fn point(&self) -> Point3<f64> {
        Point3::new(0.0, 0.0, self.depth)
    }

    /// Grey level of the texture at a world point on the plane.
    pub fn texture(&self, point: &Point3<f64>) -> u8 {
        let x = point.x * self.texture_frequency;
        let y = point.y * self.texture_frequency;
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (smooth(x - x0), smooth(y - y0));
        let (ix, iy) = (x0 as i64, y0 as i64);

        let top = lattice(ix, iy) * (1.0 - fx) + lattice(ix + 1, iy) * fx;
        let bottom = lattice(ix, iy + 1) * (1.0 - fx) + lattice(ix + 1, iy + 1) * fx;
        let v = top * (1.0 - fy) + bottom * fy;
        (20.0 + v * 215.0).round() as u8
    }
}

fn smooth(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

fn lattice(ix: i64, iy: i64) -> f64 {
    let mut h = (ix as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (iy as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h ^= h >> 29;
    h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^= h >> 32;
    (h >> 11) as f64 / (1u64 << 53) as f64
}

/// Reference camera at the origin plus neighbours displaced sideways, all
/// looking down +Z with identical ideal intrinsics.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub plane: SyntheticPlane,
    pub cameras: Vec<MvsCamera>,
}

const BASELINES: [(f64, f64); 4] = [(0.4, 0.0), (-0.4, 0.0), (0.0, 0.3), (0.0, -0.3)];

impl SyntheticScene {
    /// Renders `plane` into a reference camera and one neighbour per entry of
    /// `baselines` (horizontal offsets of the optical centre).
    pub fn new(width: u32, height: u32, plane: SyntheticPlane, baselines: &[f64]) -> Result<Self> {
        let centers: Vec<Point3<f64>> = std::iter::once(Point3::origin())
            .chain(baselines.iter().map(|&b| Point3::new(b, 0.0, 0.0)))
            .collect();
        Self::with_centers(width, height, plane, &centers)
    }

    /// Fronto-parallel plane at `depth` seen by the reference camera and up
    /// to four neighbours spread horizontally and vertically.
    pub fn fronto_parallel(width: u32, height: u32, depth: f64, neighbours: usize) -> Result<Self> {
        let centers: Vec<Point3<f64>> = std::iter::once(Point3::origin())
            .chain(
                BASELINES
                    .iter()
                    .cycle()
                    .take(neighbours)
                    .map(|&(x, y)| Point3::new(x, y, 0.0)),
            )
            .collect();
        Self::with_centers(width, height, SyntheticPlane::fronto_parallel(depth), &centers)
    }

    pub fn with_centers(
        width: u32,
        height: u32,
        plane: SyntheticPlane,
        centers: &[Point3<f64>],
    ) -> Result<Self> {
        let cameras = centers
            .iter()
            .map(|center| render(width, height, &plane, center))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { plane, cameras })
    }
}

fn render(width: u32, height: u32, plane: &SyntheticPlane, center: &Point3<f64>) -> Result<MvsCamera> {
    let model = PinholeModel::undistorted(CameraIntrinsics::new_ideal(width, height));
    let to_local = compose_pose(&Matrix3::identity(), center);
    let to_world = invert_pose(&to_local)?;

    let color = RgbImage::from_fn(width, height, |x, y| {
        let on_ray = unproject(&Vector3::new(x as f64 + 0.5, y as f64 + 0.5, 1.0), &model, &to_world);
        let v = intersect_plane(&plane.point(), &plane.normal, center, &(on_ray - center))
            .map(|hit| plane.texture(&hit))
            .unwrap_or(0);
        Rgb([v, v, v])
    });

    MvsCamera::new(model, to_local, color)
}
