//! Photo-consistency of a plane hypothesis between the reference camera and
//! one neighbour, measured with ZNCC over a square patch.

use crate::camera::MvsCamera;
use cv_core::geometry::{intersect_plane, project, unproject};
use cv_core::image::{intensity, sample_bilinear};
use cv_core::{ensure, Invariant, Result};
use nalgebra::Vector3;
use rayon::prelude::*;

pub struct CostEvaluator<'a> {
    cameras: &'a [MvsCamera],
    reference: usize,
    patch_radius: u32,
    min_variance: f32,
    /// World-space unit viewing ray through every reference pixel centre.
    rays: Vec<Vector3<f64>>,
}

impl<'a> CostEvaluator<'a> {
    pub fn new(cameras: &'a [MvsCamera], reference: usize, patch_radius: u32, min_variance: f32) -> Self {
        let camera = &cameras[reference];
        let width = camera.width() as usize;
        let rays = (0..width * camera.height() as usize)
            .into_par_iter()
            .map(|idx| {
                let pixel = Vector3::new((idx % width) as f64 + 0.5, (idx / width) as f64 + 0.5, 1.0);
                let on_ray = unproject(&pixel, &camera.model, &camera.to_world);
                (on_ray - camera.center).normalize()
            })
            .collect();

        Self {
            cameras,
            reference,
            patch_radius,
            min_variance,
            rays,
        }
    }

    pub fn reference(&self) -> usize {
        self.reference
    }

    pub fn cameras(&self) -> &'a [MvsCamera] {
        self.cameras
    }

    /// Indices of all cameras except the reference one.
    pub fn neighbours(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.cameras.len()).filter(move |&ci| ci != self.reference)
    }

    /// Cost in `[0, 1]` of hypothesis `(depth, normal)` at pixel `(x, y)`
    /// against camera `neighbour`, or `None` when it cannot be evaluated
    /// (patch leaves the reference image, plane seen edge-on, projection
    /// behind or outside the neighbour, textureless patch).
    pub fn evaluate(
        &self,
        x: u32,
        y: u32,
        depth: f32,
        normal: &Vector3<f32>,
        neighbour: usize,
    ) -> Result<Option<f32>> {
        let reference = &self.cameras[self.reference];
        let target = &self.cameras[neighbour];
        let r = self.patch_radius;

        if x < r || y < r || x + r >= reference.width() || y + r >= reference.height() {
            return Ok(None);
        }

        let plane_point = unproject(
            &Vector3::new(x as f64 + 0.5, y as f64 + 0.5, depth as f64),
            &reference.model,
            &reference.to_world,
        );
        let plane_normal = normal.cast::<f64>();

        let side = (2 * r + 1) as usize;
        let mut patch_ref = Vec::with_capacity(side * side);
        let mut patch_target = Vec::with_capacity(side * side);

        let width = reference.width() as usize;
        for py in (y - r)..=(y + r) {
            for px in (x - r)..=(x + r) {
                let direction = &self.rays[py as usize * width + px as usize];

                let Some(hit) =
                    intersect_plane(&plane_point, &plane_normal, &reference.center, direction)
                else {
                    return Ok(None);
                };

                let projected = project(&hit, &target.model, &target.to_local);
                if !(projected.z > 0.0) {
                    return Ok(None);
                }
                let Some(value) = sample_bilinear(&target.gray, projected.x, projected.y) else {
                    return Ok(None);
                };

                patch_ref.push(intensity(&reference.gray, px, py));
                patch_target.push(value);
            }
        }

        zncc_cost(&patch_ref, &patch_target, self.min_variance)
    }
}

/// Maps the zero-normalized cross-correlation of two patches to a cost:
/// `0` for a perfect match, `1` for anti-correlated patches. Returns `None`
/// when either patch is (nearly) constant.
pub fn zncc_cost(a: &[f32], b: &[f32], min_variance: f32) -> Result<Option<f32>> {
    ensure(a.len() == b.len(), Invariant::PatchLength)?;
    if a.is_empty() {
        return Ok(None);
    }

    let n = a.len() as f32;
    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;

    let mut cross = 0.0f32;
    let mut var_a = 0.0f32;
    let mut var_b = 0.0f32;
    for (&va, &vb) in a.iter().zip(b) {
        let da = va - mean_a;
        let db = vb - mean_b;
        cross += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a < min_variance || var_b < min_variance {
        return Ok(None);
    }

    let zncc = cross / (var_a * var_b).sqrt();
    ensure(!zncc.is_nan(), Invariant::FiniteCorrelation)?;
    let zncc = zncc.clamp(-1.0, 1.0);

    Ok(Some((1.0 - zncc) / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::geometry::{compose_pose, CameraIntrinsics, PinholeModel};
    use image::{Rgb, RgbImage};
    use nalgebra::{Matrix3, Point3};

    fn texture(x: u32, y: u32) -> u8 {
        ((x * 37 + y * 91 + (x * y) % 13 * 11) % 200 + 20) as u8
    }

    fn camera(invert: bool, shift: f64) -> MvsCamera {
        camera_at(invert, Point3::new(shift, 0.0, 0.0))
    }

    fn camera_at(invert: bool, center: Point3<f64>) -> MvsCamera {
        let model = PinholeModel::undistorted(CameraIntrinsics::new_ideal(32, 32));
        let pose = compose_pose(&Matrix3::identity(), &center);
        let color = RgbImage::from_fn(32, 32, |x, y| {
            let v = texture(x, y);
            let v = if invert { 255 - v } else { v };
            Rgb([v, v, v])
        });
        MvsCamera::new(model, pose, color).unwrap()
    }

    #[test]
    fn test_zncc_identical_and_inverted() {
        let a = [0.1, 0.5, 0.9, 0.3, 0.7];
        let inv: Vec<f32> = a.iter().map(|v| 1.0 - v).collect();
        assert!(zncc_cost(&a, &a, 1e-3).unwrap().unwrap() < 1e-6);
        assert!((zncc_cost(&a, &inv, 1e-3).unwrap().unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zncc_degenerate_patch() {
        let flat = [0.5; 9];
        let textured = [0.1, 0.2, 0.9, 0.4, 0.5, 0.6, 0.0, 0.8, 0.3];
        assert_eq!(zncc_cost(&flat, &textured, 1e-3).unwrap(), None);
        assert!(matches!(
            zncc_cost(&flat[..3], &textured, 1e-3),
            Err(cv_core::Error::Invariant(Invariant::PatchLength))
        ));
    }

    #[test]
    fn test_matching_and_inverted_camera() {
        // Coincident cameras: every plane maps each pixel onto itself.
        let cameras = vec![camera(false, 0.0), camera(false, 0.0), camera(true, 0.0)];
        let evaluator = CostEvaluator::new(&cameras, 0, 3, 1e-3);
        let normal = Vector3::new(0.0, 0.0, -1.0);

        let same = evaluator.evaluate(16, 16, 4.0, &normal, 1).unwrap().unwrap();
        assert!(same < 1e-4, "cost {same}");
        let inverted = evaluator.evaluate(16, 16, 4.0, &normal, 2).unwrap().unwrap();
        assert!(inverted > 1.0 - 1e-4, "cost {inverted}");
    }

    #[test]
    fn test_rejects_border_and_edge_on_planes() {
        let cameras = vec![camera(false, 0.0), camera(false, 0.0)];
        let evaluator = CostEvaluator::new(&cameras, 0, 3, 1e-3);
        let normal = Vector3::new(0.0, 0.0, -1.0);

        assert_eq!(evaluator.evaluate(2, 16, 4.0, &normal, 1).unwrap(), None);
        assert_eq!(evaluator.evaluate(16, 29, 4.0, &normal, 1).unwrap(), None);
        // Plane containing the optical axis is seen edge-on.
        let edge_on = Vector3::new(0.0, 1.0, 0.0);
        assert_eq!(evaluator.evaluate(16, 16, 4.0, &edge_on, 1).unwrap(), None);
    }

    #[test]
    fn test_rejects_projection_outside_neighbour() {
        // Neighbour shifted far sideways: the patch falls off its image.
        let cameras = vec![camera(false, 0.0), camera(false, 50.0)];
        let evaluator = CostEvaluator::new(&cameras, 0, 3, 1e-3);
        let normal = Vector3::new(0.0, 0.0, -1.0);
        assert_eq!(evaluator.evaluate(16, 16, 4.0, &normal, 1).unwrap(), None);
        assert_eq!(evaluator.neighbours().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_rejects_plane_behind_neighbour() {
        // Neighbour sits past the plane at z = 4, looking further down +Z.
        let cameras = vec![camera(false, 0.0), camera_at(false, Point3::new(0.0, 0.0, 6.0))];
        let evaluator = CostEvaluator::new(&cameras, 0, 3, 1e-3);
        let normal = Vector3::new(0.0, 0.0, -1.0);
        assert_eq!(evaluator.evaluate(16, 16, 4.0, &normal, 1).unwrap(), None);
    }
}
