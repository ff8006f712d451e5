//! Conversion of a finished depth map into a coloured surfel cloud.

use crate::camera::MvsCamera;
use crate::hypothesis::{HypothesisGrids, NO_DEPTH};
use cv_core::geometry::{invert_pose, unproject, CameraModel};
use cv_core::image::get_pixel_rgb;
use cv_core::{ensure, Invariant, Result, SurfelCloud};
use image::RgbImage;
use nalgebra::{Matrix3x4, Point3, Vector3};
use rayon::prelude::*;

/// Builds one surfel per pixel whose depth and whose right and below
/// neighbours' depths are all valid.
///
/// The normal is the normalised cross product `(below - p) x (right - p)` and
/// the radius the distance to the nearer of the two neighbours. Output is in
/// row-major pixel order.
pub fn build_points<M: CameraModel + Sync>(
    grids: &HypothesisGrids,
    color: &RgbImage,
    to_local: &Matrix3x4<f64>,
    model: &M,
) -> Result<SurfelCloud> {
    ensure(
        color.width() == grids.width && color.height() == grids.height,
        Invariant::PointCloudDimensions,
    )?;
    let to_world = invert_pose(to_local)?;
    let width = grids.width as usize;

    let world: Vec<Option<Point3<f64>>> = grids
        .depth
        .par_iter()
        .enumerate()
        .map(|(idx, &d)| -> Result<Option<Point3<f64>>> {
            if d == NO_DEPTH {
                return Ok(None);
            }
            ensure(d > 0.0 && d.is_finite(), Invariant::PositiveDepth)?;
            let pixel = Vector3::new((idx % width) as f64 + 0.5, (idx / width) as f64 + 0.5, d as f64);
            Ok(Some(unproject(&pixel, model, &to_world)))
        })
        .collect::<Result<_>>()?;

    let surfels: Vec<Option<(Point3<f64>, f64, Vector3<f64>, [u8; 3])>> = (0..world.len())
        .into_par_iter()
        .map(|idx| {
            let (x, y) = (idx % width, idx / width);
            if x + 1 >= width || y + 1 >= grids.height as usize {
                return None;
            }
            let p = world[idx]?;
            let right = world[idx + 1]? - p;
            let below = world[idx + width]? - p;

            let normal = below.cross(&right).try_normalize(f64::EPSILON)?;
            let radius = right.norm_squared().min(below.norm_squared()).sqrt();
            Some((p, radius, normal, get_pixel_rgb(color, x as u32, y as u32)))
        })
        .collect();

    let mut cloud = SurfelCloud::with_capacity(surfels.iter().flatten().count());
    for (point, radius, normal, rgb) in surfels.into_iter().flatten() {
        cloud.push(point, radius, normal, rgb);
    }
    cloud.check_aligned()?;
    Ok(cloud)
}

/// [`build_points`] for the reference camera a depth map was built for.
pub fn build_points_for_camera(grids: &HypothesisGrids, camera: &MvsCamera) -> Result<SurfelCloud> {
    build_points(grids, &camera.color, &camera.to_local, &camera.model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::Hypothesis;
    use cv_core::geometry::{compose_pose, transform_point, CameraIntrinsics, PinholeModel};
    use image::Rgb;
    use nalgebra::{Matrix3, Rotation3};

    fn flat(width: u32, height: u32, depth: f32) -> HypothesisGrids {
        let mut grids = HypothesisGrids::new(width, height);
        for y in 0..height {
            for x in 0..width {
                grids.set(
                    x,
                    y,
                    Hypothesis {
                        depth,
                        normal: -Vector3::z(),
                        cost: 0.1,
                    },
                );
            }
        }
        grids
    }

    #[test]
    fn test_flat_depth_gives_plane_facing_camera() {
        let model = PinholeModel::undistorted(CameraIntrinsics::new_ideal(8, 6));
        let rotation = Rotation3::from_euler_angles(0.1, -0.2, 0.3).into_inner();
        let pose = compose_pose(&rotation, &Point3::new(0.5, -1.0, 2.0));
        let color = RgbImage::from_pixel(8, 6, Rgb([10, 20, 30]));
        let grids = flat(8, 6, 3.0);

        let cloud = build_points(&grids, &color, &pose, &model).unwrap();
        // Last column and last row have no right / below neighbour.
        assert_eq!(cloud.len(), 7 * 5);
        let axis = rotation.transpose() * Vector3::z();
        for i in 0..cloud.len() {
            let local = transform_point(&pose, &cloud.points[i]);
            assert!((local.z - 3.0).abs() < 1e-9);
            assert!((cloud.normals[i] + axis).norm() < 1e-9);
            assert!(cloud.radii[i] > 0.0);
            assert_eq!(cloud.colors[i], [10, 20, 30]);
        }
        // Ideal intrinsics: one pixel spans depth / width world units.
        assert!((cloud.radii[0] - 3.0 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_pixels_without_both_neighbours_are_dropped() {
        let model = PinholeModel::undistorted(CameraIntrinsics::new_ideal(4, 4));
        let pose = compose_pose(&Matrix3::identity(), &Point3::origin());
        let color = RgbImage::new(4, 4);
        let mut grids = flat(4, 4, 2.0);
        grids.set(2, 1, Hypothesis::empty());

        let cloud = build_points(&grids, &color, &pose, &model).unwrap();
        // 3x3 candidates minus (2,1) itself, (1,1) (right) and (2,0) (below).
        assert_eq!(cloud.len(), 6);
        cloud.check_aligned().unwrap();
    }

    #[test]
    fn test_dimension_and_depth_checks() {
        let model = PinholeModel::undistorted(CameraIntrinsics::new_ideal(4, 4));
        let pose = compose_pose(&Matrix3::identity(), &Point3::origin());
        let grids = flat(4, 4, 2.0);
        assert!(matches!(
            build_points(&grids, &RgbImage::new(4, 3), &pose, &model),
            Err(cv_core::Error::Invariant(Invariant::PointCloudDimensions))
        ));

        let negative = flat(4, 4, -1.0);
        assert!(matches!(
            build_points(&negative, &RgbImage::new(4, 4), &pose, &model),
            Err(cv_core::Error::Invariant(Invariant::PositiveDepth))
        ));
    }
}
