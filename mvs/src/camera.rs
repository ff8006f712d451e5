use cv_core::geometry::{decompose_pose, invert_pose, CameraModel, PinholeModel};
use cv_core::image::convert_rgb_to_gray;
use cv_core::{ensure, Invariant, Result};
use image::{GrayImage, RgbImage};
use nalgebra::{Matrix3, Matrix3x4, Point3};

/// A calibrated, posed photograph taking part in a depth-map build.
///
/// Read-only for the whole build and shared freely across worker threads.
#[derive(Debug, Clone)]
pub struct MvsCamera {
    pub model: PinholeModel,
    /// World-to-local rigid transform `[R | t]`.
    pub to_local: Matrix3x4<f64>,
    /// Local-to-world rigid transform.
    pub to_world: Matrix3x4<f64>,
    pub rotation_to_world: Matrix3<f64>,
    /// Optical centre in world coordinates.
    pub center: Point3<f64>,
    pub color: RgbImage,
    pub gray: GrayImage,
}

impl MvsCamera {
    pub fn new(model: PinholeModel, to_local: Matrix3x4<f64>, color: RgbImage) -> Result<Self> {
        ensure(
            color.width() == model.width() && color.height() == model.height(),
            Invariant::ImageDimensions,
        )?;

        let (rotation, center) = decompose_pose(&to_local)?;
        let to_world = invert_pose(&to_local)?;
        let gray = convert_rgb_to_gray(&color);

        Ok(Self {
            model,
            to_local,
            to_world,
            rotation_to_world: rotation.transpose(),
            center,
            color,
            gray,
        })
    }

    pub fn width(&self) -> u32 {
        self.model.width()
    }

    pub fn height(&self) -> u32 {
        self.model.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::geometry::{compose_pose, CameraIntrinsics};
    use nalgebra::Rotation3;

    #[test]
    fn test_camera_derives_inverse_and_gray() {
        let model = PinholeModel::undistorted(CameraIntrinsics::new_ideal(8, 6));
        let rotation = Rotation3::from_euler_angles(0.0, 0.2, 0.0).into_inner();
        let pose = compose_pose(&rotation, &Point3::new(1.0, 0.0, -1.0));
        let color = RgbImage::from_pixel(8, 6, image::Rgb([90, 90, 90]));

        let camera = MvsCamera::new(model, pose, color).unwrap();
        assert!((camera.center - Point3::new(1.0, 0.0, -1.0)).norm() < 1e-12);
        assert_eq!(camera.gray.get_pixel(3, 3)[0], 90);
        assert!((camera.rotation_to_world * rotation - Matrix3::identity()).norm() < 1e-12);
    }

    #[test]
    fn test_camera_rejects_wrong_image_size() {
        let model = PinholeModel::undistorted(CameraIntrinsics::new_ideal(8, 6));
        let pose = compose_pose(&Matrix3::identity(), &Point3::origin());
        let color = RgbImage::new(6, 8);
        assert!(matches!(
            MvsCamera::new(model, pose, color),
            Err(cv_core::Error::Invariant(Invariant::ImageDimensions))
        ));
    }
}
