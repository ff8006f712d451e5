use crate::error::{ensure, Invariant, Result};
use nalgebra::{Matrix3, Matrix3x4, Point2, Point3, Vector3};

/// Point used to validate pose inversions. Far from the origin so that scale
/// errors in the rotation block show up.
const POSE_CHECK_POINT: [f64; 3] = [2.124, 5361.4, 78.6];
/// Bound on the squared distance between `POSE_CHECK_POINT` and its round trip.
const POSE_ROUND_TRIP_SQUARED_TOLERANCE: f64 = 1e-5;
const ROTATION_TOLERANCE: f64 = 1e-5;
const PARALLEL_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    /// Square pixels, focal length equal to the image width, principal point
    /// in the middle of the image.
    pub fn new_ideal(width: u32, height: u32) -> Self {
        let f = width as f64;
        Self::new(f, f, width as f64 / 2.0, height as f64 / 2.0, width, height)
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn new(k1: f64, k2: f64, p1: f64, p2: f64, k3: f64) -> Self {
        Self { k1, k2, p1, p2, k3 }
    }

    pub fn none() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn is_none(&self) -> bool {
        *self == Self::none()
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (x * radial + dx, y * radial + dy)
    }

    /// Fixed-point inversion of [`Distortion::apply`].
    pub fn remove(&self, x: f64, y: f64) -> (f64, f64) {
        if self.is_none() {
            return (x, y);
        }
        let mut xu = x;
        let mut yu = y;
        for _ in 0..10 {
            let (xd, yd) = self.apply(xu, yu);
            xu += x - xd;
            yu += y - yd;
        }
        (xu, yu)
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::none()
    }
}

/// Pixel <-> camera-frame mapping of a calibrated camera.
///
/// Pixel coordinates are continuous: the centre of pixel `(i, j)` is at
/// `(i + 0.5, j + 0.5)`.
pub trait CameraModel {
    /// Projects a point given in the camera frame to pixel coordinates.
    fn project(&self, point: &Point3<f64>) -> Point2<f64>;

    /// Returns the camera-frame point seen at `pixel` whose forward (+Z)
    /// coordinate equals `z`.
    fn unproject(&self, pixel: &Point2<f64>, z: f64) -> Point3<f64>;

    fn width(&self) -> u32;

    fn height(&self) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeModel {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
}

impl PinholeModel {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    pub fn undistorted(intrinsics: CameraIntrinsics) -> Self {
        Self::new(intrinsics, Distortion::none())
    }
}

impl CameraModel for PinholeModel {
    fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        let k = &self.intrinsics;
        let (x, y) = self.distortion.apply(point.x / point.z, point.y / point.z);
        Point2::new(x * k.fx + k.cx, y * k.fy + k.cy)
    }

    fn unproject(&self, pixel: &Point2<f64>, z: f64) -> Point3<f64> {
        let k = &self.intrinsics;
        let (x, y) = self
            .distortion
            .remove((pixel.x - k.cx) / k.fx, (pixel.y - k.cy) / k.fy);
        Point3::new(x * z, y * z, z)
    }

    fn width(&self) -> u32 {
        self.intrinsics.width
    }

    fn height(&self) -> u32 {
        self.intrinsics.height
    }
}

/// Builds the world-to-local pose `[R | -R c]` of a camera with rotation `R`
/// (world to local) and optical centre `c` (world).
pub fn compose_pose(rotation: &Matrix3<f64>, center: &Point3<f64>) -> Matrix3x4<f64> {
    let mut pose = Matrix3x4::zeros();
    pose.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    pose.set_column(3, &(-(rotation * center.coords)));
    pose
}

/// Applies a 3x4 rigid transform to a point.
pub fn transform_point(pose: &Matrix3x4<f64>, point: &Point3<f64>) -> Point3<f64> {
    Point3::from(pose * point.to_homogeneous())
}

/// Splits a world-to-local pose of an undistorted camera into its rotation
/// (world to local) and world-space optical centre.
pub fn decompose_pose(pose: &Matrix3x4<f64>) -> Result<(Matrix3<f64>, Point3<f64>)> {
    let rotation: Matrix3<f64> = pose.fixed_view::<3, 3>(0, 0).into_owned();
    let translation: Vector3<f64> = pose.column(3).into_owned();

    let orthonormal = (rotation.transpose() * rotation - Matrix3::identity()).norm()
        < ROTATION_TOLERANCE
        && rotation.determinant() > 0.0;
    ensure(orthonormal, Invariant::PoseRotation)?;

    let center = Point3::from(-(rotation.transpose() * translation));

    let check = Point3::from(POSE_CHECK_POINT);
    let local = transform_point(pose, &check);
    let back = rotation.transpose() * local.coords + center.coords;
    ensure(
        (back - check.coords).norm_squared() < POSE_ROUND_TRIP_SQUARED_TOLERANCE,
        Invariant::PoseRoundTrip,
    )?;

    Ok((rotation, center))
}

/// Inverse of a world-to-local pose, i.e. the local-to-world transform
/// `[R^T | c]`, built from [`decompose_pose`].
pub fn invert_pose(pose: &Matrix3x4<f64>) -> Result<Matrix3x4<f64>> {
    let (rotation, center) = decompose_pose(pose)?;

    let mut inverse = Matrix3x4::zeros();
    inverse
        .fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&rotation.transpose());
    inverse.set_column(3, &center.coords);

    let check = Point3::from(POSE_CHECK_POINT);
    let back = transform_point(&inverse, &transform_point(pose, &check));
    ensure(
        (back - check).norm_squared() < POSE_ROUND_TRIP_SQUARED_TOLERANCE,
        Invariant::PoseRoundTrip,
    )?;

    Ok(inverse)
}

/// Projects a world point into a camera.
///
/// Returns `(u, v, z)` where `z` is the coordinate along the camera's forward
/// axis in its local frame. It is not a Euclidean range, and a non-positive
/// value means the point is behind the camera (`u`, `v` are then meaningless).
pub fn project<M: CameraModel>(
    point: &Point3<f64>,
    model: &M,
    to_local: &Matrix3x4<f64>,
) -> Vector3<f64> {
    let local = transform_point(to_local, point);
    let pixel = model.project(&local);
    Vector3::new(pixel.x, pixel.y, local.z)
}

/// Inverse of [`project`]: takes `(u, v, z)` and returns the world point.
pub fn unproject<M: CameraModel>(
    pixel: &Vector3<f64>,
    model: &M,
    to_world: &Matrix3x4<f64>,
) -> Point3<f64> {
    let local = model.unproject(&Point2::new(pixel.x, pixel.y), pixel.z);
    transform_point(to_world, &local)
}

/// Intersects the ray `origin + t * direction` (`t > 0`) with the plane through
/// `plane_point` with normal `plane_normal`.
///
/// Returns `None` when the ray is (nearly) parallel to the plane or the plane
/// lies behind the ray origin.
pub fn intersect_plane(
    plane_point: &Point3<f64>,
    plane_normal: &Vector3<f64>,
    origin: &Point3<f64>,
    direction: &Vector3<f64>,
) -> Option<Point3<f64>> {
    let denom = plane_normal.dot(direction);
    let scale = plane_normal.norm() * direction.norm();
    if !(denom.abs() > PARALLEL_EPSILON * scale) {
        return None;
    }
    let t = plane_normal.dot(&(plane_point - origin)) / denom;
    if !(t > 0.0) || !t.is_finite() {
        return None;
    }
    Some(origin + direction * t)
}
