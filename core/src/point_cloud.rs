use crate::error::{ensure, Invariant, Result};
use nalgebra::{Point3, Vector3};

/// Oriented, coloured points with a footprint radius each.
///
/// All four arrays are index-aligned; constructors refuse anything else.
#[derive(Debug, Clone, Default)]
pub struct SurfelCloud {
    pub points: Vec<Point3<f64>>,
    pub radii: Vec<f64>,
    pub normals: Vec<Vector3<f64>>,
    pub colors: Vec<[u8; 3]>,
}

impl SurfelCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            radii: Vec::with_capacity(capacity),
            normals: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
        }
    }

    pub fn from_parts(
        points: Vec<Point3<f64>>,
        radii: Vec<f64>,
        normals: Vec<Vector3<f64>>,
        colors: Vec<[u8; 3]>,
    ) -> Result<Self> {
        let cloud = Self {
            points,
            radii,
            normals,
            colors,
        };
        cloud.check_aligned()?;
        Ok(cloud)
    }

    pub fn push(&mut self, point: Point3<f64>, radius: f64, normal: Vector3<f64>, color: [u8; 3]) {
        self.points.push(point);
        self.radii.push(radius);
        self.normals.push(normal);
        self.colors.push(color);
    }

    pub fn check_aligned(&self) -> Result<()> {
        let n = self.points.len();
        ensure(
            self.radii.len() == n && self.normals.len() == n && self.colors.len() == n,
            Invariant::AlignedOutputs,
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
