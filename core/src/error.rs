use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invariant violated: {0}")]
    Invariant(Invariant),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Fatal consistency checks.
///
/// Each variant tags exactly one check so a failed build reports which
/// assumption broke. None of them is recoverable: they indicate a bug or
/// malformed input data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    /// Pose matrix rotation block is not orthonormal.
    PoseRotation,
    /// Re-projecting a check point through a pose and its inverse did not return it.
    PoseRoundTrip,
    /// Reference camera index is outside the camera array.
    ReferenceIndex,
    /// Fewer than two cameras were supplied.
    CameraCount,
    /// A camera image does not match its calibration size.
    ImageDimensions,
    /// Depth grid and colour image differ in size.
    PointCloudDimensions,
    /// A stored depth is neither the sentinel nor positive.
    PositiveDepth,
    /// Point cloud output arrays have different lengths.
    AlignedOutputs,
    /// A propagation donor has the same checkerboard colour as the receiver.
    CheckerboardColor,
    /// Zero-normalized cross-correlation produced NaN.
    FiniteCorrelation,
    /// Reference and projected patches differ in length.
    PatchLength,
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Invariant::PoseRotation => "pose rotation must be orthonormal",
            Invariant::PoseRoundTrip => "pose inverse must round-trip a check point within squared distance 1e-5",
            Invariant::ReferenceIndex => "reference camera index must be in range",
            Invariant::CameraCount => "at least two cameras are required",
            Invariant::ImageDimensions => "camera image must match calibration size",
            Invariant::PointCloudDimensions => "depth grid must match colour image size",
            Invariant::PositiveDepth => "valid depth must be positive",
            Invariant::AlignedOutputs => "point cloud arrays must be index-aligned",
            Invariant::CheckerboardColor => "propagation donors must have the opposite colour",
            Invariant::FiniteCorrelation => "ZNCC must not be NaN",
            Invariant::PatchLength => "reference and projected patches must have equal length",
        };
        write!(f, "{msg} ({self:?})")
    }
}

impl From<Invariant> for Error {
    fn from(invariant: Invariant) -> Self {
        Error::Invariant(invariant)
    }
}

/// Returns `Err(Error::Invariant(invariant))` unless `condition` holds.
pub fn ensure(condition: bool, invariant: Invariant) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::Invariant(invariant))
    }
}
