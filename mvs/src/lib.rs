//! PatchMatch multi-view stereo.
//!
//! Estimates dense per-pixel depth and normal maps for a reference camera from
//! a set of calibrated, posed photographs. Hypotheses are seeded at random,
//! then improved by alternating checkerboard propagation between neighbouring
//! pixels and random refinement around each pixel's current estimate. Every
//! candidate is scored by ZNCC photo-consistency against all other cameras,
//! combined with an occlusion-robust truncated mean.
//!
//! Builds are deterministic: identical inputs give bit-identical grids for
//! any thread count.
//!
//! ```no_run
//! use cv_mvs::{build_points_for_camera, PatchMatchBuilder, PatchMatchConfig};
//! # fn run(cameras: &[cv_mvs::MvsCamera]) -> cv_mvs::Result<()> {
//! let builder = PatchMatchBuilder::with_config(cameras, PatchMatchConfig::default());
//! let grids = builder.build_depth_map(0, 1.0, 20.0)?;
//! let cloud = build_points_for_camera(&grids, &cameras[0])?;
//! println!("{} points", cloud.len());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod builder;
pub mod camera;
pub mod config;
pub mod cost;
pub mod hypothesis;
pub mod points;
pub mod propagation;
pub mod random;
pub mod refinement;
pub mod stage;
pub mod synthetic;

pub use aggregate::CostAggregator;
pub use builder::{BuildStage, DepthMapBuild, PatchMatchBuilder};
pub use camera::MvsCamera;
pub use config::PatchMatchConfig;
pub use cost::{zncc_cost, CostEvaluator};
pub use hypothesis::{GridStats, Hypothesis, HypothesisGrids, NO_COST, NO_DEPTH};
pub use points::{build_points, build_points_for_camera};
pub use propagation::DonorPattern;

pub use cv_core::{Error, Invariant, Result, SurfelCloud};

/// Builds the depth map of camera `reference` with `config`.
pub fn build_depth_map(
    cameras: &[MvsCamera],
    reference: usize,
    depth_min: f32,
    depth_max: f32,
    config: &PatchMatchConfig,
) -> Result<HypothesisGrids> {
    PatchMatchBuilder::with_config(cameras, config.clone()).build_depth_map(reference, depth_min, depth_max)
}
