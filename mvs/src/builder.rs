//! Driver of one depth-map build: seeding refinement, then alternating
//! propagation and refinement for a fixed number of iterations.

use crate::camera::MvsCamera;
use crate::config::PatchMatchConfig;
use crate::hypothesis::{GridStats, HypothesisGrids};
use crate::propagation::{propagate, DonorPattern};
use crate::refinement::refine;
use crate::stage::StageContext;
use cv_core::{ensure, with_thread_count, Error, Invariant, Result};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Progress of a [`DepthMapBuild`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// Grids allocated, every pixel empty.
    Uninitialized,
    /// First refinement pass done; hypotheses are random.
    Seeded,
    /// The given number of propagation + refinement rounds are done.
    Iterating(usize),
    Done,
}

/// Entry point for depth-map builds over a fixed camera set.
#[derive(Debug, Clone)]
pub struct PatchMatchBuilder<'a> {
    cameras: &'a [MvsCamera],
    config: PatchMatchConfig,
}

impl<'a> PatchMatchBuilder<'a> {
    pub fn new(cameras: &'a [MvsCamera]) -> Self {
        Self::with_config(cameras, PatchMatchConfig::default())
    }

    pub fn with_config(cameras: &'a [MvsCamera], config: PatchMatchConfig) -> Self {
        Self { cameras, config }
    }

    pub fn config(&self) -> &PatchMatchConfig {
        &self.config
    }

    pub fn cameras(&self) -> &'a [MvsCamera] {
        self.cameras
    }

    /// Validates the inputs and prepares a build that can be stepped
    /// through stage by stage. Runs on the current rayon pool.
    pub fn start(&self, reference: usize, depth_min: f32, depth_max: f32) -> Result<DepthMapBuild<'_>> {
        self.config.validate()?;
        ensure(reference < self.cameras.len(), Invariant::ReferenceIndex)?;
        ensure(self.cameras.len() >= 2, Invariant::CameraCount)?;
        if !(depth_min > 0.0 && depth_min <= depth_max && depth_max.is_finite()) {
            return Err(Error::InvalidParameters(format!(
                "depth range must satisfy 0 < min <= max, got [{depth_min}, {depth_max}]"
            )));
        }

        let camera = &self.cameras[reference];
        let ctx = StageContext::new(self.cameras, reference, &self.config, depth_min, depth_max);
        let grids = HypothesisGrids::new(camera.width(), camera.height());
        debug!(
            "Depth map build prepared for camera {} ({}x{}, {} neighbours)",
            reference,
            camera.width(),
            camera.height(),
            self.cameras.len() - 1
        );

        Ok(DepthMapBuild {
            ctx,
            pattern: DonorPattern::adaptive_checkerboard()?,
            grids,
            stage: BuildStage::Uninitialized,
            reference,
            started: Instant::now(),
        })
    }

    /// Runs a complete build for camera `reference` and returns its grids.
    ///
    /// When `num_threads` is configured the build runs inside a dedicated
    /// pool of that size.
    pub fn build_depth_map(&self, reference: usize, depth_min: f32, depth_max: f32) -> Result<HypothesisGrids> {
        with_thread_count(self.config.num_threads, || {
            self.start(reference, depth_min, depth_max)?.finish()
        })?
    }
}

/// A depth-map build in progress.
pub struct DepthMapBuild<'a> {
    ctx: StageContext<'a>,
    pattern: DonorPattern,
    grids: HypothesisGrids,
    stage: BuildStage,
    reference: usize,
    started: Instant,
}

impl<'a> DepthMapBuild<'a> {
    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn grids(&self) -> &HypothesisGrids {
        &self.grids
    }

    pub fn stats(&self) -> GridStats {
        self.grids.stats(self.ctx.config.good_cost)
    }

    /// Advances the build by one stage and returns the new stage.
    pub fn step(&mut self) -> Result<BuildStage> {
        let iterations = self.ctx.config.iterations;
        let next = match self.stage {
            BuildStage::Uninitialized => {
                let t = Instant::now();
                refine(&self.ctx, &mut self.grids, 0)?;
                self.report("seed refinement", t);
                BuildStage::Seeded
            }
            BuildStage::Seeded if iterations == 0 => BuildStage::Done,
            BuildStage::Iterating(done) if done >= iterations => BuildStage::Done,
            BuildStage::Seeded | BuildStage::Iterating(_) => {
                let iteration = match self.stage {
                    BuildStage::Iterating(done) => done + 1,
                    _ => 1,
                };

                let t = Instant::now();
                propagate(&self.ctx, &mut self.grids, &self.pattern)?;
                self.report(&format!("propagation {iteration}/{iterations}"), t);

                let t = Instant::now();
                refine(&self.ctx, &mut self.grids, iteration)?;
                self.report(&format!("refinement {iteration}/{iterations}"), t);

                BuildStage::Iterating(iteration)
            }
            BuildStage::Done => BuildStage::Done,
        };

        if next != self.stage {
            debug!("Camera {}: {:?} -> {:?}", self.reference, self.stage, next);
        }
        self.stage = next;
        Ok(next)
    }

    /// Steps until [`BuildStage::Done`].
    pub fn run(&mut self) -> Result<()> {
        while self.stage != BuildStage::Done {
            self.step()?;
        }
        Ok(())
    }

    /// Completes any remaining stages and hands out the grids.
    pub fn finish(mut self) -> Result<HypothesisGrids> {
        self.run()?;

        let stats = self.stats();
        if stats.valid == 0 {
            warn!(
                "Depth map of camera {} has no valid pixel ({} total)",
                self.reference, stats.total
            );
        }
        info!(
            "Depth map of camera {} done in {:.2?}: {:.1}% valid, {:.1}% good",
            self.reference,
            self.started.elapsed(),
            stats.valid_fraction() * 100.0,
            stats.good_fraction() * 100.0
        );
        Ok(self.grids)
    }

    fn report(&self, stage: &str, started: Instant) {
        let stats = self.stats();
        info!(
            "Camera {} {} in {:.2?}: valid {}/{} (mean cost {:.3}), good {} (mean cost {:.3})",
            self.reference,
            stage,
            started.elapsed(),
            stats.valid,
            stats.total,
            stats.mean_cost,
            stats.good,
            stats.good_mean_cost
        );
    }
}
