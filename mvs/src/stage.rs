use crate::aggregate::CostAggregator;
use crate::camera::MvsCamera;
use crate::config::PatchMatchConfig;
use crate::cost::CostEvaluator;
use cv_core::Result;
use nalgebra::Vector3;

/// Everything a refinement or propagation pass reads besides the grids.
pub struct StageContext<'a> {
    pub evaluator: CostEvaluator<'a>,
    pub aggregator: CostAggregator,
    pub config: &'a PatchMatchConfig,
    pub depth_min: f32,
    pub depth_max: f32,
}

impl<'a> StageContext<'a> {
    pub fn new(
        cameras: &'a [MvsCamera],
        reference: usize,
        config: &'a PatchMatchConfig,
        depth_min: f32,
        depth_max: f32,
    ) -> Self {
        Self {
            evaluator: CostEvaluator::new(cameras, reference, config.patch_radius, config.min_variance),
            aggregator: CostAggregator::from_config(config),
            config,
            depth_min,
            depth_max,
        }
    }

    pub fn reference_camera(&self) -> &'a MvsCamera {
        &self.evaluator.cameras()[self.evaluator.reference()]
    }

    /// Aggregated cost of `(depth, normal)` at pixel `(x, y)` over all
    /// neighbour cameras, `None` if no neighbour could evaluate it.
    pub fn score(&self, x: u32, y: u32, depth: f32, normal: &Vector3<f32>) -> Result<Option<f32>> {
        let mut costs = Vec::with_capacity(self.evaluator.cameras().len());
        for neighbour in self.evaluator.neighbours() {
            if let Some(cost) = self.evaluator.evaluate(x, y, depth, normal, neighbour)? {
                costs.push(cost);
            }
        }
        Ok(self.aggregator.aggregate_valid(&mut costs))
    }
}
