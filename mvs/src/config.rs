use cv_core::{Error, Result};

/// Tuning knobs of the PatchMatch depth-map builder.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchMatchConfig {
    /// Propagation + refinement rounds run after the seeding refinement.
    pub iterations: usize,
    /// Half-size of the square ZNCC window (`2r + 1` pixels per side).
    pub patch_radius: u32,
    /// Maximum number of neighbour costs averaged into one score.
    pub best_k_limit: usize,
    /// Costs above `best * cost_ratio` are treated as occluded views.
    pub cost_ratio: f32,
    /// Costs at or above this value never join the average (except the best one).
    pub cost_value_limit: f32,
    /// Centred sum of squares under which a patch counts as textureless.
    pub min_variance: f32,
    /// Relative perturbation window at the first iteration.
    pub deviation_start: f32,
    /// Relative perturbation window at the last iteration.
    pub deviation_end: f32,
    /// Threshold separating "good" pixels in statistics.
    pub good_cost: f32,
    /// Worker count of a dedicated pool; `None` runs on the global pool.
    pub num_threads: Option<usize>,
}

impl Default for PatchMatchConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            patch_radius: 3,
            best_k_limit: 5,
            cost_ratio: 1.5,
            cost_value_limit: 0.5,
            min_variance: 0.001,
            deviation_start: 0.8,
            deviation_end: 0.1,
            good_cost: 0.3,
            num_threads: None,
        }
    }
}

impl PatchMatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_patch_radius(mut self, radius: u32) -> Self {
        self.patch_radius = radius;
        self
    }

    pub fn with_aggregation(mut self, best_k_limit: usize, cost_ratio: f32, cost_value_limit: f32) -> Self {
        self.best_k_limit = best_k_limit;
        self.cost_ratio = cost_ratio;
        self.cost_value_limit = cost_value_limit;
        self
    }

    pub fn with_min_variance(mut self, min_variance: f32) -> Self {
        self.min_variance = min_variance;
        self
    }

    pub fn with_deviation(mut self, start: f32, end: f32) -> Self {
        self.deviation_start = start;
        self.deviation_end = end;
        self
    }

    pub fn with_good_cost(mut self, good_cost: f32) -> Self {
        self.good_cost = good_cost;
        self
    }

    pub fn with_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Perturbation window for refinement at `iteration`, shrinking linearly
    /// from `deviation_start` to `deviation_end`.
    pub fn deviation(&self, iteration: usize) -> f32 {
        let t = if self.iterations == 0 {
            1.0
        } else {
            (iteration.min(self.iterations) as f32) / self.iterations as f32
        };
        self.deviation_start * (1.0 - t) + self.deviation_end * t
    }

    pub fn validate(&self) -> Result<()> {
        if self.patch_radius == 0 {
            return Err(Error::InvalidParameters(
                "patch_radius must be >= 1".to_string(),
            ));
        }
        if self.best_k_limit == 0 {
            return Err(Error::InvalidParameters(
                "best_k_limit must be >= 1".to_string(),
            ));
        }
        if !(self.cost_ratio >= 1.0) {
            return Err(Error::InvalidParameters(format!(
                "cost_ratio must be >= 1, got {}",
                self.cost_ratio
            )));
        }
        let unit = |v: f32| v > 0.0 && v <= 1.0;
        if !unit(self.cost_value_limit) || !unit(self.good_cost) {
            return Err(Error::InvalidParameters(format!(
                "cost_value_limit ({}) and good_cost ({}) must be in (0, 1]",
                self.cost_value_limit, self.good_cost
            )));
        }
        if !(self.min_variance > 0.0) {
            return Err(Error::InvalidParameters(
                "min_variance must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.deviation_start) || !(0.0..1.0).contains(&self.deviation_end) {
            return Err(Error::InvalidParameters(format!(
                "deviation window must be in [0, 1), got {}..{}",
                self.deviation_start, self.deviation_end
            )));
        }
        if self.num_threads == Some(0) {
            return Err(Error::InvalidParameters(
                "num_threads must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
