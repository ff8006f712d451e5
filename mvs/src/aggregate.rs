use crate::config::PatchMatchConfig;

/// Truncated mean of the best neighbour costs.
///
/// Sorted ascending, the best cost anchors the average and every following
/// cost joins it while it stays under `best * cost_ratio` and under
/// `cost_value_limit`, up to `best_k_limit` contributors. Views that cannot
/// see the surface tend to score badly and fall out of the average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostAggregator {
    pub best_k_limit: usize,
    pub cost_ratio: f32,
    pub cost_value_limit: f32,
}

impl CostAggregator {
    pub fn new(best_k_limit: usize, cost_ratio: f32, cost_value_limit: f32) -> Self {
        Self {
            best_k_limit,
            cost_ratio,
            cost_value_limit,
        }
    }

    pub fn from_config(config: &PatchMatchConfig) -> Self {
        Self::new(config.best_k_limit, config.cost_ratio, config.cost_value_limit)
    }

    /// Aggregates per-neighbour costs. `None` entries (views that could not be
    /// evaluated) are dropped first; if nothing is left the result is `None`.
    pub fn aggregate<I>(&self, costs: I) -> Option<f32>
    where
        I: IntoIterator<Item = Option<f32>>,
    {
        let mut costs: Vec<f32> = costs.into_iter().flatten().collect();
        self.aggregate_valid(&mut costs)
    }

    /// Same as [`CostAggregator::aggregate`] over already filtered costs.
    /// The slice is sorted in place.
    pub fn aggregate_valid(&self, costs: &mut [f32]) -> Option<f32> {
        costs.sort_unstable_by(|a, b| a.total_cmp(b));
        let (&best, rest) = costs.split_first()?;

        let mut sum = best;
        let mut weight = 1.0f32;
        let limit = self.best_k_limit.min(costs.len()).saturating_sub(1);
        for &cost in rest.iter().take(limit) {
            if cost < best * self.cost_ratio && cost < self.cost_value_limit {
                sum += cost;
                weight += 1.0;
            } else {
                break;
            }
        }
        Some(sum / weight)
    }
}

impl Default for CostAggregator {
    fn default() -> Self {
        Self::from_config(&PatchMatchConfig::default())
    }
}
