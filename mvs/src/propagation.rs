//! Checkerboard propagation of hypotheses between neighbouring pixels.
//!
//! Pixels are split by `(x + y) % 2` into two colours. Every donor offset has
//! odd parity, so a pixel only ever reads cells of the other colour, which are
//! stable while its own colour is being updated.

use crate::hypothesis::{BestHypothesis, Hypothesis, HypothesisGrids};
use crate::stage::StageContext;
use cv_core::{ensure, Invariant, Result};
use rayon::prelude::*;
use tracing::debug;

/// Offsets `(dx, dy)` of the donor pixels, grouped by direction.
///
/// Each group contributes at most one candidate: its member with the lowest
/// own cost.
#[derive(Debug, Clone, PartialEq)]
pub struct DonorPattern {
    groups: Vec<Vec<(i32, i32)>>,
}

const NEAR_REACH: i32 = 3;
const FAR_STEPS: i32 = 11;

impl DonorPattern {
    /// Adaptive checkerboard sampling: four V-shaped near groups (left, up,
    /// right, down), each the adjacent pixel plus two diagonal arms of
    /// length 3, followed by four far groups sampling every second pixel
    /// along each axis for 11 steps.
    pub fn adaptive_checkerboard() -> Result<Self> {
        // Unit direction and its perpendicular, in left, up, right, down order.
        let axes: [((i32, i32), (i32, i32)); 4] =
            [((-1, 0), (0, 1)), ((0, -1), (1, 0)), ((1, 0), (0, 1)), ((0, 1), (1, 0))];

        let mut groups = Vec::with_capacity(8);
        for &((ax, ay), (px, py)) in &axes {
            let mut group = vec![(ax, ay)];
            for s in 1..=NEAR_REACH {
                let (bx, by) = (ax * (1 + s), ay * (1 + s));
                group.push((bx - px * s, by - py * s));
                group.push((bx + px * s, by + py * s));
            }
            groups.push(group);
        }
        for &((ax, ay), _) in &axes {
            let group = (0..FAR_STEPS)
                .map(|k| (ax * (3 + 2 * k), ay * (3 + 2 * k)))
                .collect();
            groups.push(group);
        }

        Self::new(groups)
    }

    /// Custom pattern. Every offset must point to a pixel of the other
    /// checkerboard colour.
    pub fn new(groups: Vec<Vec<(i32, i32)>>) -> Result<Self> {
        let odd = groups
            .iter()
            .flatten()
            .all(|&(dx, dy)| (dx + dy).rem_euclid(2) == 1);
        ensure(odd, Invariant::CheckerboardColor)?;
        Ok(Self { groups })
    }

    pub fn groups(&self) -> &[Vec<(i32, i32)>] {
        &self.groups
    }
}

/// Runs both colour passes of one propagation step.
pub fn propagate(ctx: &StageContext<'_>, grids: &mut HypothesisGrids, pattern: &DonorPattern) -> Result<()> {
    for color in 0..2 {
        let updates = propagate_color(ctx, grids, pattern, color)?;
        apply(grids, updates);
        debug!(color, "propagation pass done");
    }
    Ok(())
}

/// Computes, without writing, the winners for every pixel of `color`.
/// Rows come back in order; cells of the other colour are `None`.
fn propagate_color(
    ctx: &StageContext<'_>,
    grids: &HypothesisGrids,
    pattern: &DonorPattern,
    color: u32,
) -> Result<Vec<Vec<Option<Hypothesis>>>> {
    (0..grids.height)
        .into_par_iter()
        .map(|y| {
            (0..grids.width)
                .map(|x| {
                    if (x + y) % 2 != color {
                        return Ok(None);
                    }
                    propagate_pixel(ctx, grids, pattern, x, y).map(Some)
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect()
}

fn apply(grids: &mut HypothesisGrids, updates: Vec<Vec<Option<Hypothesis>>>) {
    let width = grids.width as usize;
    if width == 0 {
        return;
    }
    let HypothesisGrids {
        depth,
        normal,
        cost,
        ..
    } = grids;

    depth
        .par_chunks_mut(width)
        .zip(normal.par_chunks_mut(width))
        .zip(cost.par_chunks_mut(width))
        .zip(updates.into_par_iter())
        .for_each(|(((depth_row, normal_row), cost_row), row)| {
            for (x, update) in row.into_iter().enumerate() {
                if let Some(h) = update {
                    depth_row[x] = h.depth;
                    normal_row[x] = h.normal;
                    cost_row[x] = h.cost;
                }
            }
        });
}

/// Best of the pixel's current hypothesis and one donor per pattern group.
pub fn propagate_pixel(
    ctx: &StageContext<'_>,
    grids: &HypothesisGrids,
    pattern: &DonorPattern,
    x: u32,
    y: u32,
) -> Result<Hypothesis> {
    let mut best = BestHypothesis::new(grids.get(x, y));

    for group in pattern.groups() {
        let Some(donor) = best_donor(grids, group, x, y) else {
            continue;
        };
        let cost = ctx.score(x, y, donor.depth, &donor.normal)?;
        best.offer(donor.depth, donor.normal, cost);
    }

    Ok(best.into_inner())
}

/// Lowest own-cost donor of a group; out-of-bounds and empty cells are
/// skipped, ties keep the earlier offset.
fn best_donor(grids: &HypothesisGrids, group: &[(i32, i32)], x: u32, y: u32) -> Option<Hypothesis> {
    let mut best: Option<Hypothesis> = None;
    for &(dx, dy) in group {
        let (nx, ny) = (x as isize + dx as isize, y as isize + dy as isize);
        if !grids.in_bounds(nx, ny) {
            continue;
        }
        let candidate = grids.get(nx as u32, ny as u32);
        if candidate.is_empty() {
            continue;
        }
        if best.map_or(true, |b| candidate.cost < b.cost) {
            best = Some(candidate);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatchMatchConfig;
    use crate::refinement::refine;
    use crate::synthetic::SyntheticScene;
    use nalgebra::Vector3;

    fn hypothesis(depth: f32, cost: f32) -> Hypothesis {
        Hypothesis {
            depth,
            normal: -Vector3::z(),
            cost,
        }
    }

    #[test]
    fn test_adaptive_pattern_shape() {
        let pattern = DonorPattern::adaptive_checkerboard().unwrap();
        let groups = pattern.groups();
        assert_eq!(groups.len(), 8);
        assert_eq!(groups[0], vec![(-1, 0), (-2, -1), (-2, 1), (-3, -2), (-3, 2), (-4, -3), (-4, 3)]);
        assert_eq!(groups[1][..3], [(0, -1), (-1, -2), (1, -2)]);
        assert_eq!(groups[4].len(), 11);
        assert_eq!(groups[4][0], (-3, 0));
        assert_eq!(groups[4][10], (-23, 0));
        assert_eq!(groups[7][1], (0, 5));
    }

    #[test]
    fn test_same_colour_offset_is_rejected() {
        assert!(matches!(
            DonorPattern::new(vec![vec![(1, 0), (1, 1)]]),
            Err(cv_core::Error::Invariant(Invariant::CheckerboardColor))
        ));
    }

    #[test]
    fn test_best_donor_skips_empty_and_out_of_bounds() {
        let mut grids = HypothesisGrids::new(5, 5);
        grids.set(1, 2, hypothesis(3.0, 0.4));
        grids.set(0, 1, hypothesis(5.0, 0.2));
        grids.set(0, 3, hypothesis(6.0, 0.2));

        let group = [(-1, 0), (-2, -1), (-2, 1), (-3, -2)];
        let donor = best_donor(&grids, &group, 2, 2).unwrap();
        // Tie between (0, 1) and (0, 3) keeps the earlier offset.
        assert_eq!(donor.depth, 5.0);

        assert!(best_donor(&grids, &group, 4, 0).is_none());
    }

    #[test]
    fn test_propagation_never_increases_cost() {
        let scene = SyntheticScene::fronto_parallel(32, 32, 4.0, 2).unwrap();
        let config = PatchMatchConfig::default();
        let ctx = StageContext::new(&scene.cameras, 0, &config, 2.0, 8.0);
        let pattern = DonorPattern::adaptive_checkerboard().unwrap();
        let mut grids = HypothesisGrids::new(32, 32);
        refine(&ctx, &mut grids, 0).unwrap();

        let before = grids.clone();
        propagate(&ctx, &mut grids, &pattern).unwrap();
        let mut improved = 0;
        for idx in 0..grids.len() {
            if !before.at(idx).is_empty() {
                assert!(grids.cost[idx] <= before.cost[idx]);
                if grids.cost[idx] < before.cost[idx] {
                    improved += 1;
                }
            }
        }
        assert!(improved > 0);
    }
}
