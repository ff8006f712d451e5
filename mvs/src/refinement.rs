//! Stochastic local search around each pixel's current hypothesis.

use crate::hypothesis::{BestHypothesis, Hypothesis, HypothesisGrids, NO_DEPTH};
use crate::random::{pixel_rng, random_normal_facing_camera, uniform};
use crate::stage::StageContext;
use cv_core::Result;
use nalgebra::Vector3;
use rayon::prelude::*;

/// Runs one refinement pass over every pixel.
///
/// Pixels only touch their own cells, so rows are processed in parallel in
/// any order. With empty grids this seeds every pixel with random hypotheses.
pub fn refine(ctx: &StageContext<'_>, grids: &mut HypothesisGrids, iteration: usize) -> Result<()> {
    let width = grids.width as usize;
    if grids.is_empty() {
        return Ok(());
    }
    let deviation = ctx.config.deviation(iteration);

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
        .enumerate()
        .try_for_each(|(y, ((depth_row, normal_row), cost_row))| {
            for x in 0..width {
                let current = Hypothesis {
                    depth: depth_row[x],
                    normal: normal_row[x],
                    cost: cost_row[x],
                };
                let best = refine_pixel(ctx, x as u32, y as u32, width, current, iteration, deviation)?;
                depth_row[x] = best.depth;
                normal_row[x] = best.normal;
                cost_row[x] = best.cost;
            }
            Ok(())
        })
}

/// Tries the 3x3 combinations of {current, perturbed, random} depth and
/// normal at one pixel and keeps the cheapest.
pub fn refine_pixel(
    ctx: &StageContext<'_>,
    x: u32,
    y: u32,
    width: usize,
    current: Hypothesis,
    iteration: usize,
    deviation: f32,
) -> Result<Hypothesis> {
    let mut rng = pixel_rng(iteration, y as usize * width + x as usize);
    let rotation = &ctx.reference_camera().rotation_to_world;

    let d0 = current.depth;
    let n0 = current.normal;

    // An empty pixel perturbs around zero, which clamps to `depth_min`.
    let dp = uniform(&mut rng, d0 * (1.0 - deviation), d0 * (1.0 + deviation))
        .clamp(ctx.depth_min, ctx.depth_max);
    let nudge = random_normal_facing_camera(rotation, &mut rng);
    let np = (n0 + nudge * deviation)
        .try_normalize(f32::EPSILON)
        .unwrap_or(nudge);

    let dr = uniform(&mut rng, ctx.depth_min, ctx.depth_max);
    let nr = random_normal_facing_camera(rotation, &mut rng);

    let depths = [d0, dp, dr];
    let normals: [Vector3<f32>; 3] = [n0, np, nr];

    let mut best = BestHypothesis::new(current);
    for (k, (d, n)) in depths
        .iter()
        .flat_map(|d| normals.iter().map(move |n| (*d, *n)))
        .enumerate()
    {
        if d == NO_DEPTH {
            continue;
        }
        // The current hypothesis already carries its own score.
        if k == 0 {
            continue;
        }
        let cost = ctx.score(x, y, d, &n)?;
        best.offer(d, n, cost);
    }

    Ok(best.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatchMatchConfig;
    use crate::synthetic::{SyntheticPlane, SyntheticScene};

    #[test]
    fn test_seeding_fills_interior() {
        let scene = SyntheticScene::fronto_parallel(32, 32, 4.0, 2).unwrap();
        let config = PatchMatchConfig::default();
        let ctx = StageContext::new(&scene.cameras, 0, &config, 2.0, 8.0);
        let mut grids = HypothesisGrids::new(32, 32);

        refine(&ctx, &mut grids, 0).unwrap();

        let h = grids.get(16, 16);
        assert!(!h.is_empty());
        assert!((2.0..=8.0).contains(&h.depth));
        assert!((h.normal.norm() - 1.0).abs() < 1e-4);
        // Border pixels cannot be scored and stay empty.
        assert!(grids.get(0, 0).is_empty());
        assert_eq!(grids.get(0, 0).cost, crate::NO_COST);
    }

    #[test]
    fn test_seeding_scores_depth_min() {
        let scene = SyntheticScene::fronto_parallel(32, 32, 2.0, 2).unwrap();
        let config = PatchMatchConfig::default();
        let ctx = StageContext::new(&scene.cameras, 0, &config, 2.0, 8.0);
        let mut grids = HypothesisGrids::new(32, 32);

        refine(&ctx, &mut grids, 0).unwrap();

        let mut interior = 0;
        let mut at_min = 0;
        for y in 8..24 {
            for x in 8..24 {
                interior += 1;
                if grids.get(x, y).depth == 2.0 {
                    at_min += 1;
                }
            }
        }
        assert!(at_min * 10 > interior, "{at_min}/{interior} pixels seeded at depth_min");
    }

    #[test]
    fn test_refinement_never_increases_cost() {
        let scene = SyntheticScene::new(
            32,
            32,
            SyntheticPlane::new(4.0, nalgebra::Vector3::new(0.1, 0.0, -1.0)),
            &[0.3, -0.3],
        )
        .unwrap();
        let config = PatchMatchConfig::default();
        let ctx = StageContext::new(&scene.cameras, 0, &config, 2.0, 8.0);
        let mut grids = HypothesisGrids::new(32, 32);
        refine(&ctx, &mut grids, 0).unwrap();

        for iteration in 1..4 {
            let before = grids.clone();
            refine(&ctx, &mut grids, iteration).unwrap();
            for idx in 0..grids.len() {
                if !before.at(idx).is_empty() {
                    assert!(grids.cost[idx] <= before.cost[idx]);
                }
            }
        }
    }

    #[test]
    fn test_refinement_is_reproducible() {
        let scene = SyntheticScene::fronto_parallel(24, 24, 4.0, 2).unwrap();
        let config = PatchMatchConfig::default();
        let ctx = StageContext::new(&scene.cameras, 0, &config, 2.0, 8.0);
        let mut a = HypothesisGrids::new(24, 24);
        let mut b = HypothesisGrids::new(24, 24);
        refine(&ctx, &mut a, 0).unwrap();
        refine(&ctx, &mut b, 0).unwrap();
        assert_eq!(a, b);
    }
}
