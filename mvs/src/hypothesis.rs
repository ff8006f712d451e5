//! Per-pixel plane hypotheses and the grids that hold them.
//!
//! The grids keep raw numeric sentinels: `NO_DEPTH` marks a pixel that never
//! received a hypothesis and `NO_COST` doubles as "worst possible score".
//! A pixel with `NO_DEPTH` always carries `NO_COST`; the converse does not
//! hold, a real hypothesis may score exactly `NO_COST`.

use image::{GrayImage, Luma};
use nalgebra::Vector3;
use rayon::prelude::*;

/// Depth of a pixel without hypothesis. No real depth is ever zero.
pub const NO_DEPTH: f32 = 0.0;
/// Cost of a pixel without hypothesis, and the worst possible score.
pub const NO_COST: f32 = 1.0;

/// Candidate local surface: a depth along the reference camera's forward axis
/// and a unit normal in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hypothesis {
    pub depth: f32,
    pub normal: Vector3<f32>,
    pub cost: f32,
}

impl Hypothesis {
    pub fn empty() -> Self {
        Self {
            depth: NO_DEPTH,
            normal: Vector3::zeros(),
            cost: NO_COST,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.depth == NO_DEPTH
    }

    /// Score a challenger has to beat. `None` means any scorable candidate wins.
    pub fn score(&self) -> Option<f32> {
        if self.is_empty() {
            None
        } else {
            Some(self.cost)
        }
    }
}

/// Winner-take-all selection over candidates evaluated in order.
///
/// Ties keep the earlier winner.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BestHypothesis {
    hypothesis: Hypothesis,
    score: Option<f32>,
}

impl BestHypothesis {
    pub(crate) fn new(current: Hypothesis) -> Self {
        Self {
            score: current.score(),
            hypothesis: current,
        }
    }

    pub(crate) fn offer(&mut self, depth: f32, normal: Vector3<f32>, cost: Option<f32>) {
        let Some(cost) = cost else {
            return;
        };
        let wins = match self.score {
            None => true,
            Some(best) => cost < best,
        };
        if wins {
            self.hypothesis = Hypothesis { depth, normal, cost };
            self.score = Some(cost);
        }
    }

    pub(crate) fn into_inner(self) -> Hypothesis {
        self.hypothesis
    }
}

/// Summary of a grid triple, as reported after each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridStats {
    pub total: usize,
    /// Pixels with a hypothesis and a cost below `NO_COST`.
    pub valid: usize,
    pub mean_cost: f64,
    /// Valid pixels with a cost below the "good" threshold.
    pub good: usize,
    pub good_mean_cost: f64,
}

impl GridStats {
    pub fn valid_fraction(&self) -> f64 {
        fraction(self.valid, self.total)
    }

    pub fn good_fraction(&self) -> f64 {
        fraction(self.good, self.total)
    }
}

fn fraction(n: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        n as f64 / total as f64
    }
}

/// Aligned depth, normal and cost grids of one reference camera, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct HypothesisGrids {
    pub width: u32,
    pub height: u32,
    pub depth: Vec<f32>,
    pub normal: Vec<Vector3<f32>>,
    pub cost: Vec<f32>,
}

impl HypothesisGrids {
    pub fn new(width: u32, height: u32) -> Self {
        let size = width as usize * height as usize;
        Self {
            width,
            height,
            depth: vec![NO_DEPTH; size],
            normal: vec![Vector3::zeros(); size],
            cost: vec![NO_COST; size],
        }
    }

    pub fn len(&self) -> usize {
        self.depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth.is_empty()
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn in_bounds(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && x < self.width as isize && y < self.height as isize
    }

    pub fn get(&self, x: u32, y: u32) -> Hypothesis {
        self.at(self.index(x, y))
    }

    pub fn at(&self, idx: usize) -> Hypothesis {
        Hypothesis {
            depth: self.depth[idx],
            normal: self.normal[idx],
            cost: self.cost[idx],
        }
    }

    pub fn set(&mut self, x: u32, y: u32, hypothesis: Hypothesis) {
        let idx = self.index(x, y);
        self.depth[idx] = hypothesis.depth;
        self.normal[idx] = hypothesis.normal;
        self.cost[idx] = hypothesis.cost;
    }

    pub fn stats(&self, good_cost: f32) -> GridStats {
        let (valid, cost_sum, good, good_sum) = self
            .depth
            .par_iter()
            .zip(self.cost.par_iter())
            .filter(|&(&d, &c)| d != NO_DEPTH && c != NO_COST)
            .map(|(_, &c)| {
                let good = c < good_cost;
                (
                    1usize,
                    c as f64,
                    good as usize,
                    if good { c as f64 } else { 0.0 },
                )
            })
            .reduce(
                || (0, 0.0, 0, 0.0),
                |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2, a.3 + b.3),
            );

        GridStats {
            total: self.len(),
            valid,
            mean_cost: if valid > 0 { cost_sum / valid as f64 } else { 0.0 },
            good,
            good_mean_cost: if good > 0 { good_sum / good as f64 } else { 0.0 },
        }
    }

    /// Depth normalised to the valid depth range; pixels without hypothesis are black.
    pub fn depth_to_image(&self) -> GrayImage {
        let (min, max) = self
            .depth
            .iter()
            .filter(|&&d| d != NO_DEPTH)
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &d| {
                (lo.min(d), hi.max(d))
            });
        let range = max - min;

        GrayImage::from_fn(self.width, self.height, |x, y| {
            let d = self.depth[self.index(x, y)];
            let v = if d == NO_DEPTH {
                0
            } else if range > 0.0 {
                (1.0 + (d - min) / range * 254.0) as u8
            } else {
                255
            };
            Luma([v])
        })
    }

    /// Cost mapped so that a perfect match is white and `NO_COST` is black.
    pub fn cost_to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let c = self.cost[self.index(x, y)].clamp(0.0, NO_COST);
            Luma([((NO_COST - c) * 255.0) as u8])
        })
    }
}
