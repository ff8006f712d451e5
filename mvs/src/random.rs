//! Deterministic per-pixel random draws.
//!
//! Every pixel of every stage gets a fresh generator seeded only from the
//! iteration number and the pixel's linear index, so results do not depend on
//! thread count or scheduling.

use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

/// Generator for pixel `pixel_index` at `iteration`.
pub fn pixel_rng(iteration: usize, pixel_index: usize) -> StdRng {
    StdRng::seed_from_u64(mix_seed(iteration as u64, pixel_index as u64))
}

fn mix_seed(iteration: u64, pixel_index: u64) -> u64 {
    // splitmix64 finalizer over both inputs
    let mut z = iteration
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(pixel_index)
        .wrapping_add(0xD1B5_4A32_D192_ED03);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Uniform sample from `[lo, hi]`; degenerate ranges return `lo`.
pub fn uniform<R: Rng>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    if lo < hi {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

/// Unit normal, uniformly distributed over the hemisphere facing a camera
/// that looks along its local +Z, returned in world coordinates.
pub fn random_normal_facing_camera<R: Rng>(
    rotation_to_world: &Matrix3<f64>,
    rng: &mut R,
) -> Vector3<f32> {
    let z: f32 = rng.gen_range(-1.0..0.0);
    let phi: f32 = rng.gen_range(0.0..TAU);
    let r = (1.0 - z * z).max(0.0).sqrt();
    let local = Vector3::new(r * phi.cos(), r * phi.sin(), z);
    (rotation_to_world.cast::<f32>() * local).normalize()
}
