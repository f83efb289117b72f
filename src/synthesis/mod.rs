//! Height synthesis
//!
//! Fills a [`HeightGrid`] in place from random samples, fault lines or
//! simplex noise, and smooths it. Every generator fully replaces the grid's
//! heights and clears its room/corridor layout.

mod simplex;

pub use simplex::{sample_simplex_fbm, simplex_2d, NoiseTables, NOISE_TABLES};

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f32::consts::TAU;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::grid::HeightGrid;

/// Height generation mode
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeightMode {
    /// Independent uniform samples in `[-amplitude, amplitude]`
    Random,
    /// Repeated fault-line displacement with decaying strength
    Fault,
    /// Fractal simplex noise
    Noise,
}

/// Fractal layering for noise mode
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseConfig {
    /// Number of noise layers
    pub octaves: usize,
    /// Amplitude decay per octave (controls roughness)
    pub persistence: f32,
    /// Frequency multiplier per octave
    pub lacunarity: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Derive the noise-space offset for a seed
///
/// The noise itself is a fixed function; the seed only moves the window the
/// grid samples from.
pub fn noise_offset(seed: u32) -> Vec2 {
    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
    Vec2::new(rng.gen_range(0.0..1024.0), rng.gen_range(0.0..1024.0))
}

/// Replace every height with an independent uniform sample
pub fn random_heights<R: Rng>(grid: &mut HeightGrid, amplitude: f32, rng: &mut R) {
    grid.clear_layout();
    for sample in grid.samples_mut() {
        sample.position.y = (rng.gen::<f32>() * 2.0 - 1.0) * amplitude;
    }
}

/// Build plateaus and ridges from random fault lines
///
/// Heights start at 0. Each iteration picks a line through a random point at
/// a random angle, raises every sample on its left by `d` and lowers the rest
/// by `d`, where `d` falls linearly from `amplitude` to `amplitude / iterations`.
pub fn fault_heights<R: Rng>(
    grid: &mut HeightGrid,
    amplitude: f32,
    iterations: usize,
    rng: &mut R,
) {
    grid.clear_layout();
    for sample in grid.samples_mut() {
        sample.position.y = 0.0;
    }
    if iterations == 0 {
        return;
    }

    let max_x = (grid.width() - 1) as f32;
    let max_z = (grid.height() - 1) as f32;

    for i in 0..iterations {
        let displacement = amplitude * (iterations - i) as f32 / iterations as f32;
        let origin = Vec2::new(rng.gen_range(0.0..=max_x), rng.gen_range(0.0..=max_z));
        let angle: f32 = rng.gen_range(0.0..TAU);
        let direction = Vec2::new(angle.cos(), angle.sin());

        for sample in grid.samples_mut() {
            let offset = Vec2::new(sample.position.x, sample.position.z) - origin;
            if direction.perp_dot(offset) > 0.0 {
                sample.position.y += displacement;
            } else {
                sample.position.y -= displacement;
            }
        }
    }
}

/// Sample fractal simplex noise at every grid position
///
/// # Errors
///
/// Returns `InvalidParameter` if the wavelength is not strictly positive.
pub fn noise_heights(
    grid: &mut HeightGrid,
    amplitude: f32,
    wavelength: f32,
    config: &NoiseConfig,
    offset: Vec2,
) -> Result<()> {
    if !wavelength.is_finite() || wavelength <= 0.0 {
        return Err(TerrainError::InvalidParameter(format!(
            "wavelength must be positive (got {})",
            wavelength
        )));
    }

    let frequency = 1.0 / wavelength;
    grid.clear_layout();
    for sample in grid.samples_mut() {
        let p = (Vec2::new(sample.position.x, sample.position.z) + offset) * frequency;
        sample.position.y = sample_simplex_fbm(&NOISE_TABLES, p, config) * amplitude;
    }
    Ok(())
}

/// Blend every height towards the mean of its in-bounds 8-neighbourhood
///
/// Each pass computes `h' = (1 - factor) * h + factor * mean` from the
/// previous pass's heights. A factor of 0 leaves the grid untouched.
///
/// Cells inside a room or corridor keep their carved height, so plateaus stay
/// flat; they still count towards their neighbours' means.
///
/// # Errors
///
/// Returns `InvalidParameter` if the factor is negative or not finite.
pub fn smooth_heights(grid: &mut HeightGrid, factor: f32, passes: usize) -> Result<()> {
    if !factor.is_finite() || factor < 0.0 {
        return Err(TerrainError::InvalidParameter(format!(
            "smoothing factor must be finite and >= 0 (got {})",
            factor
        )));
    }
    if factor == 0.0 {
        return Ok(());
    }

    for _ in 0..passes {
        let source = grid.heights();
        let width = grid.width();
        let smoothed: Vec<f32> = (0..source.len())
            .map(|i| {
                let (x, z) = (i % width, i / width);
                let (sum, count) = grid
                    .neighbors8(x, z)
                    .fold((0.0, 0usize), |(sum, count), (nx, nz)| {
                        (sum + source[nz * width + nx], count + 1)
                    });
                let mean = sum / count as f32;
                (1.0 - factor) * source[i] + factor * mean
            })
            .collect();

        for (sample, height) in grid.samples_mut().iter_mut().zip(smoothed) {
            if sample.room.is_none() && sample.corridor.is_none() {
                sample.position.y = height;
            }
        }
    }
    Ok(())
}
