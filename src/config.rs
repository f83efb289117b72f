//! Terrain configuration and builder
//!
//! This module provides the configuration types for deterministic terrain and
//! dungeon generation.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::grid::validate_dimensions;
use crate::synthesis::NoiseConfig;

/// Upper bound for `max_depth`; deeper trees only add empty nodes
const MAX_QUADTREE_DEPTH: usize = 12;

/// Configuration for deterministic terrain generation
///
/// The same configuration, driven through the same sequence of generation
/// calls, always produces the identical terrain.
///
/// # Example
///
/// ```rust
/// use voronoi_dungeon_terrain::*;
///
/// let config = TerrainConfigBuilder::new()
///     .seed(42)
///     .dimensions(32, 32)
///     .unwrap()
///     .rooms(12, 5)
///     .unwrap()
///     .build()
///     .unwrap();
///
/// assert_eq!(config.room_count, 5);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainConfig {
    /// Random seed for site scatter, faults and random heights
    pub seed: u32,

    /// Number of samples along x
    pub width: usize,

    /// Number of samples along z
    pub height: usize,

    /// Peak height displacement for every synthesis mode
    pub amplitude: f32,

    /// Noise feature size in grid cells (noise frequency is `1 / wavelength`)
    pub wavelength: f32,

    /// Fractal layering for noise mode
    pub noise: NoiseConfig,

    /// Number of fault lines applied in fault mode
    pub fault_iterations: usize,

    /// Number of smoothing passes per `smoothen_height_map` call
    pub smoothing_passes: usize,

    /// Number of Voronoi sites scattered over the grid
    pub site_count: usize,

    /// Number of rooms the sites are merged into
    pub room_count: usize,

    /// Fraction of rejected (cycle-closing) Delaunay edges re-added as loops
    ///
    /// - 0.0: corridors form a spanning tree
    /// - 1.0: every Delaunay edge becomes a corridor
    pub loop_factor: f32,

    /// Corridor width in cells
    pub corridor_width: usize,

    /// Thickness in cells of the blocked band kept around each room
    pub wall_thickness: usize,

    /// Quadtree nodes with more triangles than this are split
    pub leaf_threshold: usize,

    /// Maximum quadtree depth (root is depth 0)
    pub max_depth: usize,
}

impl TerrainConfig {
    /// Number of triangles the grid produces
    #[inline]
    pub fn triangle_count(&self) -> usize {
        (self.width.saturating_sub(1)) * (self.height.saturating_sub(1)) * 2
    }

    /// Noise frequency derived from the wavelength
    #[inline]
    pub fn frequency(&self) -> f32 {
        1.0 / self.wavelength
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        TerrainConfigBuilder::new().seed(0).build_unchecked()
    }
}

/// Builder for creating [`TerrainConfig`] with validation
///
/// # Example
///
/// ```rust
/// use voronoi_dungeon_terrain::*;
///
/// // Use defaults
/// let config = TerrainConfigBuilder::new().build().unwrap();
///
/// // Customize
/// let config = TerrainConfigBuilder::new()
///     .seed(12345)
///     .amplitude(8.0)
///     .unwrap()
///     .loop_factor(0.3)
///     .unwrap()
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct TerrainConfigBuilder {
    seed: Option<u32>,
    width: usize,
    height: usize,
    amplitude: f32,
    wavelength: f32,
    noise: NoiseConfig,
    fault_iterations: usize,
    smoothing_passes: usize,
    site_count: usize,
    room_count: usize,
    loop_factor: f32,
    corridor_width: usize,
    wall_thickness: usize,
    leaf_threshold: usize,
    max_depth: usize,
}

impl TerrainConfigBuilder {
    /// Create a new builder with default values
    ///
    /// Defaults:
    /// - seed: Random (generated from thread_rng)
    /// - dimensions: 64x64 (7,938 triangles)
    /// - amplitude: 4.0, wavelength: 16.0
    /// - fault_iterations: 100, smoothing_passes: 1
    /// - sites: 24 merged into 8 rooms
    /// - loop_factor: 0.15, corridor_width: 1, wall_thickness: 1
    /// - leaf_threshold: 256 triangles, max_depth: 6
    pub fn new() -> Self {
        Self {
            seed: None,
            width: 64,
            height: 64,
            amplitude: 4.0,
            wavelength: 16.0,
            noise: NoiseConfig::default(),
            fault_iterations: 100,
            smoothing_passes: 1,
            site_count: 24,
            room_count: 8,
            loop_factor: 0.15,
            corridor_width: 1,
            wall_thickness: 1,
            leaf_threshold: 256,
            max_depth: 6,
        }
    }

    /// Set the random seed
    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the grid dimensions in samples
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` if either axis is below 2, or
    /// `TriangleBudgetExceeded` if the grid needs more than
    /// [`MAX_TRIANGLES`](crate::grid::MAX_TRIANGLES) triangles.
    pub fn dimensions(mut self, width: usize, height: usize) -> Result<Self> {
        validate_dimensions(width, height)?;
        self.width = width;
        self.height = height;
        Ok(self)
    }

    /// Set the height amplitude
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if amplitude is negative or not finite
    pub fn amplitude(mut self, amplitude: f32) -> Result<Self> {
        if !amplitude.is_finite() || amplitude < 0.0 {
            return Err(TerrainError::InvalidConfig(format!(
                "amplitude must be finite and >= 0 (got {})",
                amplitude
            )));
        }
        self.amplitude = amplitude;
        Ok(self)
    }

    /// Set the noise wavelength in grid cells
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if wavelength is not strictly positive
    pub fn wavelength(mut self, wavelength: f32) -> Result<Self> {
        if !wavelength.is_finite() || wavelength <= 0.0 {
            return Err(TerrainError::InvalidConfig(format!(
                "wavelength must be positive (got {})",
                wavelength
            )));
        }
        self.wavelength = wavelength;
        Ok(self)
    }

    /// Set the fractal noise layering
    pub fn noise(mut self, noise: NoiseConfig) -> Self {
        self.noise = noise;
        self
    }

    /// Set the number of fault lines
    pub fn fault_iterations(mut self, iterations: usize) -> Self {
        self.fault_iterations = iterations;
        self
    }

    /// Set the number of smoothing passes per smoothing call
    pub fn smoothing_passes(mut self, passes: usize) -> Self {
        self.smoothing_passes = passes;
        self
    }

    /// Set the number of Voronoi sites and the number of rooms they merge into
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` unless `2 <= room_count <= site_count`
    pub fn rooms(mut self, site_count: usize, room_count: usize) -> Result<Self> {
        if room_count < 2 || room_count > site_count {
            return Err(TerrainError::InvalidConfig(format!(
                "need 2 <= room_count <= site_count (got {} rooms, {} sites)",
                room_count, site_count
            )));
        }
        self.site_count = site_count;
        self.room_count = room_count;
        Ok(self)
    }

    /// Set the fraction of cycle-closing edges kept as extra corridors
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the factor is outside `[0, 1]`
    pub fn loop_factor(mut self, factor: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(TerrainError::InvalidConfig(format!(
                "loop factor must be within [0, 1] (got {})",
                factor
            )));
        }
        self.loop_factor = factor;
        Ok(self)
    }

    /// Set the corridor width in cells
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if width is 0
    pub fn corridor_width(mut self, width: usize) -> Result<Self> {
        if width == 0 {
            return Err(TerrainError::InvalidConfig(
                "corridor width must be at least 1".to_string(),
            ));
        }
        self.corridor_width = width;
        Ok(self)
    }

    /// Set the wall band thickness around rooms
    pub fn wall_thickness(mut self, thickness: usize) -> Self {
        self.wall_thickness = thickness;
        self
    }

    /// Set the quadtree split threshold and depth cap
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the threshold is 0 or the depth exceeds 12
    pub fn quadtree(mut self, leaf_threshold: usize, max_depth: usize) -> Result<Self> {
        if leaf_threshold == 0 {
            return Err(TerrainError::InvalidConfig(
                "leaf threshold must be at least 1".to_string(),
            ));
        }
        if max_depth > MAX_QUADTREE_DEPTH {
            return Err(TerrainError::InvalidConfig(format!(
                "quadtree depth must be <= {} (got {})",
                MAX_QUADTREE_DEPTH, max_depth
            )));
        }
        self.leaf_threshold = leaf_threshold;
        self.max_depth = max_depth;
        Ok(self)
    }

    /// Build the configuration
    ///
    /// If no seed was provided, generates a random seed using thread_rng.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the site count does not fit on the grid.
    pub fn build(self) -> Result<TerrainConfig> {
        let cells = self.width * self.height;
        if self.site_count > cells {
            return Err(TerrainError::InvalidConfig(format!(
                "{} sites do not fit on a {}x{} grid",
                self.site_count, self.width, self.height
            )));
        }
        Ok(self.build_unchecked())
    }

    fn build_unchecked(self) -> TerrainConfig {
        let seed = self.seed.unwrap_or_else(rand::random);

        TerrainConfig {
            seed,
            width: self.width,
            height: self.height,
            amplitude: self.amplitude,
            wavelength: self.wavelength,
            noise: self.noise,
            fault_iterations: self.fault_iterations,
            smoothing_passes: self.smoothing_passes,
            site_count: self.site_count,
            room_count: self.room_count,
            loop_factor: self.loop_factor,
            corridor_width: self.corridor_width,
            wall_thickness: self.wall_thickness,
            leaf_threshold: self.leaf_threshold,
            max_depth: self.max_depth,
        }
    }
}

impl Default for TerrainConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
