//! Voronoi site scattering
//!
//! Sites are placed on distinct grid cells by rejection sampling. The number
//! of draws is bounded so a crowded grid fails instead of spinning.

use rand::Rng;
use std::collections::HashSet;

use crate::error::{Result, TerrainError};
use crate::grid::HeightGrid;

/// Draws allowed per requested site before scattering gives up
pub const MAX_PLACEMENT_ATTEMPTS_PER_SITE: usize = 32;

/// A Voronoi seed point on the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Site {
    /// Index into the site array
    pub id: usize,
    /// Grid column
    pub x: usize,
    /// Grid row
    pub z: usize,
    /// Terrain height at the site when it was placed
    pub height: f32,
    /// Region (room) this site currently belongs to
    pub region: usize,
}

impl Site {
    /// Squared distance in the x/z plane to grid cell `(x, z)`
    #[inline]
    pub fn distance_squared_to(&self, x: usize, z: usize) -> f32 {
        let dx = self.x as f32 - x as f32;
        let dz = self.z as f32 - z as f32;
        dx * dx + dz * dz
    }

    /// Distance in the x/z plane to another site
    #[inline]
    pub fn distance_to(&self, other: &Site) -> f32 {
        self.distance_squared_to(other.x, other.z).sqrt()
    }
}

/// Scatter `count` sites on distinct random cells
///
/// Each site starts in its own region (`region == id`) and takes the grid
/// height under it.
///
/// # Errors
///
/// Returns `SitePlacementExhausted` if `count` exceeds the number of cells or
/// the draw budget runs out before every site is placed.
pub fn scatter_sites<R: Rng>(grid: &HeightGrid, count: usize, rng: &mut R) -> Result<Vec<Site>> {
    let max_attempts = count.saturating_mul(MAX_PLACEMENT_ATTEMPTS_PER_SITE);
    if count > grid.len() {
        return Err(TerrainError::SitePlacementExhausted {
            requested: count,
            placed: 0,
            attempts: 0,
        });
    }

    let mut occupied = HashSet::with_capacity(count);
    let mut sites = Vec::with_capacity(count);
    let mut attempts = 0;

    while sites.len() < count {
        if attempts == max_attempts {
            return Err(TerrainError::SitePlacementExhausted {
                requested: count,
                placed: sites.len(),
                attempts,
            });
        }
        attempts += 1;

        let x = rng.gen_range(0..grid.width());
        let z = rng.gen_range(0..grid.height());
        if !occupied.insert((x, z)) {
            continue;
        }

        let id = sites.len();
        sites.push(Site {
            id,
            x,
            z,
            height: grid.height_at(x, z),
            region: id,
        });
    }

    if attempts > count {
        log::debug!(
            "scattered {} sites in {} draws ({} collisions)",
            count,
            attempts,
            attempts - count
        );
    }

    Ok(sites)
}
