//! Height grid data model
//!
//! The grid is a row-major array of [`HeightSample`]s, one per mesh vertex.
//! Sample `(x, z)` lives at index `z * width + x` and sits at world position
//! `(x, height, z)`.

use glam::{Vec2, Vec3};

use crate::error::{Result, TerrainError};

/// Hard cap on the number of triangles a grid may produce
pub const MAX_TRIANGLES: usize = 10_000;

/// Number of times the terrain texture repeats across the grid
pub const TEXTURE_REPEAT: f32 = 8.0;

/// Non-owning reference from a sample to its nearest Voronoi site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteRef {
    /// Index into the site array
    pub site: usize,
    /// Euclidean distance in the x/z plane
    pub distance: f32,
}

/// A single height-field sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightSample {
    pub position: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
    /// Walkability weight, 0 = blocked, 1 = fully walkable
    pub walkable: f32,
    /// Nearest Voronoi site, set by the region builder
    pub site: Option<SiteRef>,
    /// Room whose flattened interior contains this sample
    pub room: Option<usize>,
    /// Corridor that carved this sample
    pub corridor: Option<usize>,
}

impl HeightSample {
    fn flat(x: usize, z: usize) -> Self {
        Self {
            position: Vec3::new(x as f32, 0.0, z as f32),
            uv: Vec2::ZERO,
            normal: Vec3::Y,
            walkable: 0.0,
            site: None,
            room: None,
            corridor: None,
        }
    }

    /// Height of the sample
    #[inline]
    pub fn height(&self) -> f32 {
        self.position.y
    }
}

/// Check that a grid of the given size can be meshed within the triangle budget
///
/// # Errors
///
/// Returns `InvalidDimensions` if either axis is below 2, and
/// `TriangleBudgetExceeded` if the grid needs more than [`MAX_TRIANGLES`].
pub fn validate_dimensions(width: usize, height: usize) -> Result<()> {
    if width < 2 || height < 2 {
        return Err(TerrainError::InvalidDimensions { width, height });
    }
    let triangles = (width - 1)
        .checked_mul(height - 1)
        .and_then(|quads| quads.checked_mul(2))
        .unwrap_or(usize::MAX);
    if triangles > MAX_TRIANGLES {
        return Err(TerrainError::TriangleBudgetExceeded {
            width,
            height,
            triangles,
            max: MAX_TRIANGLES,
        });
    }
    Ok(())
}

/// Row-major grid of height samples
#[derive(Debug, Clone, PartialEq)]
pub struct HeightGrid {
    width: usize,
    height: usize,
    samples: Vec<HeightSample>,
}

impl HeightGrid {
    /// Create a flat grid at height 0 with texture coordinates assigned
    pub fn new(width: usize, height: usize) -> Result<Self> {
        validate_dimensions(width, height)?;

        let samples = (0..height)
            .flat_map(|z| (0..width).map(move |x| HeightSample::flat(x, z)))
            .collect();

        let mut grid = Self {
            width,
            height,
            samples,
        };
        grid.assign_texture_coordinates();
        Ok(grid)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Total number of samples
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Row-major index of `(x, z)`
    #[inline]
    pub fn index(&self, x: usize, z: usize) -> usize {
        z * self.width + x
    }

    /// Grid coordinate of a row-major index
    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    #[inline]
    pub fn contains(&self, x: i64, z: i64) -> bool {
        x >= 0 && z >= 0 && (x as usize) < self.width && (z as usize) < self.height
    }

    #[inline]
    pub fn get(&self, x: usize, z: usize) -> Option<&HeightSample> {
        if x < self.width && z < self.height {
            self.samples.get(self.index(x, z))
        } else {
            None
        }
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, z: usize) -> Option<&mut HeightSample> {
        if x < self.width && z < self.height {
            let index = self.index(x, z);
            self.samples.get_mut(index)
        } else {
            None
        }
    }

    #[inline]
    pub fn samples(&self) -> &[HeightSample] {
        &self.samples
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [HeightSample] {
        &mut self.samples
    }

    /// Height at `(x, z)`; panics if out of range
    #[inline]
    pub fn height_at(&self, x: usize, z: usize) -> f32 {
        self.samples[self.index(x, z)].position.y
    }

    #[inline]
    pub fn set_height(&mut self, x: usize, z: usize, height: f32) {
        let index = self.index(x, z);
        self.samples[index].position.y = height;
    }

    /// Copy of all heights in row-major order
    pub fn heights(&self) -> Vec<f32> {
        self.samples.iter().map(|s| s.position.y).collect()
    }

    /// Drop every Voronoi, room and corridor back-reference and block all samples
    ///
    /// Called before any regeneration so no stale references survive.
    pub fn clear_layout(&mut self) {
        for sample in &mut self.samples {
            sample.walkable = 0.0;
            sample.site = None;
            sample.room = None;
            sample.corridor = None;
        }
    }

    /// Tile the texture [`TEXTURE_REPEAT`] times across the grid
    pub fn assign_texture_coordinates(&mut self) {
        let du = TEXTURE_REPEAT / (self.width - 1) as f32;
        let dv = TEXTURE_REPEAT / (self.height - 1) as f32;
        let width = self.width;
        for (i, sample) in self.samples.iter_mut().enumerate() {
            let (x, z) = (i % width, i / width);
            sample.uv = Vec2::new(x as f32 * du, z as f32 * dv);
        }
    }

    /// Iterator over the in-bounds 8-neighbourhood of `(x, z)`
    pub fn neighbors8(&self, x: usize, z: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        const OFFSETS: [(i64, i64); 8] = [
            (-1, -1),
            (0, -1),
            (1, -1),
            (-1, 0),
            (1, 0),
            (-1, 1),
            (0, 1),
            (1, 1),
        ];
        OFFSETS.iter().filter_map(move |&(dx, dz)| {
            let nx = x as i64 + dx;
            let nz = z as i64 + dz;
            self.contains(nx, nz).then(|| (nx as usize, nz as usize))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_grid_is_flat_and_blocked() {
        let grid = HeightGrid::new(4, 3).unwrap();
        assert_eq!(grid.len(), 12);
        for sample in grid.samples() {
            assert_eq!(sample.height(), 0.0);
            assert_eq!(sample.walkable, 0.0);
            assert_eq!(sample.normal, Vec3::Y);
            assert!(sample.site.is_none());
        }
    }

    #[test]
    fn test_row_major_layout() {
        let grid = HeightGrid::new(5, 4).unwrap();
        let index = grid.index(3, 2);
        assert_eq!(index, 13);
        assert_eq!(grid.coords(index), (3, 2));
        assert_eq!(grid.samples()[index].position, Vec3::new(3.0, 0.0, 2.0));
    }

    #[test]
    fn test_texture_coordinates_span_repeat() {
        let grid = HeightGrid::new(5, 3).unwrap();
        assert_eq!(grid.get(0, 0).unwrap().uv, Vec2::ZERO);
        let corner = grid.get(4, 2).unwrap().uv;
        assert!((corner.x - TEXTURE_REPEAT).abs() < 1e-5);
        assert!((corner.y - TEXTURE_REPEAT).abs() < 1e-5);
    }

    #[test]
    fn test_neighbors_clamp_at_border() {
        let grid = HeightGrid::new(3, 3).unwrap();
        assert_eq!(grid.neighbors8(0, 0).count(), 3);
        assert_eq!(grid.neighbors8(1, 0).count(), 5);
        assert_eq!(grid.neighbors8(1, 1).count(), 8);
    }

    #[test]
    fn test_out_of_range_access() {
        let mut grid = HeightGrid::new(3, 3).unwrap();
        assert!(grid.get(3, 0).is_none());
        assert!(grid.get_mut(0, 3).is_none());
        assert!(!grid.contains(-1, 0));
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        assert!(HeightGrid::new(0, 5).is_err());
        assert!(HeightGrid::new(1, 5).is_err());
        assert!(matches!(
            HeightGrid::new(200, 200),
            Err(TerrainError::TriangleBudgetExceeded { triangles: 79_202, .. })
        ));
    }

    #[test]
    fn test_clear_layout() {
        let mut grid = HeightGrid::new(2, 2).unwrap();
        {
            let sample = grid.get_mut(1, 1).unwrap();
            sample.walkable = 1.0;
            sample.site = Some(SiteRef { site: 0, distance: 0.0 });
            sample.room = Some(0);
            sample.corridor = Some(2);
        }
        grid.clear_layout();
        let sample = grid.get(1, 1).unwrap();
        assert_eq!(sample.walkable, 0.0);
        assert!(sample.site.is_none() && sample.room.is_none() && sample.corridor.is_none());
    }
}
