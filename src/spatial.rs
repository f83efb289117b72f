//! Spatial indexing for fast position-to-site lookups
//!
//! This module is only available with the `spatial-index` feature.

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

use crate::generation::Site;

/// Wrapper around KD-tree for nearest-site queries in the x/z plane
///
/// # Performance
///
/// - Construction: O(n log n)
/// - Query: O(log n)
#[derive(Clone)]
pub struct SiteIndex {
    /// `None` when built from no sites
    tree: Option<ImmutableKdTree<f32, usize, 2, 32>>,
    len: usize,
}

impl SiteIndex {
    /// Build the index from site grid coordinates
    ///
    /// # Example
    ///
    /// ```
    /// use voronoi_dungeon_terrain::generation::Site;
    /// use voronoi_dungeon_terrain::SiteIndex;
    ///
    /// let sites = [
    ///     Site {
    ///         id: 0,
    ///         x: 2,
    ///         z: 2,
    ///         height: 0.0,
    ///         region: 0,
    ///     },
    ///     Site {
    ///         id: 1,
    ///         x: 9,
    ///         z: 7,
    ///         height: 0.0,
    ///         region: 0,
    ///     },
    /// ];
    /// let index = SiteIndex::new(&sites);
    /// assert_eq!(index.find_nearest(8.0, 6.5), Some(1));
    /// ```
    pub fn new(sites: &[Site]) -> Self {
        let points: Vec<[f32; 2]> = sites.iter().map(|s| [s.x as f32, s.z as f32]).collect();

        Self {
            tree: (!points.is_empty()).then(|| ImmutableKdTree::new_from_slice(&points)),
            len: points.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Find the site nearest to `(x, z)`
    ///
    /// Returns `None` if the index holds no sites.
    pub fn find_nearest(&self, x: f32, z: f32) -> Option<usize> {
        let tree = self.tree.as_ref()?;
        let result = tree.nearest_one::<SquaredEuclidean>(&[x, z]);
        Some(result.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{nearest_site, scatter_sites};
    use crate::grid::HeightGrid;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn site(id: usize, x: usize, z: usize) -> Site {
        Site {
            id,
            x,
            z,
            height: 0.0,
            region: id,
        }
    }

    #[test]
    fn test_site_index_basic() {
        let sites = vec![site(0, 0, 0), site(1, 10, 0), site(2, 0, 10), site(3, 10, 10)];
        let index = SiteIndex::new(&sites);

        assert_eq!(index.len(), 4);
        assert_eq!(index.find_nearest(1.0, 2.0), Some(0));
        assert_eq!(index.find_nearest(9.0, 0.5), Some(1));
        assert_eq!(index.find_nearest(0.2, 8.0), Some(2));
        assert_eq!(index.find_nearest(7.0, 7.0), Some(3));
    }

    #[test]
    fn test_matches_brute_force() {
        let grid = HeightGrid::new(30, 30).unwrap();
        let sites = scatter_sites(&grid, 20, &mut ChaCha8Rng::seed_from_u64(77)).unwrap();
        let index = SiteIndex::new(&sites);

        for z in 0..30 {
            for x in 0..30 {
                let found = index.find_nearest(x as f32, z as f32).unwrap();
                let expected = nearest_site(&sites, x, z).unwrap();
                // Equidistant sites may resolve differently, so compare distances
                assert!((sites[found].distance_squared_to(x, z).sqrt() - expected.distance).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_empty_index() {
        let index = SiteIndex::new(&[]);
        assert!(index.is_empty());
        assert_eq!(index.find_nearest(0.0, 0.0), None);
    }
}
