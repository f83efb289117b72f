//! Terrain main structure

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Instant;

use crate::config::{TerrainConfig, TerrainConfigBuilder};
use crate::error::{Result, TerrainError};
use crate::generation::{generate_dungeon, Corridor, CorridorGraph, DungeonLayout, Region, Site};
use crate::grid::HeightGrid;
use crate::mesh::{build_mesh, compute_normals, create_buffers, BufferPair, Device, MeshData, RenderContext, Vertex};
use crate::quadtree::{QuadTree, SurfaceSample};
use crate::synthesis::{fault_heights, noise_heights, noise_offset, random_heights, smooth_heights, HeightMode};

#[cfg(feature = "spatial-index")]
use crate::spatial::SiteIndex;

/// Everything built from one generation pass
struct TerrainState<B> {
    grid: HeightGrid,
    /// Heights before any dungeon was carved, with no layout
    base: HeightGrid,
    layout: DungeonLayout,
    mesh: MeshData,
    buffers: BufferPair<B>,
    quadtree: QuadTree<B>,
    #[cfg(feature = "spatial-index")]
    site_index: SiteIndex,
}

impl<B> TerrainState<B> {
    /// Mesh the grid and upload it; nothing is kept if any allocation fails
    fn assemble<D>(
        device: &mut D,
        mut grid: HeightGrid,
        base: HeightGrid,
        layout: DungeonLayout,
        config: &TerrainConfig,
    ) -> Result<Self>
    where
        D: Device<Buffer = B>,
    {
        compute_normals(&mut grid);
        let mesh = build_mesh(&grid);
        let buffers = create_buffers(device, &mesh.vertices, &mesh.indices)?;
        let quadtree = QuadTree::build(device, &mesh, config.leaf_threshold, config.max_depth)?;

        #[cfg(feature = "spatial-index")]
        let site_index = SiteIndex::new(&layout.sites);

        Ok(Self {
            grid,
            base,
            layout,
            mesh,
            buffers,
            quadtree,
            #[cfg(feature = "spatial-index")]
            site_index,
        })
    }
}

/// A height-mapped terrain with an optional carved dungeon
///
/// The terrain owns its grid, layout, mesh, buffers and quadtree. Every
/// regeneration works on copies and only replaces them once the whole pass
/// (including buffer uploads) has succeeded, so a failed call leaves the
/// previous terrain intact.
///
/// Generic over the device's buffer handle `B`.
///
/// # Examples
///
/// ```
/// use voronoi_dungeon_terrain::*;
///
/// let mut device = HeadlessDevice::new();
/// let config = TerrainConfigBuilder::new()
///     .seed(7)
///     .dimensions(32, 32)
///     .unwrap()
///     .rooms(10, 4)
///     .unwrap()
///     .build()
///     .unwrap();
///
/// let mut terrain = Terrain::with_config(&mut device, config).unwrap();
/// terrain.noise_height_map(&mut device).unwrap();
/// terrain.voronoi_dungeon(&mut device).unwrap();
///
/// assert_eq!(terrain.rooms().len(), 4);
/// assert_eq!(terrain.vertex_count(), 32 * 32);
/// ```
pub struct Terrain<B> {
    config: TerrainConfig,
    rng: ChaCha8Rng,
    /// `None` once shut down
    state: Option<TerrainState<B>>,
}

impl<B> Terrain<B> {
    /// Create a flat terrain of `width` x `height` samples with default settings
    ///
    /// The site and room counts are capped to what fits on small grids.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimensions` or `TriangleBudgetExceeded` for unusable
    /// sizes, and `BufferAllocation` if the device fails.
    pub fn initialize<D>(device: &mut D, width: usize, height: usize) -> Result<Self>
    where
        D: Device<Buffer = B>,
    {
        let defaults = TerrainConfig::default();
        let sites = defaults.site_count.min(width.saturating_mul(height));
        let rooms = defaults.room_count.min(sites);

        let config = TerrainConfigBuilder::new()
            .dimensions(width, height)?
            .rooms(sites, rooms)?
            .build()?;
        Self::with_config(device, config)
    }

    /// Create a flat terrain from a configuration
    ///
    /// # Arguments
    ///
    /// * `device` - Allocates the mesh and quadtree buffers
    /// * `config` - Terrain configuration (seed, size, generation parameters)
    ///
    /// # Errors
    ///
    /// Returns a dimension error if the configured grid is unusable, and
    /// `BufferAllocation` if the device fails.
    pub fn with_config<D>(device: &mut D, config: TerrainConfig) -> Result<Self>
    where
        D: Device<Buffer = B>,
    {
        let grid = HeightGrid::new(config.width, config.height)?;
        let state = TerrainState::assemble(device, grid.clone(), grid, DungeonLayout::default(), &config)?;

        log::info!(
            "terrain initialized: {}x{} samples, seed {}",
            config.width,
            config.height,
            config.seed
        );

        Ok(Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(config.seed as u64),
            state: Some(state),
        })
    }

    fn current(&self) -> Result<&TerrainState<B>> {
        self.state.as_ref().ok_or(TerrainError::NotInitialized)
    }

    fn commit<D>(
        &mut self,
        device: &mut D,
        grid: HeightGrid,
        base: HeightGrid,
        layout: DungeonLayout,
        rng: ChaCha8Rng,
    ) -> Result<()>
    where
        D: Device<Buffer = B>,
    {
        let started = Instant::now();
        let state = TerrainState::assemble(device, grid, base, layout, &self.config)?;
        log::debug!(
            "terrain rebuilt in {:?}: {} vertices, {} quadtree nodes",
            started.elapsed(),
            state.mesh.vertex_count(),
            state.quadtree.node_count()
        );

        self.state = Some(state);
        self.rng = rng;
        Ok(())
    }

    /// Replace the heights with uniform random values in `[-amplitude, amplitude]`
    ///
    /// Clears any dungeon layout.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for an unusable amplitude, `NotInitialized` after
    /// shutdown, `BufferAllocation` on device failure.
    pub fn random_height_map<D>(&mut self, device: &mut D) -> Result<()>
    where
        D: Device<Buffer = B>,
    {
        self.generate_height_map(device, HeightMode::Random)
    }

    /// Replace the heights with the fault-line algorithm
    ///
    /// Clears any dungeon layout.
    pub fn faulting<D>(&mut self, device: &mut D) -> Result<()>
    where
        D: Device<Buffer = B>,
    {
        self.generate_height_map(device, HeightMode::Fault)
    }

    /// Replace the heights with fractal simplex noise
    ///
    /// Clears any dungeon layout.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the wavelength is not positive, plus the
    /// errors of [`random_height_map`](Self::random_height_map).
    pub fn noise_height_map<D>(&mut self, device: &mut D) -> Result<()>
    where
        D: Device<Buffer = B>,
    {
        self.generate_height_map(device, HeightMode::Noise)
    }

    /// Replace the heights using the given synthesis mode
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the amplitude or wavelength was set to an
    /// unusable value through [`amplitude_mut`](Self::amplitude_mut) or
    /// [`wavelength_mut`](Self::wavelength_mut), plus device and shutdown
    /// errors.
    pub fn generate_height_map<D>(&mut self, device: &mut D, mode: HeightMode) -> Result<()>
    where
        D: Device<Buffer = B>,
    {
        let mut grid = self.current()?.grid.clone();
        let mut rng = self.rng.clone();
        let config = &self.config;

        if !config.amplitude.is_finite() || config.amplitude < 0.0 {
            return Err(TerrainError::InvalidParameter(format!(
                "amplitude must be finite and >= 0 (got {})",
                config.amplitude
            )));
        }
        if matches!(mode, HeightMode::Noise) && !(config.wavelength.is_finite() && config.wavelength > 0.0) {
            return Err(TerrainError::InvalidParameter(format!(
                "wavelength must be finite and positive (got {})",
                config.wavelength
            )));
        }

        match mode {
            HeightMode::Random => random_heights(&mut grid, config.amplitude, &mut rng),
            HeightMode::Fault => fault_heights(&mut grid, config.amplitude, config.fault_iterations, &mut rng),
            HeightMode::Noise => noise_heights(
                &mut grid,
                config.amplitude,
                config.wavelength,
                &config.noise,
                noise_offset(config.seed),
            )?,
        }

        log::info!("height map regenerated ({:?})", mode);
        let base = grid.clone();
        self.commit(device, grid, base, DungeonLayout::default(), rng)
    }

    /// Carve a Voronoi dungeon into the current heights
    ///
    /// Any previous dungeon is discarded first: carving starts again from the
    /// heights left by the last height-map or smoothing pass. Rooms become
    /// flat walkable plateaus and every room is reachable from every other
    /// through corridors.
    ///
    /// # Errors
    ///
    /// `DegenerateLayout` for fewer than 2 rooms, `SitePlacementExhausted`
    /// if the sites do not fit, plus device and shutdown errors.
    pub fn voronoi_dungeon<D>(&mut self, device: &mut D) -> Result<()>
    where
        D: Device<Buffer = B>,
    {
        let base = self.current()?.base.clone();
        let mut grid = base.clone();
        let mut rng = self.rng.clone();
        let layout = generate_dungeon(&mut grid, &self.config, &mut rng)?;
        self.commit(device, grid, base, layout, rng)
    }

    /// Blend heights towards their neighbourhood mean
    ///
    /// Runs the configured number of passes with `factor` in `[0, 1]`
    /// (0 leaves the terrain unchanged). The dungeon layout is kept, and
    /// room plateaus and corridors keep their carved heights. The uncarved
    /// heights used by the next [`voronoi_dungeon`](Self::voronoi_dungeon)
    /// are smoothed too.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for a negative factor, plus device and shutdown errors.
    pub fn smoothen_height_map<D>(&mut self, device: &mut D, factor: f32) -> Result<()>
    where
        D: Device<Buffer = B>,
    {
        let state = self.current()?;
        let passes = self.config.smoothing_passes;

        let mut base = state.base.clone();
        smooth_heights(&mut base, factor, passes)?;

        let layout = state.layout.clone();
        let grid = if layout.rooms.is_empty() {
            base.clone()
        } else {
            let mut grid = state.grid.clone();
            smooth_heights(&mut grid, factor, passes)?;
            grid
        };

        let rng = self.rng.clone();
        self.commit(device, grid, base, layout, rng)
    }

    /// Release every buffer, node and layout
    ///
    /// Queries return nothing afterwards and regeneration fails with
    /// `NotInitialized`.
    pub fn shutdown(&mut self) {
        if self.state.take().is_some() {
            log::info!("terrain shut down");
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Get the configuration
    #[inline]
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn amplitude(&self) -> f32 {
        self.config.amplitude
    }

    /// Mutable access to the amplitude used by the next regeneration
    ///
    /// Unlike the builder this does not validate; a negative or non-finite
    /// value is rejected by the next height-map regeneration.
    pub fn amplitude_mut(&mut self) -> &mut f32 {
        &mut self.config.amplitude
    }

    pub fn wavelength(&self) -> f32 {
        self.config.wavelength
    }

    /// Mutable access to the wavelength used by the next noise regeneration
    ///
    /// Checked by the next height-map regeneration, like
    /// [`amplitude_mut`](Self::amplitude_mut).
    pub fn wavelength_mut(&mut self) -> &mut f32 {
        &mut self.config.wavelength
    }

    /// Surface height and walkability at world position `(x, z)`
    ///
    /// Returns `None` outside the terrain or after shutdown.
    ///
    /// # Example
    ///
    /// ```
    /// # use voronoi_dungeon_terrain::*;
    /// let mut device = HeadlessDevice::new();
    /// let terrain = Terrain::initialize(&mut device, 16, 16).unwrap();
    ///
    /// let sample = terrain.height_at(4.5, 7.25).unwrap();
    /// assert_eq!(sample.height, 0.0);
    /// assert!(terrain.height_at(-1.0, 3.0).is_none());
    /// ```
    pub fn height_at(&self, x: f32, z: f32) -> Option<SurfaceSample> {
        self.state.as_ref()?.quadtree.height_at(x, z)
    }

    /// Rooms in ascending anchor order
    pub fn rooms(&self) -> &[Region] {
        self.state.as_ref().map(|s| s.layout.rooms.as_slice()).unwrap_or(&[])
    }

    pub fn sites(&self) -> &[Site] {
        self.state.as_ref().map(|s| s.layout.sites.as_slice()).unwrap_or(&[])
    }

    pub fn corridors(&self) -> &[Corridor] {
        self.state.as_ref().map(|s| s.layout.corridors.as_slice()).unwrap_or(&[])
    }

    pub fn corridor_graph(&self) -> Option<&CorridorGraph> {
        self.state.as_ref().map(|s| &s.layout.graph)
    }

    pub fn grid(&self) -> Option<&HeightGrid> {
        self.state.as_ref().map(|s| &s.grid)
    }

    pub fn mesh(&self) -> Option<&MeshData> {
        self.state.as_ref().map(|s| &s.mesh)
    }

    pub fn quadtree(&self) -> Option<&QuadTree<B>> {
        self.state.as_ref().map(|s| &s.quadtree)
    }

    pub fn buffers(&self) -> Option<&BufferPair<B>> {
        self.state.as_ref().map(|s| &s.buffers)
    }

    pub fn vertices(&self) -> &[Vertex] {
        self.state.as_ref().map(|s| s.mesh.vertices.as_slice()).unwrap_or(&[])
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices().len()
    }

    pub fn index_count(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.mesh.index_count())
    }

    /// Find the Voronoi site nearest to `(x, z)`
    ///
    /// Returns `None` when no dungeon has been carved.
    #[cfg(feature = "spatial-index")]
    pub fn find_site_at(&self, x: f32, z: f32) -> Option<usize> {
        self.state.as_ref()?.site_index.find_nearest(x, z)
    }

    /// Draw the whole mesh with one call; returns the number of draws
    pub fn render<C: RenderContext<B>>(&self, ctx: &mut C) -> usize {
        match &self.state {
            Some(state) => {
                state.buffers.draw(ctx);
                1
            }
            None => 0,
        }
    }

    /// Draw every quadtree leaf; returns the number of draws
    pub fn render_quadtree<C: RenderContext<B>>(&self, ctx: &mut C) -> usize {
        self.state.as_ref().map_or(0, |s| s.quadtree.render(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{HeadlessBuffer, HeadlessContext, HeadlessDevice};
    use std::collections::VecDeque;

    fn config(width: usize, height: usize, sites: usize, rooms: usize, seed: u32) -> TerrainConfig {
        TerrainConfigBuilder::new()
            .seed(seed)
            .dimensions(width, height)
            .unwrap()
            .rooms(sites, rooms)
            .unwrap()
            .build()
            .unwrap()
    }

    fn terrain(config: TerrainConfig) -> (Terrain<HeadlessBuffer>, HeadlessDevice) {
        let mut device = HeadlessDevice::new();
        let terrain = Terrain::with_config(&mut device, config).unwrap();
        (terrain, device)
    }

    #[test]
    fn test_initialize_flat() {
        let mut device = HeadlessDevice::new();
        let terrain: Terrain<HeadlessBuffer> = Terrain::initialize(&mut device, 20, 12).unwrap();

        assert!(terrain.is_initialized());
        assert_eq!(terrain.vertex_count(), 20 * 12);
        assert_eq!(terrain.index_count(), 19 * 11 * 6);
        assert!(terrain.rooms().is_empty());
        assert!(terrain.vertices().iter().all(|v| v.position[1] == 0.0));
        assert!(device.allocations() >= 4);
    }

    #[test]
    fn test_initialize_small_grid() {
        let mut device = HeadlessDevice::new();
        let terrain: Terrain<HeadlessBuffer> = Terrain::initialize(&mut device, 2, 2).unwrap();
        assert_eq!(terrain.config().site_count, 4);
        assert_eq!(terrain.config().room_count, 4);
    }

    #[test]
    fn test_initialize_rejects_bad_dimensions() {
        let mut device = HeadlessDevice::new();
        let result: Result<Terrain<HeadlessBuffer>> = Terrain::initialize(&mut device, 1, 50);
        assert!(matches!(result, Err(TerrainError::InvalidDimensions { .. })));

        let result: Result<Terrain<HeadlessBuffer>> = Terrain::initialize(&mut device, 200, 200);
        assert!(matches!(result, Err(TerrainError::TriangleBudgetExceeded { .. })));
        assert_eq!(device.allocations(), 0);
    }

    #[test]
    fn test_initialize_device_failure() {
        let mut device = HeadlessDevice::with_budget(16);
        let result: Result<Terrain<HeadlessBuffer>> = Terrain::initialize(&mut device, 8, 8);
        assert!(matches!(result, Err(TerrainError::BufferAllocation(_))));
    }

    #[test]
    fn test_random_is_deterministic() {
        let (mut a, mut da) = terrain(config(10, 10, 6, 3, 1234));
        let (mut b, mut db) = terrain(config(10, 10, 6, 3, 1234));
        a.random_height_map(&mut da).unwrap();
        b.random_height_map(&mut db).unwrap();

        assert_eq!(a.grid().unwrap().heights(), b.grid().unwrap().heights());
        assert_eq!(a.vertices(), b.vertices());

        let (mut c, mut dc) = terrain(config(10, 10, 6, 3, 4321));
        c.random_height_map(&mut dc).unwrap();
        assert_ne!(a.grid().unwrap().heights(), c.grid().unwrap().heights());
    }

    #[test]
    fn test_heights_within_amplitude() {
        let (mut t, mut device) = terrain(config(16, 16, 6, 3, 9));
        *t.amplitude_mut() = 2.5;
        t.random_height_map(&mut device).unwrap();
        assert_eq!(t.amplitude(), 2.5);
        assert!(t.vertices().iter().all(|v| v.position[1].abs() <= 2.5));
    }

    #[test]
    fn test_five_sites_three_rooms() {
        let (mut t, mut device) = terrain(config(20, 20, 5, 3, 77));
        t.faulting(&mut device).unwrap();
        t.voronoi_dungeon(&mut device).unwrap();

        let rooms = t.rooms();
        assert_eq!(rooms.len(), 3);
        assert!(rooms.iter().all(|r| r.cell_count() >= 1));
        assert_eq!(t.sites().len(), 5);

        let graph = t.corridor_graph().unwrap();
        assert_eq!(graph.node_count(), 3);
        assert!(graph.is_connected());
        assert_eq!(t.corridors().len(), graph.edges().len());
    }

    #[test]
    fn test_rooms_walkable_and_connected() {
        let (mut t, mut device) = terrain(config(40, 40, 20, 7, 5));
        t.noise_height_map(&mut device).unwrap();
        t.voronoi_dungeon(&mut device).unwrap();
        let grid = t.grid().unwrap();

        for room in t.rooms() {
            let (x, z) = room.center;
            let sample = t.height_at(x as f32, z as f32).unwrap();
            assert!(sample.walkable);
            assert!((sample.height - room.height).abs() < 1e-4);
        }

        // 4-connected walk over walkable cells from the first room's anchor
        let start = t.rooms()[0].center;
        let mut seen = vec![false; grid.len()];
        seen[grid.index(start.0, start.1)] = true;
        let mut queue = VecDeque::from([start]);
        while let Some((x, z)) = queue.pop_front() {
            for (dx, dz) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
                let (nx, nz) = (x as i64 + dx, z as i64 + dz);
                if !grid.contains(nx, nz) {
                    continue;
                }
                let i = grid.index(nx as usize, nz as usize);
                if !seen[i] && grid.samples()[i].walkable >= 1.0 {
                    seen[i] = true;
                    queue.push_back((nx as usize, nz as usize));
                }
            }
        }
        for room in t.rooms() {
            assert!(seen[grid.index(room.center.0, room.center.1)]);
        }
    }

    #[test]
    fn test_height_map_clears_dungeon() {
        let (mut t, mut device) = terrain(config(24, 24, 8, 3, 3));
        t.voronoi_dungeon(&mut device).unwrap();
        assert_eq!(t.rooms().len(), 3);

        t.random_height_map(&mut device).unwrap();
        assert!(t.rooms().is_empty());
        assert!(t.corridors().is_empty());
        let grid = t.grid().unwrap();
        assert!(grid.samples().iter().all(|s| s.site.is_none() && s.walkable == 0.0));
    }

    #[test]
    fn test_out_of_bounds_query() {
        let (mut t, mut device) = terrain(config(10, 10, 6, 3, 1));
        t.random_height_map(&mut device).unwrap();

        assert!(t.height_at(-0.01, 5.0).is_none());
        assert!(t.height_at(5.0, 9.01).is_none());
        assert!(t.height_at(1e6, -1e6).is_none());
        assert!(t.height_at(f32::INFINITY, 0.0).is_none());
        assert!(t.height_at(4.5, 4.5).is_some());
    }

    #[test]
    fn test_query_idempotent() {
        let (mut t, mut device) = terrain(config(30, 30, 10, 4, 21));
        t.faulting(&mut device).unwrap();
        t.voronoi_dungeon(&mut device).unwrap();

        for &(x, z) in &[(0.0, 0.0), (3.7, 12.2), (29.0, 29.0), (15.5, 15.5)] {
            assert_eq!(t.height_at(x, z), t.height_at(x, z));
        }
    }

    #[test]
    fn test_query_matches_grid_at_samples() {
        let (mut t, mut device) = terrain(config(12, 9, 6, 3, 8));
        t.random_height_map(&mut device).unwrap();
        let grid = t.grid().unwrap();
        for z in 0..9 {
            for x in 0..12 {
                let sample = t.height_at(x as f32, z as f32).unwrap();
                assert!((sample.height - grid.height_at(x, z)).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_device_failure_keeps_previous_terrain() {
        let (mut t, mut device) = terrain(config(20, 20, 8, 4, 13));
        t.noise_height_map(&mut device).unwrap();
        t.voronoi_dungeon(&mut device).unwrap();

        let vertices = t.vertices().to_vec();
        let rooms = t.rooms().to_vec();
        let sample = t.height_at(6.3, 11.8);

        let mut broken = HeadlessDevice::with_budget(0);
        let result = t.random_height_map(&mut broken);
        assert!(matches!(result, Err(TerrainError::BufferAllocation(_))));
        assert!(matches!(t.voronoi_dungeon(&mut broken), Err(TerrainError::BufferAllocation(_))));

        assert_eq!(t.vertices(), vertices.as_slice());
        assert_eq!(t.rooms(), rooms.as_slice());
        assert_eq!(t.height_at(6.3, 11.8), sample);
    }

    #[test]
    fn test_failed_regeneration_does_not_advance_rng() {
        let (mut a, mut device) = terrain(config(10, 10, 6, 3, 55));
        let (mut b, _) = terrain(config(10, 10, 6, 3, 55));

        let mut broken = HeadlessDevice::with_budget(0);
        assert!(a.random_height_map(&mut broken).is_err());
        a.random_height_map(&mut device).unwrap();
        b.random_height_map(&mut device).unwrap();
        assert_eq!(a.vertices(), b.vertices());
    }

    #[test]
    fn test_degenerate_room_count() {
        let (mut t, mut device) = terrain(config(16, 16, 6, 3, 2));
        t.voronoi_dungeon(&mut device).unwrap();
        let before = t.rooms().to_vec();

        t.config.room_count = 1;
        let result = t.voronoi_dungeon(&mut device);
        assert!(matches!(result, Err(TerrainError::DegenerateLayout(_))));
        assert_eq!(t.rooms(), before.as_slice());
    }

    #[test]
    fn test_invalid_wavelength() {
        let (mut t, mut device) = terrain(config(16, 16, 6, 3, 2));
        *t.wavelength_mut() = 0.0;
        assert!(matches!(
            t.noise_height_map(&mut device),
            Err(TerrainError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_smoothing_zero_is_identity() {
        let (mut t, mut device) = terrain(config(16, 16, 6, 3, 31));
        t.random_height_map(&mut device).unwrap();
        let before = t.grid().unwrap().heights();

        t.smoothen_height_map(&mut device, 0.0).unwrap();
        assert_eq!(t.grid().unwrap().heights(), before);

        assert!(matches!(
            t.smoothen_height_map(&mut device, -0.5),
            Err(TerrainError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_smoothing_keeps_layout() {
        let (mut t, mut device) = terrain(config(24, 24, 9, 4, 17));
        t.faulting(&mut device).unwrap();
        t.voronoi_dungeon(&mut device).unwrap();
        let rooms = t.rooms().to_vec();

        t.smoothen_height_map(&mut device, 0.5).unwrap();
        assert_eq!(t.rooms(), rooms.as_slice());
    }

    #[test]
    fn test_smoothing_keeps_plateaus_flat() {
        let (mut t, mut device) = terrain(config(40, 40, 12, 5, 5));
        t.faulting(&mut device).unwrap();
        t.voronoi_dungeon(&mut device).unwrap();
        let carved = t.grid().unwrap().clone();

        t.smoothen_height_map(&mut device, 1.0).unwrap();
        let grid = t.grid().unwrap();

        let mut interior = 0;
        for (i, sample) in grid.samples().iter().enumerate() {
            if let Some(id) = sample.room {
                let room = t.rooms().iter().find(|r| r.id == id).unwrap();
                assert_eq!(sample.position.y, room.height, "cell {} left its plateau", i);
                interior += 1;
            }
            if sample.corridor.is_some() {
                assert_eq!(sample.position.y, carved.samples()[i].position.y);
            }
        }
        assert!(interior > 0);
        assert_ne!(grid.heights(), carved.heights());
    }

    #[test]
    fn test_second_dungeon_replaces_first() {
        let (mut t, mut device) = terrain(config(40, 40, 12, 5, 5));
        t.faulting(&mut device).unwrap();
        let base = t.grid().unwrap().heights();

        t.voronoi_dungeon(&mut device).unwrap();
        let first = t.grid().unwrap().clone();
        t.voronoi_dungeon(&mut device).unwrap();
        let grid = t.grid().unwrap();
        assert_ne!(grid.heights(), first.heights());

        for (i, sample) in grid.samples().iter().enumerate() {
            if sample.room.is_none() && sample.corridor.is_none() {
                assert_eq!(sample.position.y, base[i], "cell {} kept an old carved height", i);
                assert_eq!(sample.walkable, 0.0);
            }
        }
    }

    #[test]
    fn test_dungeon_after_smoothing_uses_smoothed_base() {
        let (mut a, mut device) = terrain(config(32, 32, 10, 4, 9));
        let (mut b, _) = terrain(config(32, 32, 10, 4, 9));

        a.faulting(&mut device).unwrap();
        a.voronoi_dungeon(&mut device).unwrap();
        a.smoothen_height_map(&mut device, 0.5).unwrap();
        a.voronoi_dungeon(&mut device).unwrap();

        b.faulting(&mut device).unwrap();
        b.smoothen_height_map(&mut device, 0.5).unwrap();
        let smoothed = b.grid().unwrap().heights();

        for (i, sample) in a.grid().unwrap().samples().iter().enumerate() {
            if sample.room.is_none() && sample.corridor.is_none() {
                assert_eq!(sample.position.y, smoothed[i]);
            }
        }
    }

    #[test]
    fn test_mutated_amplitude_is_validated() {
        let (mut t, mut device) = terrain(config(16, 16, 6, 3, 2));
        t.faulting(&mut device).unwrap();
        let vertices = t.vertices().to_vec();

        for bad in [-1.0, f32::NAN, f32::INFINITY] {
            *t.amplitude_mut() = bad;
            assert!(matches!(
                t.random_height_map(&mut device),
                Err(TerrainError::InvalidParameter(_))
            ));
        }
        assert_eq!(t.vertices(), vertices.as_slice());

        *t.amplitude_mut() = 3.0;
        *t.wavelength_mut() = f32::NAN;
        assert!(matches!(
            t.noise_height_map(&mut device),
            Err(TerrainError::InvalidParameter(_))
        ));
        t.faulting(&mut device).unwrap();
    }

    #[test]
    fn test_render_paths() {
        let (t, _) = terrain(config(40, 40, 6, 3, 1));
        let mut ctx = HeadlessContext::new();
        assert_eq!(t.render(&mut ctx), 1);
        assert_eq!(ctx.indices_drawn(), t.index_count());

        let mut ctx = HeadlessContext::new();
        let draws = t.render_quadtree(&mut ctx);
        assert!(draws > 1);
        assert_eq!(ctx.indices_drawn(), t.index_count());
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let (mut t, mut device) = terrain(config(16, 16, 6, 3, 4));
        t.voronoi_dungeon(&mut device).unwrap();
        t.shutdown();

        assert!(!t.is_initialized());
        assert_eq!(t.vertex_count(), 0);
        assert_eq!(t.index_count(), 0);
        assert!(t.rooms().is_empty());
        assert!(t.height_at(3.0, 3.0).is_none());
        assert_eq!(t.render(&mut HeadlessContext::new()), 0);
        assert!(matches!(t.faulting(&mut device), Err(TerrainError::NotInitialized)));

        // Second shutdown is a no-op
        t.shutdown();
    }

    #[cfg(feature = "spatial-index")]
    #[test]
    fn test_find_site_at() {
        let (mut t, mut device) = terrain(config(20, 20, 8, 3, 12));
        assert_eq!(t.find_site_at(1.0, 1.0), None);

        t.voronoi_dungeon(&mut device).unwrap();
        for site in t.sites() {
            assert_eq!(t.find_site_at(site.x as f32, site.z as f32), Some(site.id));
        }
    }
}
