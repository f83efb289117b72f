//! Dungeon layout generation
//!
//! Scatters Voronoi sites over the height grid, merges their regions into
//! rooms, connects the rooms through a Delaunay-derived corridor graph and
//! carves the corridors into the grid.

mod corridor;
mod delaunay;
mod graph;
mod sites;
mod voronoi;

pub use corridor::{carve_corridors, corridor_path, Corridor};
pub use delaunay::{delaunay_edges, in_circumcircle, orientation, triangulate};
pub use graph::{CorridorGraph, GraphEdge};
pub use sites::{scatter_sites, Site, MAX_PLACEMENT_ATTEMPTS_PER_SITE};
pub use voronoi::{assign_cells, flatten_rooms, merge_regions, nearest_site, Region};

use glam::DVec2;
use rand::Rng;

use crate::config::TerrainConfig;
use crate::error::{Result, TerrainError};
use crate::grid::HeightGrid;

/// Everything the dungeon pass produces besides the grid edits
#[derive(Debug, Clone, Default)]
pub struct DungeonLayout {
    pub sites: Vec<Site>,
    pub rooms: Vec<Region>,
    pub graph: CorridorGraph,
    pub corridors: Vec<Corridor>,
}

/// Carve a dungeon into `grid`
///
/// The grid's heights are used as the starting terrain; any previous layout
/// on it is cleared first. Steps:
///
/// 1. Scatter `site_count` sites
/// 2. Assign every cell to its nearest site
/// 3. Merge regions down to `room_count` rooms and flatten their interiors
/// 4. Triangulate the room anchors and reduce the edges to a connected graph
/// 5. Carve one corridor per retained edge
///
/// # Errors
///
/// Returns `DegenerateLayout` if fewer than 2 rooms are requested (before the
/// grid is touched), or `SitePlacementExhausted` if the sites cannot be placed.
pub fn generate_dungeon<R: Rng>(
    grid: &mut HeightGrid,
    config: &TerrainConfig,
    rng: &mut R,
) -> Result<DungeonLayout> {
    if config.room_count < 2 {
        return Err(TerrainError::DegenerateLayout(format!(
            "need at least 2 rooms to connect (got {})",
            config.room_count
        )));
    }
    if config.room_count > config.site_count {
        return Err(TerrainError::DegenerateLayout(format!(
            "{} rooms cannot be formed from {} sites",
            config.room_count, config.site_count
        )));
    }

    let mut sites = scatter_sites(grid, config.site_count, rng)?;

    grid.clear_layout();
    assign_cells(grid, &sites);

    let rooms = merge_regions(grid, &mut sites, config.room_count);
    flatten_rooms(grid, &rooms, config.wall_thickness);

    let points: Vec<DVec2> = rooms
        .iter()
        .map(|room| DVec2::new(room.center.0 as f64, room.center.1 as f64))
        .collect();
    let candidates = delaunay_edges(&points)?;
    let graph = CorridorGraph::reduce(&points, &candidates, config.loop_factor);

    let corridors = carve_corridors(grid, &rooms, &graph, config.corridor_width);

    log::info!(
        "dungeon: {} sites -> {} rooms, {} delaunay edges -> {} corridors ({} loops)",
        sites.len(),
        rooms.len(),
        candidates.len(),
        corridors.len(),
        graph.cycle_count()
    );

    Ok(DungeonLayout {
        sites,
        rooms,
        graph,
        corridors,
    })
}
