//! Voronoi region construction on the height grid
//!
//! Every grid cell is assigned to its nearest site, neighbouring regions are
//! merged until the requested number of rooms remains, and room interiors are
//! flattened into walkable plateaus.

use std::collections::BTreeSet;

use crate::generation::sites::Site;
use crate::grid::{HeightGrid, SiteRef};

/// A room: one or more merged Voronoi regions
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Room index (0 to room_count-1)
    pub id: usize,
    /// Site whose cell is the room's representative point
    pub anchor: usize,
    /// Grid coordinate of the anchor site
    pub center: (usize, usize),
    /// Sites merged into this room, ascending
    pub sites: Vec<usize>,
    /// Row-major indices of every cell in the room, ascending
    pub cells: Vec<usize>,
    /// Plateau height of the room interior
    pub height: f32,
    /// Largest distance from the anchor to any member cell
    pub max_distance: f32,
}

impl Region {
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn contains_site(&self, site: usize) -> bool {
        self.sites.binary_search(&site).is_ok()
    }
}

/// Find the nearest site to `(x, z)`; ties go to the lowest site index
///
/// Returns `None` when `sites` is empty.
pub fn nearest_site(sites: &[Site], x: usize, z: usize) -> Option<SiteRef> {
    let mut best: Option<(usize, f32)> = None;
    for site in sites {
        let d2 = site.distance_squared_to(x, z);
        match best {
            Some((_, best_d2)) if d2 >= best_d2 => {}
            _ => best = Some((site.id, d2)),
        }
    }
    best.map(|(site, d2)| SiteRef {
        site,
        distance: d2.sqrt(),
    })
}

/// Record the nearest site of every cell (brute force, O(cells × sites))
pub fn assign_cells(grid: &mut HeightGrid, sites: &[Site]) {
    let width = grid.width();
    for (i, sample) in grid.samples_mut().iter_mut().enumerate() {
        sample.site = nearest_site(sites, i % width, i / width);
    }
}

/// Working state for region merging; regions are keyed by their anchor site id
struct MergeState {
    width: usize,
    region_of_site: Vec<usize>,
    members: Vec<Vec<usize>>,
    cells: Vec<Vec<usize>>,
    max_distance: Vec<f32>,
    active: BTreeSet<usize>,
}

impl MergeState {
    fn new(grid: &HeightGrid, site_count: usize) -> Self {
        let mut cells = vec![Vec::new(); site_count];
        let mut max_distance = vec![0.0f32; site_count];
        for (i, sample) in grid.samples().iter().enumerate() {
            if let Some(site_ref) = sample.site {
                cells[site_ref.site].push(i);
                max_distance[site_ref.site] = max_distance[site_ref.site].max(site_ref.distance);
            }
        }

        Self {
            width: grid.width(),
            region_of_site: (0..site_count).collect(),
            members: (0..site_count).map(|s| vec![s]).collect(),
            cells,
            max_distance,
            active: (0..site_count).collect(),
        }
    }

    fn region_of_cell(&self, grid: &HeightGrid, cell: usize) -> Option<usize> {
        grid.samples()[cell]
            .site
            .map(|site_ref| self.region_of_site[site_ref.site])
    }

    /// Region with the fewest cells, then the smallest extent, then the lowest id
    fn smallest(&self) -> Option<usize> {
        self.active.iter().copied().min_by(|&a, &b| {
            self.cells[a]
                .len()
                .cmp(&self.cells[b].len())
                .then(self.max_distance[a].total_cmp(&self.max_distance[b]))
                .then(a.cmp(&b))
        })
    }

    /// Regions sharing a 4-connected cell border with `region`
    fn adjacent(&self, grid: &HeightGrid, region: usize) -> BTreeSet<usize> {
        let mut adjacent = BTreeSet::new();
        for &cell in &self.cells[region] {
            let (x, z) = grid.coords(cell);
            let (x, z) = (x as i64, z as i64);
            for (nx, nz) in [(x - 1, z), (x + 1, z), (x, z - 1), (x, z + 1)] {
                if !grid.contains(nx, nz) {
                    continue;
                }
                let neighbor = grid.index(nx as usize, nz as usize);
                match self.region_of_cell(grid, neighbor) {
                    Some(other) if other != region => {
                        adjacent.insert(other);
                    }
                    _ => {}
                }
            }
        }
        adjacent
    }

    /// Merge target for `region`: the adjacent region with the nearest anchor,
    /// or the nearest active region if nothing touches it
    fn target(&self, grid: &HeightGrid, sites: &[Site], region: usize) -> Option<usize> {
        let adjacent = self.adjacent(grid, region);
        let candidates: Vec<usize> = if adjacent.is_empty() {
            self.active.iter().copied().filter(|&r| r != region).collect()
        } else {
            adjacent.into_iter().collect()
        };

        let anchor = &sites[region];
        candidates.into_iter().min_by(|&a, &b| {
            anchor
                .distance_to(&sites[a])
                .total_cmp(&anchor.distance_to(&sites[b]))
                .then(a.cmp(&b))
        })
    }

    fn merge(&mut self, from: usize, into: usize, sites: &[Site]) {
        let anchor = &sites[into];
        let moved_sites = std::mem::take(&mut self.members[from]);
        let moved_cells = std::mem::take(&mut self.cells[from]);

        for &site in &moved_sites {
            self.region_of_site[site] = into;
        }
        self.members[into].extend(moved_sites);
        self.active.remove(&from);

        let width = self.width;
        let farthest = moved_cells
            .iter()
            .map(|&cell| anchor.distance_squared_to(cell % width, cell / width).sqrt())
            .fold(self.max_distance[into], f32::max);
        self.max_distance[into] = farthest;
        self.cells[into].extend(moved_cells);
    }
}

/// Merge Voronoi regions until `room_count` rooms remain
///
/// The grid must already carry site assignments (see [`assign_cells`]).
/// Repeatedly folds the smallest region into its nearest neighbour. The
/// surviving regions are numbered in ascending anchor-site order, and every
/// site's `region` field is rewritten to its room index.
pub fn merge_regions(grid: &HeightGrid, sites: &mut [Site], room_count: usize) -> Vec<Region> {
    let mut state = MergeState::new(grid, sites.len());

    while state.active.len() > room_count.max(1) {
        let Some(smallest) = state.smallest() else {
            break;
        };
        let Some(target) = state.target(grid, sites, smallest) else {
            break;
        };
        state.merge(smallest, target, sites);
    }

    let rooms: Vec<Region> = state
        .active
        .iter()
        .enumerate()
        .map(|(id, &anchor)| {
            let mut members = std::mem::take(&mut state.members[anchor]);
            let mut cells = std::mem::take(&mut state.cells[anchor]);
            members.sort_unstable();
            cells.sort_unstable();
            Region {
                id,
                anchor,
                center: (sites[anchor].x, sites[anchor].z),
                sites: members,
                cells,
                height: sites[anchor].height,
                max_distance: state.max_distance[anchor],
            }
        })
        .collect();

    for room in &rooms {
        for &site in &room.sites {
            sites[site].region = room.id;
        }
    }

    rooms
}

/// Flatten room interiors into walkable plateaus
///
/// A cell is interior when every cell within Chebyshev distance
/// `wall_thickness` is in the grid and in the same room. The anchor cell is
/// always interior. Interior cells take the room height, walkability 1 and a
/// room back-reference; everything else is left blocked.
pub fn flatten_rooms(grid: &mut HeightGrid, rooms: &[Region], wall_thickness: usize) {
    let mut room_of_cell: Vec<Option<usize>> = vec![None; grid.len()];
    for room in rooms {
        for &cell in &room.cells {
            room_of_cell[cell] = Some(room.id);
        }
    }

    let radius = wall_thickness as i64;
    for room in rooms {
        let anchor_cell = grid.index(room.center.0, room.center.1);
        for &cell in &room.cells {
            let (x, z) = grid.coords(cell);
            let interior = cell == anchor_cell
                || (-radius..=radius).all(|dz| {
                    (-radius..=radius).all(|dx| {
                        let nx = x as i64 + dx;
                        let nz = z as i64 + dz;
                        grid.contains(nx, nz)
                            && room_of_cell[grid.index(nx as usize, nz as usize)] == Some(room.id)
                    })
                });

            if interior {
                let sample = &mut grid.samples_mut()[cell];
                sample.position.y = room.height;
                sample.walkable = 1.0;
                sample.room = Some(room.id);
            }
        }
    }
}
