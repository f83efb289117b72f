//! Corridor carving between connected rooms
//!
//! Corridors follow an L-shaped path: along x on the start room's row, then
//! along z on the target room's column. Steps are orthogonal only, so the
//! centre line is 4-connected. A square brush `corridor_width` cells wide is
//! stamped at every path cell.

use crate::generation::graph::CorridorGraph;
use crate::generation::voronoi::Region;
use crate::grid::HeightGrid;

/// A carved corridor
#[derive(Debug, Clone, PartialEq)]
pub struct Corridor {
    /// Index of the corridor (and of its edge in the corridor graph)
    pub id: usize,
    /// Start room
    pub from: usize,
    /// End room
    pub to: usize,
    /// Cells this corridor carved, in carving order
    pub cells: Vec<usize>,
}

/// L-shaped cell path from `start` to `end`, both inclusive
pub fn corridor_path(start: (usize, usize), end: (usize, usize)) -> Vec<(usize, usize)> {
    let (x0, z0) = start;
    let (x1, z1) = end;
    let mut path = Vec::with_capacity(x0.abs_diff(x1) + z0.abs_diff(z1) + 1);

    let mut x = x0;
    path.push((x, z0));
    while x != x1 {
        x = if x1 > x { x + 1 } else { x - 1 };
        path.push((x, z0));
    }

    let mut z = z0;
    while z != z1 {
        z = if z1 > z { z + 1 } else { z - 1 };
        path.push((x1, z));
    }
    path
}

/// Carve one corridor per graph edge
///
/// Each brushed cell outside any room interior takes a height interpolated
/// between the two room plateaus by its position along the path, becomes
/// fully walkable and records the corridor id. Cells already carved by an
/// earlier corridor keep their height.
pub fn carve_corridors(
    grid: &mut HeightGrid,
    rooms: &[Region],
    graph: &CorridorGraph,
    corridor_width: usize,
) -> Vec<Corridor> {
    let width = corridor_width.max(1) as i64;
    let low = -(width - 1) / 2;
    let high = width / 2;

    graph
        .edges()
        .iter()
        .enumerate()
        .map(|(id, edge)| {
            let (from, to) = (&rooms[edge.a], &rooms[edge.b]);
            let path = corridor_path(from.center, to.center);
            let steps = (path.len() - 1).max(1) as f32;
            let mut cells = Vec::new();

            for (k, &(px, pz)) in path.iter().enumerate() {
                let t = k as f32 / steps;
                let height = from.height + (to.height - from.height) * t;

                for dz in low..=high {
                    for dx in low..=high {
                        let (x, z) = (px as i64 + dx, pz as i64 + dz);
                        if !grid.contains(x, z) {
                            continue;
                        }
                        let index = grid.index(x as usize, z as usize);
                        let sample = &mut grid.samples_mut()[index];
                        if sample.room.is_some() || sample.corridor.is_some() {
                            continue;
                        }
                        sample.position.y = height;
                        sample.walkable = 1.0;
                        sample.corridor = Some(id);
                        cells.push(index);
                    }
                }
            }

            Corridor {
                id,
                from: edge.a,
                to: edge.b,
                cells,
            }
        })
        .collect()
}
