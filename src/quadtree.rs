//! Quadtree over the terrain mesh
//!
//! Nodes live in a flat arena and refer to their children by [`NodeId`].
//! Triangles are handed to the child whose quadrant holds their centroid, so
//! every triangle ends up in exactly one leaf. Because a triangle may stick
//! out of its quadrant, each node also records the loose x/z footprint of
//! the triangles below it, and queries descend by footprint.

use glam::Vec2;

use crate::error::Result;
use crate::mesh::{create_buffers, BufferPair, Device, MeshData, RenderContext, Vertex};

/// Walkability at or above this counts as walkable
pub const WALKABLE_THRESHOLD: f32 = 0.5;

/// Slack for points on triangle edges
const EDGE_EPSILON: f32 = 1e-5;

/// Index of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// Surface properties at a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSample {
    pub height: f32,
    /// Interpolated walkability weight
    pub walkability: f32,
    /// `walkability >= WALKABLE_THRESHOLD`
    pub walkable: bool,
}

impl SurfaceSample {
    fn new(height: f32, walkability: f32) -> Self {
        Self {
            height,
            walkability,
            walkable: walkability >= WALKABLE_THRESHOLD,
        }
    }
}

/// A single quadtree node
#[derive(Debug, Clone)]
pub struct QuadNode<B> {
    /// Square centre in x/z
    pub center: Vec2,
    pub half_width: f32,
    /// Footprint of the triangles below this node (min corner)
    pub min: Vec2,
    /// Footprint of the triangles below this node (max corner)
    pub max: Vec2,
    pub depth: usize,
    pub triangle_count: usize,
    children: Option<[NodeId; 4]>,
    /// Leaf-local copy, three vertices per triangle
    vertices: Vec<Vertex>,
    buffers: Option<BufferPair<B>>,
}

impl<B> QuadNode<B> {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn children(&self) -> Option<&[NodeId; 4]> {
        self.children.as_ref()
    }

    pub fn buffers(&self) -> Option<&BufferPair<B>> {
        self.buffers.as_ref()
    }

    /// Leaf-local vertices (empty for internal nodes)
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    fn footprint_contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x - EDGE_EPSILON
            && p.x <= self.max.x + EDGE_EPSILON
            && p.y >= self.min.y - EDGE_EPSILON
            && p.y <= self.max.y + EDGE_EPSILON
    }

    fn sample(&self, p: Vec2) -> Option<SurfaceSample> {
        self.vertices.chunks_exact(3).find_map(|t| interpolate(t, p))
    }
}

/// Barycentric interpolation of height and walkability at `p` (x/z)
///
/// Returns `None` if `p` is outside the triangle or the triangle is
/// degenerate in plan view.
fn interpolate(triangle: &[Vertex], p: Vec2) -> Option<SurfaceSample> {
    let plan = |v: &Vertex| Vec2::new(v.position[0], v.position[2]);
    let (a, b, c) = (plan(&triangle[0]), plan(&triangle[1]), plan(&triangle[2]));

    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let det = v0.perp_dot(v1);
    if det.abs() < f32::EPSILON {
        return None;
    }

    let l1 = v2.perp_dot(v1) / det;
    let l2 = v0.perp_dot(v2) / det;
    let l0 = 1.0 - l1 - l2;
    if l0 < -EDGE_EPSILON || l1 < -EDGE_EPSILON || l2 < -EDGE_EPSILON {
        return None;
    }

    let blend = |f: fn(&Vertex) -> f32| l0 * f(&triangle[0]) + l1 * f(&triangle[1]) + l2 * f(&triangle[2]);
    Some(SurfaceSample::new(
        blend(|v| v.position[1]),
        blend(|v| v.walkable),
    ))
}

/// Arena quadtree with per-leaf buffers
#[derive(Debug, Clone)]
pub struct QuadTree<B> {
    nodes: Vec<QuadNode<B>>,
}

impl<B> QuadTree<B> {
    /// Build a tree over `mesh`, uploading one buffer pair per non-empty leaf
    ///
    /// # Arguments
    ///
    /// * `device` - Allocates the leaf buffers
    /// * `mesh` - Source triangles
    /// * `leaf_threshold` - Nodes with more triangles than this are split
    /// * `max_depth` - Nodes at this depth are never split (root is depth 0)
    ///
    /// # Errors
    ///
    /// Returns `BufferAllocation` if the device fails; buffers allocated so
    /// far are dropped with the partial tree.
    pub fn build<D>(device: &mut D, mesh: &MeshData, leaf_threshold: usize, max_depth: usize) -> Result<Self>
    where
        D: Device<Buffer = B>,
    {
        let triangles: Vec<[Vertex; 3]> = (0..mesh.triangle_count())
            .map(|t| mesh.triangle(t).map(|v| *v))
            .collect();

        let (min, max) = footprint(&triangles);
        let (center, half_width) = if triangles.is_empty() {
            (Vec2::ZERO, 0.0)
        } else {
            ((min + max) * 0.5, ((max - min) * 0.5).max_element())
        };

        let mut tree = Self { nodes: Vec::new() };
        let root = tree.push_node(center, half_width, 0, &triangles);

        let mut pending = vec![(root, triangles)];
        while let Some((id, triangles)) = pending.pop() {
            let node = &tree.nodes[id.0];
            if triangles.len() <= leaf_threshold || node.depth >= max_depth {
                tree.make_leaf(device, id, triangles)?;
                continue;
            }

            let (center, quarter, depth) = (node.center, node.half_width * 0.5, node.depth + 1);
            let mut quadrants: [Vec<[Vertex; 3]>; 4] = Default::default();
            for triangle in triangles {
                quadrants[quadrant(center, centroid(&triangle))].push(triangle);
            }

            let mut children = [NodeId(0); 4];
            for (q, part) in quadrants.into_iter().enumerate() {
                let offset = Vec2::new(
                    if q & 1 == 0 { -quarter } else { quarter },
                    if q & 2 == 0 { -quarter } else { quarter },
                );
                let child = tree.push_node(center + offset, quarter, depth, &part);
                children[q] = child;
                pending.push((child, part));
            }
            tree.nodes[id.0].children = Some(children);
        }

        log::debug!(
            "quadtree: {} nodes, {} leaves, depth {}",
            tree.node_count(),
            tree.leaf_count(),
            tree.depth()
        );

        Ok(tree)
    }

    fn push_node(&mut self, center: Vec2, half_width: f32, depth: usize, triangles: &[[Vertex; 3]]) -> NodeId {
        let (min, max) = footprint(triangles);
        let id = NodeId(self.nodes.len());
        self.nodes.push(QuadNode {
            center,
            half_width,
            min,
            max,
            depth,
            triangle_count: triangles.len(),
            children: None,
            vertices: Vec::new(),
            buffers: None,
        });
        id
    }

    fn make_leaf<D>(&mut self, device: &mut D, id: NodeId, triangles: Vec<[Vertex; 3]>) -> Result<()>
    where
        D: Device<Buffer = B>,
    {
        if triangles.is_empty() {
            return Ok(());
        }
        let vertices: Vec<Vertex> = triangles.into_iter().flatten().collect();
        let indices: Vec<u32> = (0..vertices.len() as u32).collect();
        let buffers = create_buffers(device, &vertices, &indices)?;

        let node = &mut self.nodes[id.0];
        node.vertices = vertices;
        node.buffers = Some(buffers);
        Ok(())
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> Option<&QuadNode<B>> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> &[QuadNode<B>] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Deepest node depth
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Total triangles held by the tree
    pub fn triangle_count(&self) -> usize {
        self.nodes.first().map_or(0, |n| n.triangle_count)
    }

    /// Height and walkability of the surface at `(x, z)`
    ///
    /// Returns `None` when no triangle lies under the point.
    pub fn height_at(&self, x: f32, z: f32) -> Option<SurfaceSample> {
        if !x.is_finite() || !z.is_finite() {
            return None;
        }
        let p = Vec2::new(x, z);

        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if node.triangle_count == 0 || !node.footprint_contains(p) {
                continue;
            }
            match node.children {
                Some(children) => stack.extend(children.iter().rev()),
                None => {
                    if let Some(sample) = node.sample(p) {
                        return Some(sample);
                    }
                }
            }
        }
        None
    }

    /// Submit every leaf's buffers; returns the number of draws
    pub fn render<C: RenderContext<B>>(&self, ctx: &mut C) -> usize {
        let mut draws = 0;
        for buffers in self.nodes.iter().filter_map(QuadNode::buffers) {
            buffers.draw(ctx);
            draws += 1;
        }
        draws
    }
}

fn centroid(triangle: &[Vertex; 3]) -> Vec2 {
    triangle
        .iter()
        .map(|v| Vec2::new(v.position[0], v.position[2]))
        .sum::<Vec2>()
        / 3.0
}

/// Child slot for `p`: bit 0 set east of centre, bit 1 set south (+z)
#[inline]
fn quadrant(center: Vec2, p: Vec2) -> usize {
    (p.x >= center.x) as usize | (((p.y >= center.y) as usize) << 1)
}

fn footprint(triangles: &[[Vertex; 3]]) -> (Vec2, Vec2) {
    triangles.iter().flatten().fold(
        (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
        |(min, max), v| {
            let p = Vec2::new(v.position[0], v.position[2]);
            (min.min(p), max.max(p))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::HeightGrid;
    use crate::mesh::{build_mesh, HeadlessBuffer, HeadlessContext, HeadlessDevice};
    use std::collections::HashMap;

    fn planar_grid(w: usize, h: usize) -> HeightGrid {
        let mut grid = HeightGrid::new(w, h).unwrap();
        for z in 0..h {
            for x in 0..w {
                grid.set_height(x, z, 0.5 * x as f32 + 0.25 * z as f32);
                grid.get_mut(x, z).unwrap().walkable = if x < w / 2 { 1.0 } else { 0.0 };
            }
        }
        grid
    }

    fn build(grid: &HeightGrid, leaf: usize, depth: usize) -> (QuadTree<HeadlessBuffer>, HeadlessDevice) {
        let mut device = HeadlessDevice::new();
        let tree = QuadTree::build(&mut device, &build_mesh(grid), leaf, depth).unwrap();
        (tree, device)
    }

    #[test]
    fn test_leaf_threshold_respected() {
        let grid = planar_grid(64, 64);
        let (tree, _) = build(&grid, 256, 6);

        assert_eq!(tree.triangle_count(), 63 * 63 * 2);
        for node in tree.nodes() {
            if node.is_leaf() {
                assert!(node.triangle_count <= 256 || node.depth == 6);
            } else {
                assert!(node.triangle_count > 256);
                assert!(node.buffers().is_none());
                assert!(node.vertices().is_empty());
            }
        }
    }

    #[test]
    fn test_no_triangle_lost_or_duplicated() {
        let grid = planar_grid(40, 30);
        let mesh = build_mesh(&grid);
        let (tree, _) = build(&grid, 50, 8);

        // Centroids of grid triangles sit on a 1/3 lattice and are unique
        let key = |t: &[Vertex]| {
            let c = t
                .iter()
                .map(|v| Vec2::new(v.position[0], v.position[2]))
                .sum::<Vec2>();
            (c.x.round() as i64, c.y.round() as i64)
        };

        let mut counts: HashMap<(i64, i64), usize> = HashMap::new();
        for node in tree.nodes().iter().filter(|n| n.is_leaf()) {
            assert_eq!(node.vertices().len(), node.triangle_count * 3);
            for t in node.vertices().chunks_exact(3) {
                *counts.entry(key(t)).or_insert(0) += 1;
            }
        }

        assert_eq!(counts.len(), mesh.triangle_count());
        assert!(counts.values().all(|&c| c == 1));
        for t in 0..mesh.triangle_count() {
            let tri = mesh.triangle(t).map(|v| *v);
            assert!(counts.contains_key(&key(&tri)));
        }
    }

    #[test]
    fn test_internal_counts_are_child_sums() {
        let grid = planar_grid(50, 50);
        let (tree, _) = build(&grid, 100, 6);
        assert!(tree.node_count() > 1);

        for node in tree.nodes() {
            if let Some(children) = node.children() {
                let sum: usize = children
                    .iter()
                    .map(|&c| tree.node(c).unwrap().triangle_count)
                    .sum();
                assert_eq!(sum, node.triangle_count);
                for &c in children {
                    assert_eq!(tree.node(c).unwrap().depth, node.depth + 1);
                }
            }
        }
    }

    #[test]
    fn test_depth_cap_forces_leaves() {
        let grid = planar_grid(30, 30);
        let (tree, _) = build(&grid, 1, 2);
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.node_count(), 1 + 4 + 16);
    }

    #[test]
    fn test_single_leaf_when_under_threshold() {
        let grid = planar_grid(5, 5);
        let (tree, device) = build(&grid, 256, 6);
        assert_eq!(tree.node_count(), 1);
        assert!(tree.node(tree.root()).unwrap().is_leaf());
        assert_eq!(device.allocations(), 2);
    }

    #[test]
    fn test_empty_leaves_allocate_nothing() {
        let grid = planar_grid(40, 40);
        let (tree, device) = build(&grid, 64, 6);
        let filled = tree
            .nodes()
            .iter()
            .filter(|n| n.is_leaf() && n.triangle_count > 0)
            .count();
        assert_eq!(device.allocations(), filled * 2);
        for node in tree.nodes().iter().filter(|n| n.triangle_count == 0) {
            assert!(node.buffers().is_none());
        }
    }

    #[test]
    fn test_height_matches_plane() {
        let grid = planar_grid(33, 21);
        let (tree, _) = build(&grid, 32, 6);

        for &(x, z) in &[(0.0, 0.0), (3.3, 7.9), (16.0, 10.0), (31.99, 19.5), (32.0, 20.0), (12.5, 0.0)] {
            let sample = tree.height_at(x, z).unwrap();
            let expected = 0.5 * x + 0.25 * z;
            assert!(
                (sample.height - expected).abs() < 1e-4,
                "({}, {}): {} vs {}",
                x,
                z,
                sample.height,
                expected
            );
        }
    }

    #[test]
    fn test_walkability_interpolates() {
        let grid = planar_grid(20, 20);
        let (tree, _) = build(&grid, 16, 6);

        let inside = tree.height_at(3.0, 4.0).unwrap();
        assert_eq!(inside.walkability, 1.0);
        assert!(inside.walkable);

        let outside = tree.height_at(15.0, 4.0).unwrap();
        assert_eq!(outside.walkability, 0.0);
        assert!(!outside.walkable);

        let edge = tree.height_at(9.5, 4.0).unwrap();
        assert!((edge.walkability - 0.5).abs() < 1e-5);
        assert!(edge.walkable);
    }

    #[test]
    fn test_outside_is_none() {
        let grid = planar_grid(10, 10);
        let (tree, _) = build(&grid, 8, 6);
        assert!(tree.height_at(-0.5, 3.0).is_none());
        assert!(tree.height_at(3.0, 9.5).is_none());
        assert!(tree.height_at(100.0, 100.0).is_none());
        assert!(tree.height_at(f32::NAN, 1.0).is_none());
    }

    #[test]
    fn test_render_draws_every_filled_leaf() {
        let grid = planar_grid(40, 40);
        let (tree, _) = build(&grid, 128, 6);
        let mut ctx = HeadlessContext::new();
        let draws = tree.render(&mut ctx);

        assert_eq!(draws, ctx.draws.len());
        assert_eq!(ctx.indices_drawn(), 39 * 39 * 6);
    }

    #[test]
    fn test_device_failure_propagates() {
        let grid = planar_grid(40, 40);
        let mut device = HeadlessDevice::with_budget(1024);
        let result = QuadTree::build(&mut device, &build_mesh(&grid), 64, 6);
        assert!(matches!(result, Err(crate::TerrainError::BufferAllocation(_))));
    }
}
