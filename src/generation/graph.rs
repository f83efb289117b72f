//! Room connectivity graph
//!
//! An undirected multigraph over room indices, stored as an edge list plus an
//! adjacency map. Corridor selection runs Kruskal-style over Delaunay edges:
//! an edge is rejected when adding it would close a cycle, and a fraction of
//! the rejected edges is then added back to create loops.

use glam::DVec2;
use std::collections::{HashMap, VecDeque};

/// An undirected edge between two rooms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphEdge {
    pub a: usize,
    pub b: usize,
    /// Distance between the two room anchors
    pub weight: f32,
}

impl GraphEdge {
    #[inline]
    pub fn connects(&self, a: usize, b: usize) -> bool {
        (self.a == a && self.b == b) || (self.a == b && self.b == a)
    }
}

/// Edge list + adjacency map over `node_count` nodes
#[derive(Debug, Clone, Default)]
pub struct CorridorGraph {
    node_count: usize,
    edges: Vec<GraphEdge>,
    /// node -> (neighbour, edge index)
    adjacency: HashMap<usize, Vec<(usize, usize)>>,
}

impl CorridorGraph {
    /// Empty graph with `node_count` isolated nodes
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            edges: Vec::new(),
            adjacency: HashMap::new(),
        }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    #[inline]
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Neighbours of `node` (one entry per incident edge)
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flatten()
            .map(|&(neighbor, _)| neighbor)
    }

    /// Add an edge; returns its index
    pub fn add_edge(&mut self, a: usize, b: usize, weight: f32) -> usize {
        debug_assert!(a < self.node_count && b < self.node_count);
        let index = self.edges.len();
        self.edges.push(GraphEdge { a, b, weight });
        self.adjacency.entry(a).or_default().push((b, index));
        self.adjacency.entry(b).or_default().push((a, index));
        index
    }

    /// Remove the most recently added edge
    fn pop_edge(&mut self) -> Option<GraphEdge> {
        let edge = self.edges.pop()?;
        let index = self.edges.len();
        for node in [edge.a, edge.b] {
            if let Some(list) = self.adjacency.get_mut(&node) {
                list.retain(|&(_, e)| e != index);
            }
        }
        Some(edge)
    }

    /// Whether the graph contains a cycle
    ///
    /// Iterative depth-first traversal with a visited set. Each stack entry
    /// carries the edge it was reached through, so walking back along that
    /// edge is not mistaken for a cycle while a second, parallel edge is.
    pub fn has_cycle(&self) -> bool {
        let mut visited = vec![false; self.node_count];
        let mut stack: Vec<(usize, Option<usize>)> = Vec::new();

        for start in 0..self.node_count {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            stack.push((start, None));

            while let Some((node, parent_edge)) = stack.pop() {
                for &(next, edge) in self.adjacency.get(&node).into_iter().flatten() {
                    if Some(edge) == parent_edge {
                        continue;
                    }
                    if visited[next] {
                        return true;
                    }
                    visited[next] = true;
                    stack.push((next, Some(edge)));
                }
            }
        }
        false
    }

    /// Whether adding `a`-`b` would make the graph cyclic
    ///
    /// Tentatively inserts the edge, runs [`has_cycle`](Self::has_cycle) and
    /// removes it again.
    pub fn would_close_cycle(&mut self, a: usize, b: usize) -> bool {
        if a == b {
            return true;
        }
        self.add_edge(a, b, 0.0);
        let cyclic = self.has_cycle();
        self.pop_edge();
        cyclic
    }

    /// Component label for every node, labels numbered from 0
    pub fn components(&self) -> Vec<usize> {
        let mut label = vec![usize::MAX; self.node_count];
        let mut next_label = 0;
        let mut queue = VecDeque::new();

        for start in 0..self.node_count {
            if label[start] != usize::MAX {
                continue;
            }
            label[start] = next_label;
            queue.push_back(start);
            while let Some(node) = queue.pop_front() {
                for neighbor in self.neighbors(node) {
                    if label[neighbor] == usize::MAX {
                        label[neighbor] = next_label;
                        queue.push_back(neighbor);
                    }
                }
            }
            next_label += 1;
        }
        label
    }

    pub fn component_count(&self) -> usize {
        self.components().into_iter().max().map_or(0, |max| max + 1)
    }

    /// Every node reachable from every other node
    pub fn is_connected(&self) -> bool {
        self.component_count() <= 1
    }

    /// Number of independent cycles (`edges - nodes + components`)
    pub fn cycle_count(&self) -> usize {
        (self.edges.len() + self.component_count()).saturating_sub(self.node_count)
    }

    /// Reduce candidate edges to a connected corridor graph
    ///
    /// 1. Candidates are visited shortest first (ties by endpoints) and kept
    ///    unless they would close a cycle, giving a minimum spanning forest.
    /// 2. `round(loop_factor * rejected)` of the rejected edges, shortest
    ///    first, are added back; each one adds exactly one cycle.
    /// 3. Any components still apart are joined by their closest point pair.
    pub fn reduce(points: &[DVec2], candidates: &[(usize, usize)], loop_factor: f32) -> Self {
        let mut graph = Self::new(points.len());
        let weight = |a: usize, b: usize| points[a].distance(points[b]) as f32;

        let mut sorted: Vec<(usize, usize)> = candidates
            .iter()
            .map(|&(a, b)| (a.min(b), a.max(b)))
            .collect();
        sorted.sort_by(|&(a1, b1), &(a2, b2)| {
            weight(a1, b1)
                .total_cmp(&weight(a2, b2))
                .then((a1, b1).cmp(&(a2, b2)))
        });
        sorted.dedup();

        let mut rejected = Vec::new();
        for (a, b) in sorted {
            if graph.would_close_cycle(a, b) {
                rejected.push((a, b));
            } else {
                graph.add_edge(a, b, weight(a, b));
            }
        }

        let loops = ((loop_factor.clamp(0.0, 1.0) * rejected.len() as f32).round() as usize)
            .min(rejected.len());
        for &(a, b) in &rejected[..loops] {
            graph.add_edge(a, b, weight(a, b));
        }

        graph.bridge_components(points);

        log::debug!(
            "corridor graph: {} rooms, {} edges ({} spanning, {} loops)",
            graph.node_count,
            graph.edges.len(),
            graph.edges.len() - loops,
            loops
        );

        graph
    }

    /// Join separate components with their closest point pairs until connected
    fn bridge_components(&mut self, points: &[DVec2]) {
        loop {
            let label = self.components();
            let Some(&root_label) = label.first() else {
                return;
            };
            if label.iter().all(|&l| l == root_label) {
                return;
            }

            let mut best: Option<(f64, usize, usize)> = None;
            for a in 0..self.node_count {
                for b in (a + 1)..self.node_count {
                    if label[a] == label[b] {
                        continue;
                    }
                    let d = points[a].distance_squared(points[b]);
                    if best.map_or(true, |(best_d, _, _)| d < best_d) {
                        best = Some((d, a, b));
                    }
                }
            }

            let Some((d, a, b)) = best else {
                return;
            };
            log::warn!("corridor graph disconnected, bridging rooms {} and {}", a, b);
            self.add_edge(a, b, d.sqrt() as f32);
        }
    }
}
