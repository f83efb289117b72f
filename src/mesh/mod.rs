//! Mesh assembly for the height grid
//!
//! Produces an interleaved vertex buffer and a triangle-list index buffer
//! that can be uploaded as-is through a [`Device`].

mod device;

pub use device::{
    create_buffers, BufferKind, BufferPair, Device, DeviceError, HeadlessBuffer, HeadlessContext,
    HeadlessDevice, RenderContext,
};

use glam::Vec3;

use crate::grid::HeightGrid;

/// GPU-ready vertex layout
///
/// Plain `#[repr(C)]` with no padding, so a `&[Vertex]` can be cast straight
/// to bytes with `bytemuck`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
    /// Walkability weight, 0 = blocked, 1 = fully walkable
    pub walkable: f32,
}

impl Vertex {
    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Engine-agnostic mesh data output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// One vertex per grid sample, row-major
    pub vertices: Vec<Vertex>,
    /// Triangle list indices
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of indices
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Get the number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check if mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// The three vertices of triangle `t`
    pub fn triangle(&self, t: usize) -> [&Vertex; 3] {
        let i = &self.indices[t * 3..t * 3 + 3];
        [
            &self.vertices[i[0] as usize],
            &self.vertices[i[1] as usize],
            &self.vertices[i[2] as usize],
        ]
    }
}

/// Index triples of the two triangles covering quad `(x, z)`
///
/// Both triangles wind so that their face normal points up (+Y).
#[inline]
fn quad_triangles(grid: &HeightGrid, x: usize, z: usize) -> [[usize; 3]; 2] {
    let a = grid.index(x, z);
    let b = grid.index(x, z + 1);
    let c = grid.index(x + 1, z);
    let d = grid.index(x + 1, z + 1);
    [[a, b, c], [c, b, d]]
}

/// Build the vertex and index buffers for a grid
///
/// Vertex `i` is sample `i` (`z * width + x`). Each of the `(w-1)(h-1)` quads
/// contributes two triangles, so there are `(w-1)(h-1)*6` indices.
pub fn build_mesh(grid: &HeightGrid) -> MeshData {
    let vertices = grid
        .samples()
        .iter()
        .map(|s| Vertex {
            position: s.position.to_array(),
            uv: s.uv.to_array(),
            normal: s.normal.to_array(),
            walkable: s.walkable,
        })
        .collect();

    let quads = (grid.width() - 1) * (grid.height() - 1);
    let mut indices = Vec::with_capacity(quads * 6);
    for z in 0..grid.height() - 1 {
        for x in 0..grid.width() - 1 {
            for triangle in quad_triangles(grid, x, z) {
                indices.extend(triangle.iter().map(|&i| i as u32));
            }
        }
    }

    MeshData { vertices, indices }
}

/// Recompute every sample normal from the surrounding faces
///
/// Unit face normals are summed per vertex and normalised. A vertex whose
/// sum vanishes keeps the up vector.
pub fn compute_normals(grid: &mut HeightGrid) {
    let mut sums = vec![Vec3::ZERO; grid.len()];

    for z in 0..grid.height() - 1 {
        for x in 0..grid.width() - 1 {
            for [a, b, c] in quad_triangles(grid, x, z) {
                let samples = grid.samples();
                let (pa, pb, pc) = (samples[a].position, samples[b].position, samples[c].position);
                let face = (pb - pa).cross(pc - pa).normalize_or_zero();
                sums[a] += face;
                sums[b] += face;
                sums[c] += face;
            }
        }
    }

    for (sample, sum) in grid.samples_mut().iter_mut().zip(sums) {
        sample.normal = sum.try_normalize().unwrap_or(Vec3::Y);
    }
}
