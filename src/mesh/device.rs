//! Device and render-context contracts
//!
//! The terrain never talks to a graphics API directly. It hands vertex and
//! index slices to a [`Device`] and gets back opaque buffers, then submits
//! buffer pairs to a [`RenderContext`]. [`HeadlessDevice`] keeps the uploads
//! in memory.

use thiserror::Error;

use super::Vertex;

/// Buffer allocation failure reported by a device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The device ran out of buffer memory
    #[error("out of buffer memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    /// The device refused the upload for another reason
    #[error("device rejected buffer: {0}")]
    Rejected(String),
}

/// Allocates GPU-side (or stand-in) buffers
pub trait Device {
    /// Opaque buffer handle
    type Buffer;

    /// Upload a vertex buffer
    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> Result<Self::Buffer, DeviceError>;

    /// Upload a 32-bit index buffer
    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Self::Buffer, DeviceError>;
}

/// Accepts indexed draw submissions
pub trait RenderContext<B> {
    fn draw_indexed(&mut self, vertices: &B, indices: &B, index_count: usize);
}

/// A vertex buffer and the index buffer that draws it
#[derive(Debug, Clone, PartialEq)]
pub struct BufferPair<B> {
    pub vertex: B,
    pub index: B,
    pub index_count: usize,
}

impl<B> BufferPair<B> {
    /// Submit the pair to a render context
    pub fn draw<C: RenderContext<B>>(&self, ctx: &mut C) {
        ctx.draw_indexed(&self.vertex, &self.index, self.index_count);
    }
}

/// Upload a vertex/index pair through `device`
///
/// # Errors
///
/// Returns the device's error for whichever allocation failed first; a
/// vertex buffer created before a failing index upload is dropped.
pub fn create_buffers<D: Device>(
    device: &mut D,
    vertices: &[Vertex],
    indices: &[u32],
) -> Result<BufferPair<D::Buffer>, DeviceError> {
    let vertex = device.create_vertex_buffer(vertices)?;
    let index = device.create_index_buffer(indices)?;
    Ok(BufferPair {
        vertex,
        index,
        index_count: indices.len(),
    })
}

/// What a [`HeadlessBuffer`] holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// In-memory buffer created by [`HeadlessDevice`]
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessBuffer {
    pub kind: BufferKind,
    /// Allocation number, starting at 0
    pub id: usize,
    /// Number of vertices or indices uploaded
    pub len: usize,
    /// Raw uploaded bytes
    pub bytes: Vec<u8>,
}

impl HeadlessBuffer {
    /// Read the bytes back as vertices
    ///
    /// Returns `None` for index buffers.
    pub fn vertices(&self) -> Option<Vec<Vertex>> {
        match self.kind {
            BufferKind::Vertex => Some(read_unaligned(&self.bytes)),
            BufferKind::Index => None,
        }
    }

    /// Read the bytes back as indices
    ///
    /// Returns `None` for vertex buffers.
    pub fn indices(&self) -> Option<Vec<u32>> {
        match self.kind {
            BufferKind::Index => Some(read_unaligned(&self.bytes)),
            BufferKind::Vertex => None,
        }
    }
}

// Byte vectors carry no alignment guarantee
fn read_unaligned<T: bytemuck::Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// Device that keeps uploads in host memory
///
/// An optional byte budget makes allocations fail once exhausted, which is
/// how tests exercise the failure paths.
#[derive(Debug, Clone, Default)]
pub struct HeadlessDevice {
    allocations: usize,
    bytes_allocated: usize,
    budget: Option<usize>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device that fails any allocation that would exceed `bytes` in total
    pub fn with_budget(bytes: usize) -> Self {
        Self {
            budget: Some(bytes),
            ..Self::default()
        }
    }

    /// Number of buffers created so far
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Total bytes uploaded so far
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    fn allocate(&mut self, kind: BufferKind, len: usize, bytes: &[u8]) -> Result<HeadlessBuffer, DeviceError> {
        if let Some(budget) = self.budget {
            let available = budget.saturating_sub(self.bytes_allocated);
            if bytes.len() > available {
                return Err(DeviceError::OutOfMemory {
                    requested: bytes.len(),
                    available,
                });
            }
        }

        let id = self.allocations;
        self.allocations += 1;
        self.bytes_allocated += bytes.len();
        Ok(HeadlessBuffer {
            kind,
            id,
            len,
            bytes: bytes.to_vec(),
        })
    }
}

impl Device for HeadlessDevice {
    type Buffer = HeadlessBuffer;

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> Result<HeadlessBuffer, DeviceError> {
        self.allocate(BufferKind::Vertex, vertices.len(), bytemuck::cast_slice(vertices))
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<HeadlessBuffer, DeviceError> {
        self.allocate(BufferKind::Index, indices.len(), bytemuck::cast_slice(indices))
    }
}

/// Render context that records draw calls
#[derive(Debug, Clone, Default)]
pub struct HeadlessContext {
    /// `(vertex buffer id, index buffer id, index count)` per draw
    pub draws: Vec<(usize, usize, usize)>,
}

impl HeadlessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total indices submitted
    pub fn indices_drawn(&self) -> usize {
        self.draws.iter().map(|&(_, _, count)| count).sum()
    }
}

impl RenderContext<HeadlessBuffer> for HeadlessContext {
    fn draw_indexed(&mut self, vertices: &HeadlessBuffer, indices: &HeadlessBuffer, index_count: usize) {
        self.draws.push((vertices.id, indices.id, index_count));
    }
}
