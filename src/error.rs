//! Error types for terrain and dungeon generation

use thiserror::Error;

use crate::mesh::DeviceError;

/// Errors that can occur during terrain generation or buffer creation
///
/// Query misses are not errors: [`Terrain::height_at`](crate::Terrain::height_at)
/// returns `None` when no terrain lies under a point.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// Configuration validation failed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Grid dimensions cannot form a triangle mesh
    #[error("invalid dimensions {width}x{height}: both axes need at least 2 samples")]
    InvalidDimensions { width: usize, height: usize },

    /// Grid would produce more triangles than the hard cap allows
    #[error("{width}x{height} grid needs {triangles} triangles (max {max})")]
    TriangleBudgetExceeded {
        width: usize,
        height: usize,
        triangles: usize,
        max: usize,
    },

    /// A generation parameter is out of range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Not enough rooms to triangulate or connect
    #[error("degenerate layout: {0}")]
    DegenerateLayout(String),

    /// Random site scatter ran out of attempts
    #[error("site placement exhausted after {attempts} attempts ({placed} of {requested} placed)")]
    SitePlacementExhausted {
        requested: usize,
        placed: usize,
        attempts: usize,
    },

    /// The device failed to allocate a vertex or index buffer
    #[error("buffer allocation failed: {0}")]
    BufferAllocation(#[from] DeviceError),

    /// The terrain was shut down and has no grid to regenerate
    #[error("terrain is not initialized")]
    NotInitialized,
}

/// Result type alias for terrain operations
pub type Result<T> = std::result::Result<T, TerrainError>;
