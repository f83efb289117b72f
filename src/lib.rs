//! Procedural height-map terrain with carved Voronoi dungeons
//!
//! A standalone library that synthesizes a height-sampled terrain mesh, carves
//! connected rooms and corridors into it, and indexes the result with a
//! quadtree for height and walkability queries. Rendering goes through the
//! [`Device`] and [`RenderContext`] traits, so any graphics backend can host it.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voronoi_dungeon_terrain::*;
//!
//! let mut device = HeadlessDevice::new();
//! let config = TerrainConfigBuilder::new()
//!     .seed(42)
//!     .dimensions(64, 64).unwrap()
//!     .rooms(24, 8).unwrap()
//!     .build().unwrap();
//!
//! let mut terrain = Terrain::with_config(&mut device, config).unwrap();
//! terrain.faulting(&mut device).unwrap();
//! terrain.smoothen_height_map(&mut device, 0.5).unwrap();
//! terrain.voronoi_dungeon(&mut device).unwrap();
//!
//! if let Some(sample) = terrain.height_at(12.5, 30.0) {
//!     println!("height {} walkable {}", sample.height, sample.walkable);
//! }
//! ```
//!
//! # Features
//!
//! - `spatial-index` (default): Enables O(log n) position-to-site lookups using KD-tree
//! - `serde`: Enables serialization support for configuration types

// Modules
pub mod error;
pub mod config;
pub mod grid;
pub mod synthesis;
pub mod generation;
pub mod mesh;
pub mod quadtree;
pub mod terrain;

#[cfg(feature = "spatial-index")]
pub mod spatial;

// Re-export core types for convenience
pub use error::{TerrainError, Result};
pub use config::{TerrainConfig, TerrainConfigBuilder};
pub use grid::{HeightGrid, HeightSample, SiteRef, MAX_TRIANGLES, TEXTURE_REPEAT};
pub use synthesis::{HeightMode, NoiseConfig};
pub use generation::{Corridor, CorridorGraph, DungeonLayout, Region, Site};
pub use mesh::{
    BufferPair, Device, DeviceError, HeadlessBuffer, HeadlessContext, HeadlessDevice, MeshData,
    RenderContext, Vertex,
};
pub use quadtree::{NodeId, QuadTree, SurfaceSample, WALKABLE_THRESHOLD};
pub use terrain::Terrain;

#[cfg(feature = "spatial-index")]
pub use spatial::SiteIndex;

// Re-export glam types used in the public API
pub use glam::{Vec2, Vec3};
