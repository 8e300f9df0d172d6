//! terrafx
//!
//! Effect compilation and procedural terrain for scene-graph renderers.
//! Declarative effect descriptions are merged, compiled into techniques and
//! passes and cached so that every distinct program, uniform and effect is
//! built once. Terrain tiles are meshed from elevation and landclass layers,
//! clipped against constraint geometry, overlaid with vector features and
//! populated with scattered vegetation, buildings, lights and objects.
//!
//! High-level modules
//! - `config`: engine, terrain and scatter settings
//! - `context`: renderer state owning the caches, backend and effect library
//! - `data_structures`: configuration trees, live properties, textures, instances
//! - `effect`: merging, compiling and selecting techniques of effects
//! - `error`: build errors and diagnostics
//! - `resources`: shader, program, uniform and texture caches plus the backend seam
//! - `terrain`: tile meshing, constraints, features and materials
//! - `scatter`: procedural placement and the spatial index of its output
//! - `render`: render composition and pass batching by render bin
//!

pub mod config;
pub mod context;
pub mod data_structures;
pub mod effect;
pub mod error;
pub mod render;
pub mod resources;
pub mod scatter;
pub mod terrain;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use context::Context;
pub use error::{BuildDiagnostic, BuildError};
