//! Shared types for the lumen rendering bootstrap.
//!
//! Nothing here touches a graphics device. Meshes and transforms are plain
//! data that the render crate uploads and binds.

pub mod mesh;
pub mod transform;
pub mod types;

pub use mesh::{Mesh, MeshError, MeshPreset};
pub use transform::{TransformBuilder, TransformSet};
pub use types::ShaderStage;
