//! Asset loading: shader source files, built-in shaders, scene configuration.
//!
//! Everything here is read fully into memory before any device object is
//! created, so a missing file aborts startup without touching the device.

pub mod builtin;
pub mod scene;
pub mod shader;

pub use scene::{CameraConfig, ModelConfig, SceneConfig, ShaderPaths, WindowConfig};
pub use shader::{ShaderSource, load_shader_pair};

use std::path::PathBuf;

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scene file {}: {source}", .path.display())]
    Scene {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("scene YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub fn crate_info() -> &'static str {
    "lumen-assets v0.1.0"
}
