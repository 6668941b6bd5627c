//! Shader pairs shipped with the workspace, embedded for tests and tooling.

use crate::ShaderSource;
use lumen_common::ShaderStage;

pub const CUBE_VERTEX: &str = include_str!("../../../shaders/cube.vert.wgsl");
pub const CUBE_FRAGMENT: &str = include_str!("../../../shaders/cube.frag.wgsl");
pub const PASSTHROUGH_VERTEX: &str = include_str!("../../../shaders/passthrough.vert.wgsl");
pub const PASSTHROUGH_FRAGMENT: &str = include_str!("../../../shaders/passthrough.frag.wgsl");

/// Colored, transformed geometry with a time-driven tint.
pub fn cube_pair() -> (ShaderSource, ShaderSource) {
    (
        ShaderSource::new("builtin:cube.vert.wgsl", ShaderStage::Vertex, CUBE_VERTEX),
        ShaderSource::new("builtin:cube.frag.wgsl", ShaderStage::Fragment, CUBE_FRAGMENT),
    )
}

/// Positions straight to clip space, constant color, no uniforms.
pub fn passthrough_pair() -> (ShaderSource, ShaderSource) {
    (
        ShaderSource::new(
            "builtin:passthrough.vert.wgsl",
            ShaderStage::Vertex,
            PASSTHROUGH_VERTEX,
        ),
        ShaderSource::new(
            "builtin:passthrough.frag.wgsl",
            ShaderStage::Fragment,
            PASSTHROUGH_FRAGMENT,
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_carry_their_stage_entry_points() {
        for (vert, frag) in [cube_pair(), passthrough_pair()] {
            assert_eq!(vert.stage(), ShaderStage::Vertex);
            assert!(vert.text().contains("@vertex"));
            assert_eq!(frag.stage(), ShaderStage::Fragment);
            assert!(frag.text().contains("@fragment"));
        }
    }
}
