//! Shader build-and-link pipeline and the per-frame binding protocol.
//!
//! Everything here talks to a [`Device`] through explicit handles. The GPU
//! backend lives in `lumen-render-wgpu`; [`HeadlessDevice`] runs the same
//! protocol without a GPU.
//!
//! # Invariants
//! - A frame is clear, activate, upload, bind, draw, unbind, present. Nothing
//!   is reordered or skipped, and a failing step ends the session.
//! - Shader objects are released on every path: after a successful link, or
//!   by whoever receives a failed compile or link.
//! - A uniform the program does not read is skipped, never an error.
//! - Attribute slots enabled for a draw are disabled again even when the
//!   draw fails.

pub mod bootstrap;
pub mod compiler;
pub mod device;
pub mod frame;
pub mod geometry;
pub mod headless;
pub mod linker;
pub mod program;
pub mod session;
pub mod wgsl;

pub use bootstrap::{StartupError, bootstrap, prepare};
pub use compiler::{CompileError, CompiledShader};
pub use device::{
    ActiveUniform, AttributeTable, BufferId, Device, DeviceError, ProgramId, ShaderId, UniformKind, UniformLocation,
    UniformValue,
};
pub use frame::{FrameError, FrameRenderer, FrameStats, FrameStep};
pub use geometry::{BoundAttributes, GeometryBuffer, GeometryError, VertexAttribute};
pub use headless::{DeviceCall, HeadlessDevice};
pub use linker::{LinkError, LinkFailure};
pub use program::{LinkedProgram, PipelineError, load_program};
pub use session::{FixedTicks, Host, Session, Tick, TickOutcome};

pub fn crate_info() -> &'static str {
    "lumen-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
