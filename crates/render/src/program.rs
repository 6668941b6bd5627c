use crate::compiler::{self, CompileError};
use crate::device::{ActiveUniform, Device, DeviceError, ProgramId, UniformLocation};
use crate::linker::{self, LinkError};
use lumen_assets::ShaderSource;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// A linked program and the uniforms its entry points read.
#[derive(Debug)]
pub struct LinkedProgram {
    id: ProgramId,
    uniforms: BTreeMap<String, ActiveUniform>,
}

impl LinkedProgram {
    pub(crate) fn new(id: ProgramId, uniforms: Vec<ActiveUniform>) -> Self {
        Self {
            id,
            uniforms: uniforms.into_iter().map(|u| (u.name.clone(), u)).collect(),
        }
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Location of a uniform, or `None` when the program does not read it.
    /// Uploads to an absent uniform are simply skipped.
    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).map(|u| u.location)
    }

    /// Active uniforms in name order.
    pub fn active_uniforms(&self) -> impl Iterator<Item = &ActiveUniform> {
        self.uniforms.values()
    }

    pub fn release<D: Device + ?Sized>(self, device: &mut D) -> Result<(), DeviceError> {
        device.delete_program(self.id)
    }
}

/// Compile both stages and link them. Whatever fails, no shader object is
/// left behind on the device.
pub fn load_program<D: Device + ?Sized>(
    device: &mut D,
    vertex: &ShaderSource,
    fragment: &ShaderSource,
) -> Result<LinkedProgram, PipelineError> {
    let vs = compiler::compile(device, vertex)?;
    let fs = match compiler::compile(device, fragment) {
        Ok(fs) => fs,
        Err(e) => {
            if let Err(release) = vs.release(device) {
                tracing::warn!("failed to delete vertex shader: {release}");
            }
            return Err(e);
        }
    };
    linker::link(device, vs, fs).map_err(|failure| failure.release(device))
}
