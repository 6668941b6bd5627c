use crate::compiler::CompiledShader;
use crate::device::{Device, DeviceError, read_info_log};
use crate::program::{LinkedProgram, PipelineError};
use lumen_common::ShaderStage;

/// Two compiled units that did not form a program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to link shaders:\n{log}")]
pub struct LinkError {
    pub log: String,
}

/// A failed link. The shaders were not consumed and come back to the caller,
/// who decides whether to retry or release them.
#[derive(Debug)]
pub struct LinkFailure {
    pub cause: PipelineError,
    pub vertex: CompiledShader,
    pub fragment: CompiledShader,
}

impl LinkFailure {
    /// Delete both shaders and hand back the cause.
    pub fn release<D: Device + ?Sized>(self, device: &mut D) -> PipelineError {
        for shader in [self.vertex, self.fragment] {
            let id = shader.id();
            if let Err(e) = shader.release(device) {
                tracing::warn!("failed to delete {id}: {e}");
            }
        }
        self.cause
    }
}

/// Link a vertex and a fragment shader into one program.
///
/// On success both shader objects are detached and deleted; the program
/// keeps working without them.
pub fn link<D: Device + ?Sized>(
    device: &mut D,
    vertex: CompiledShader,
    fragment: CompiledShader,
) -> Result<LinkedProgram, LinkFailure> {
    if vertex.stage() != ShaderStage::Vertex || fragment.stage() != ShaderStage::Fragment {
        let log = format!(
            "expected a vertex and a fragment shader, got {} ({}) and {} ({})",
            vertex.name(),
            vertex.stage(),
            fragment.name(),
            fragment.stage()
        );
        return Err(LinkFailure {
            cause: PipelineError::Link(LinkError { log }),
            vertex,
            fragment,
        });
    }

    tracing::info!("linking program");
    match link_objects(device, &vertex, &fragment) {
        Ok(program) => {
            for shader in [vertex, fragment] {
                let id = shader.id();
                if let Err(e) = device.detach_shader(program.id(), id) {
                    tracing::warn!("failed to detach {id}: {e}");
                }
                if let Err(e) = shader.release(device) {
                    tracing::warn!("failed to delete {id}: {e}");
                }
            }
            Ok(program)
        }
        Err(cause) => Err(LinkFailure {
            cause,
            vertex,
            fragment,
        }),
    }
}

fn link_objects<D: Device + ?Sized>(
    device: &mut D,
    vertex: &CompiledShader,
    fragment: &CompiledShader,
) -> Result<LinkedProgram, PipelineError> {
    let program = device.create_program()?;
    let linked = (|| -> Result<bool, DeviceError> {
        device.attach_shader(program, vertex.id())?;
        device.attach_shader(program, fragment.id())?;
        device.link_program(program)?;
        device.link_status(program)
    })();

    let failure = match linked {
        Ok(true) => match device.active_uniforms(program) {
            Ok(uniforms) => {
                tracing::debug!(%program, uniforms = uniforms.len(), "linked program");
                return Ok(LinkedProgram::new(program, uniforms));
            }
            Err(e) => e.into(),
        },
        Ok(false) => {
            let log = device
                .program_info_log_len(program)
                .and_then(|len| read_info_log(len, |buf| device.program_info_log(program, buf)));
            match log {
                Ok(log) if !log.is_empty() => PipelineError::Link(LinkError { log }),
                Ok(_) => PipelineError::Link(LinkError {
                    log: "link failed without a diagnostic log".into(),
                }),
                Err(e) => e.into(),
            }
        }
        Err(e) => e.into(),
    };

    if let Err(e) = device.delete_program(program) {
        tracing::warn!("failed to delete {program} after link failure: {e}");
    }
    Err(failure)
}
