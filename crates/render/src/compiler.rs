use crate::device::{Device, ShaderId, read_info_log};
use crate::program::PipelineError;
use lumen_assets::ShaderSource;
use lumen_common::ShaderStage;

/// A shader unit that failed to compile, with the device's full diagnostic log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to compile {path} ({stage} stage):\n{log}")]
pub struct CompileError {
    pub path: String,
    pub stage: ShaderStage,
    pub log: String,
}

/// A successfully compiled shader object, owned by whoever holds it until it
/// is linked or released.
#[derive(Debug, PartialEq, Eq)]
pub struct CompiledShader {
    id: ShaderId,
    stage: ShaderStage,
    name: String,
}

impl CompiledShader {
    pub fn id(&self) -> ShaderId {
        self.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Path or logical name of the source it was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delete the shader object without linking it.
    pub fn release<D: Device + ?Sized>(self, device: &mut D) -> Result<(), PipelineError> {
        device.delete_shader(self.id)?;
        Ok(())
    }
}

/// Compile one shader unit.
///
/// On failure the shader object is deleted and the error carries the complete
/// log. A device that reports failure without any log still yields a
/// non-empty message.
pub fn compile<D: Device + ?Sized>(device: &mut D, source: &ShaderSource) -> Result<CompiledShader, PipelineError> {
    tracing::info!("compiling shader: {}", source.name());

    let id = device.create_shader(source.stage(), source.name())?;
    let compiled = device
        .shader_source(id, source.text())
        .and_then(|()| device.compile_shader(id))
        .and_then(|()| device.compile_status(id));

    let failure = match compiled {
        Ok(true) => {
            tracing::debug!(shader = %id, stage = %source.stage(), "compiled {}", source.name());
            return Ok(CompiledShader {
                id,
                stage: source.stage(),
                name: source.name().to_string(),
            });
        }
        Ok(false) => {
            let log = device
                .shader_info_log_len(id)
                .and_then(|len| read_info_log(len, |buf| device.shader_info_log(id, buf)));
            match log {
                Ok(log) if !log.is_empty() => PipelineError::Compile(CompileError {
                    path: source.name().to_string(),
                    stage: source.stage(),
                    log,
                }),
                Ok(_) => PipelineError::Compile(CompileError {
                    path: source.name().to_string(),
                    stage: source.stage(),
                    log: "compilation failed without a diagnostic log".into(),
                }),
                Err(e) => e.into(),
            }
        }
        Err(e) => e.into(),
    };

    if let Err(e) = device.delete_shader(id) {
        tracing::warn!("failed to delete {id} after compile failure: {e}");
    }
    Err(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{DeviceCall, HeadlessDevice};
    use lumen_assets::builtin;

    #[test]
    fn valid_shader_compiles() {
        let mut device = HeadlessDevice::new();
        let (vert, _) = builtin::cube_pair();
        let shader = compile(&mut device, &vert).unwrap();
        assert_eq!(shader.stage(), ShaderStage::Vertex);
        assert_eq!(shader.name(), "builtin:cube.vert.wgsl");
        assert_eq!(device.live_shaders(), 1);

        shader.release(&mut device).unwrap();
        assert_eq!(device.live_shaders(), 0);
    }

    #[test]
    fn syntax_error_carries_complete_log() {
        let mut device = HeadlessDevice::new();
        let src = ShaderSource::new(
            "shaders/bad.frag.wgsl",
            ShaderStage::Fragment,
            "@fragment\nfn fs_main() -> @location(0) vec4<f32> {\n    return vec4<f32>(1.0)\n}\n",
        );
        let err = compile(&mut device, &src).unwrap_err();
        let PipelineError::Compile(err) = err else {
            panic!("expected a compile error, got {err}");
        };
        assert_eq!(err.path, "shaders/bad.frag.wgsl");
        assert_eq!(err.stage, ShaderStage::Fragment);
        assert!(!err.log.is_empty());
        // The log names the file and ends with its source excerpt, not cut short.
        assert!(err.log.contains("shaders/bad.frag.wgsl"));
        assert!(!err.log.ends_with('\0'));

        assert_eq!(device.live_shaders(), 0);
        assert!(device.calls().contains(&DeviceCall::CompileShader {
            shader: ShaderId(1),
            ok: false
        }));
    }

    #[test]
    fn wrong_stage_source_fails() {
        let mut device = HeadlessDevice::new();
        let src = ShaderSource::new("frag.wgsl", ShaderStage::Vertex, builtin::PASSTHROUGH_FRAGMENT);
        let err = compile(&mut device, &src).unwrap_err();
        assert!(err.to_string().contains("vertex stage"));
    }
}
