//! A device without a GPU.
//!
//! Shaders go through the same WGSL front end as the GPU backend, so compile
//! and link diagnostics are real. Everything else is bookkeeping: each call is
//! recorded and checked against the state a GPU driver would hold, which makes
//! this the device used by the test suite and by `lumen-cli render`.

use crate::device::{
    ActiveUniform, AttributeTable, BufferId, Device, DeviceError, ProgramId, ShaderId, UniformLocation, UniformValue,
    info_log_len, write_info_log,
};
use crate::geometry::VertexAttribute;
use crate::wgsl::{self, CompiledModule, ProgramInterface};
use lumen_common::ShaderStage;
use std::collections::BTreeMap;

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateShader { shader: ShaderId, stage: ShaderStage },
    ShaderSource { shader: ShaderId },
    CompileShader { shader: ShaderId, ok: bool },
    DeleteShader { shader: ShaderId },
    CreateProgram { program: ProgramId },
    AttachShader { program: ProgramId, shader: ShaderId },
    DetachShader { program: ProgramId, shader: ShaderId },
    LinkProgram { program: ProgramId, ok: bool },
    DeleteProgram { program: ProgramId },
    CreateBuffer { buffer: BufferId, floats: usize },
    DeleteBuffer { buffer: BufferId },
    Clear { color: [f32; 4] },
    UseProgram { program: ProgramId },
    SetUniform { location: UniformLocation, value: UniformValue },
    EnableAttribute { slot: u32 },
    AttributePointer { slot: u32, buffer: BufferId },
    DisableAttribute { slot: u32 },
    DrawArrays { first: u32, count: u32 },
    Present,
}

#[derive(Debug)]
struct ShaderObject {
    stage: ShaderStage,
    label: String,
    source: Option<String>,
    module: Option<CompiledModule>,
    log: String,
}

#[derive(Debug, Default)]
struct ProgramObject {
    attached: Vec<ShaderId>,
    interface: Option<ProgramInterface>,
    linked: bool,
    log: String,
}

#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: u32,
    shaders: BTreeMap<ShaderId, ShaderObject>,
    programs: BTreeMap<ProgramId, ProgramObject>,
    buffers: BTreeMap<BufferId, u64>,
    attributes: AttributeTable,
    current: Option<ProgramId>,
    uniforms: BTreeMap<UniformLocation, UniformValue>,
    frame_open: bool,
    presented: u64,
    buffer_limit: Option<usize>,
    calls: Vec<DeviceCall>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail vertex buffer creation once `limit` buffers are live.
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = Some(limit);
        self
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.calls)
    }

    /// `(first, count)` of every draw so far.
    pub fn draw_calls(&self) -> Vec<(u32, u32)> {
        self.calls
            .iter()
            .filter_map(|c| match *c {
                DeviceCall::DrawArrays { first, count } => Some((first, count)),
                _ => None,
            })
            .collect()
    }

    /// Frames presented so far.
    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn enabled_attributes(&self) -> Vec<u32> {
        self.attributes.enabled_slots()
    }

    /// Last value uploaded to a location.
    pub fn uniform_value(&self, location: UniformLocation) -> Option<UniformValue> {
        self.uniforms.get(&location).copied()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.current
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn shader(&self, id: ShaderId) -> Result<&ShaderObject, DeviceError> {
        self.shaders.get(&id).ok_or(DeviceError::UnknownShader(id))
    }

    fn shader_mut(&mut self, id: ShaderId) -> Result<&mut ShaderObject, DeviceError> {
        self.shaders.get_mut(&id).ok_or(DeviceError::UnknownShader(id))
    }

    fn program(&self, id: ProgramId) -> Result<&ProgramObject, DeviceError> {
        self.programs.get(&id).ok_or(DeviceError::UnknownProgram(id))
    }

    fn program_mut(&mut self, id: ProgramId) -> Result<&mut ProgramObject, DeviceError> {
        self.programs.get_mut(&id).ok_or(DeviceError::UnknownProgram(id))
    }

    fn linked_interface(&self, id: ProgramId) -> Result<&ProgramInterface, DeviceError> {
        self.program(id)?
            .interface
            .as_ref()
            .ok_or(DeviceError::ProgramNotLinked(id))
    }

    /// Pick the single vertex and fragment module attached to a program.
    fn link_modules(&self, program: &ProgramObject) -> Result<(&CompiledModule, &CompiledModule), String> {
        let mut vertex = Vec::new();
        let mut fragment = Vec::new();
        for id in &program.attached {
            let Some(shader) = self.shaders.get(id) else {
                return Err(format!("error: attached {id} no longer exists"));
            };
            let Some(module) = shader.module.as_ref() else {
                return Err(format!("error: {} ({id}) has not been compiled successfully", shader.label));
            };
            match module.stage {
                ShaderStage::Vertex => vertex.push(module),
                ShaderStage::Fragment => fragment.push(module),
            }
        }
        match (vertex.as_slice(), fragment.as_slice()) {
            ([v], [f]) => Ok((v, f)),
            _ => Err(format!(
                "error: a program needs exactly one vertex and one fragment shader, found {} and {}",
                vertex.len(),
                fragment.len()
            )),
        }
    }
}

impl Device for HeadlessDevice {
    fn create_shader(&mut self, stage: ShaderStage, label: &str) -> Result<ShaderId, DeviceError> {
        let shader = ShaderId(self.next());
        self.shaders.insert(
            shader,
            ShaderObject {
                stage,
                label: label.to_string(),
                source: None,
                module: None,
                log: String::new(),
            },
        );
        self.calls.push(DeviceCall::CreateShader { shader, stage });
        Ok(shader)
    }

    fn shader_source(&mut self, shader: ShaderId, text: &str) -> Result<(), DeviceError> {
        self.shader_mut(shader)?.source = Some(text.to_string());
        self.calls.push(DeviceCall::ShaderSource { shader });
        Ok(())
    }

    fn compile_shader(&mut self, shader: ShaderId) -> Result<(), DeviceError> {
        let object = self.shader_mut(shader)?;
        let text = object.source.as_deref().ok_or(DeviceError::NoSource(shader))?;
        let result = wgsl::compile(&object.label, object.stage, text);
        let ok = result.is_ok();
        match result {
            Ok(module) => {
                object.module = Some(module);
                object.log.clear();
            }
            Err(log) => {
                object.module = None;
                object.log = log;
            }
        }
        self.calls.push(DeviceCall::CompileShader { shader, ok });
        Ok(())
    }

    fn compile_status(&self, shader: ShaderId) -> Result<bool, DeviceError> {
        Ok(self.shader(shader)?.module.is_some())
    }

    fn shader_info_log_len(&self, shader: ShaderId) -> Result<usize, DeviceError> {
        Ok(info_log_len(&self.shader(shader)?.log))
    }

    fn shader_info_log(&self, shader: ShaderId, buf: &mut [u8]) -> Result<usize, DeviceError> {
        Ok(write_info_log(&self.shader(shader)?.log, buf))
    }

    fn delete_shader(&mut self, shader: ShaderId) -> Result<(), DeviceError> {
        self.shaders.remove(&shader).ok_or(DeviceError::UnknownShader(shader))?;
        self.calls.push(DeviceCall::DeleteShader { shader });
        Ok(())
    }

    fn create_program(&mut self) -> Result<ProgramId, DeviceError> {
        let program = ProgramId(self.next());
        self.programs.insert(program, ProgramObject::default());
        self.calls.push(DeviceCall::CreateProgram { program });
        Ok(program)
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) -> Result<(), DeviceError> {
        self.shader(shader)?;
        let object = self.program_mut(program)?;
        if !object.attached.contains(&shader) {
            object.attached.push(shader);
        }
        self.calls.push(DeviceCall::AttachShader { program, shader });
        Ok(())
    }

    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) -> Result<(), DeviceError> {
        self.program_mut(program)?.attached.retain(|s| *s != shader);
        self.calls.push(DeviceCall::DetachShader { program, shader });
        Ok(())
    }

    fn link_program(&mut self, program: ProgramId) -> Result<(), DeviceError> {
        let result = self
            .link_modules(self.program(program)?)
            .and_then(|(v, f)| wgsl::link(v, f));
        let ok = result.is_ok();
        let object = self.program_mut(program)?;
        match result {
            Ok(interface) => {
                object.interface = Some(interface);
                object.linked = true;
                object.log.clear();
            }
            Err(log) => {
                object.interface = None;
                object.linked = false;
                object.log = log;
            }
        }
        self.calls.push(DeviceCall::LinkProgram { program, ok });
        Ok(())
    }

    fn link_status(&self, program: ProgramId) -> Result<bool, DeviceError> {
        Ok(self.program(program)?.linked)
    }

    fn program_info_log_len(&self, program: ProgramId) -> Result<usize, DeviceError> {
        Ok(info_log_len(&self.program(program)?.log))
    }

    fn program_info_log(&self, program: ProgramId, buf: &mut [u8]) -> Result<usize, DeviceError> {
        Ok(write_info_log(&self.program(program)?.log, buf))
    }

    fn active_uniforms(&self, program: ProgramId) -> Result<Vec<ActiveUniform>, DeviceError> {
        Ok(self.linked_interface(program)?.active_uniforms(program))
    }

    fn delete_program(&mut self, program: ProgramId) -> Result<(), DeviceError> {
        self.programs.remove(&program).ok_or(DeviceError::UnknownProgram(program))?;
        if self.current == Some(program) {
            self.current = None;
        }
        self.uniforms.retain(|loc, _| loc.program != program);
        self.calls.push(DeviceCall::DeleteProgram { program });
        Ok(())
    }

    fn create_vertex_buffer(&mut self, label: &str, data: &[f32]) -> Result<BufferId, DeviceError> {
        if let Some(limit) = self.buffer_limit {
            if self.buffers.len() >= limit {
                return Err(DeviceError::Allocation {
                    what: "vertex buffer",
                    reason: format!("{label}: limit of {limit} live buffers reached"),
                });
            }
        }
        let buffer = BufferId(self.next());
        self.buffers.insert(buffer, std::mem::size_of_val(data) as u64);
        self.calls.push(DeviceCall::CreateBuffer {
            buffer,
            floats: data.len(),
        });
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferId) -> Result<(), DeviceError> {
        self.buffers.remove(&buffer).ok_or(DeviceError::UnknownBuffer(buffer))?;
        self.calls.push(DeviceCall::DeleteBuffer { buffer });
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) -> Result<(), DeviceError> {
        self.frame_open = true;
        self.calls.push(DeviceCall::Clear { color });
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), DeviceError> {
        self.linked_interface(program)?;
        self.current = Some(program);
        self.calls.push(DeviceCall::UseProgram { program });
        Ok(())
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> Result<(), DeviceError> {
        let current = self.current.ok_or(DeviceError::NoProgramBound)?;
        if location.program != current {
            return Err(DeviceError::ProgramNotCurrent {
                location: location.program,
                current: Some(current),
            });
        }
        let uniform = self
            .linked_interface(current)?
            .uniforms
            .get(location.index as usize)
            .ok_or(DeviceError::UnknownUniform {
                program: current,
                index: location.index,
            })?;
        if uniform.kind != value.kind() {
            return Err(DeviceError::UniformKind {
                name: uniform.name.clone(),
                expected: uniform.kind,
                actual: value.kind(),
            });
        }
        self.uniforms.insert(location, value);
        self.calls.push(DeviceCall::SetUniform { location, value });
        Ok(())
    }

    fn enable_attribute(&mut self, slot: u32) -> Result<(), DeviceError> {
        self.attributes.enable(slot);
        self.calls.push(DeviceCall::EnableAttribute { slot });
        Ok(())
    }

    fn attribute_pointer(&mut self, buffer: BufferId, attribute: &VertexAttribute) -> Result<(), DeviceError> {
        if !self.buffers.contains_key(&buffer) {
            return Err(DeviceError::UnknownBuffer(buffer));
        }
        self.attributes.point(buffer, *attribute);
        self.calls.push(DeviceCall::AttributePointer {
            slot: attribute.slot,
            buffer,
        });
        Ok(())
    }

    fn disable_attribute(&mut self, slot: u32) {
        self.attributes.disable(slot);
        self.calls.push(DeviceCall::DisableAttribute { slot });
    }

    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), DeviceError> {
        if !self.frame_open {
            return Err(DeviceError::NoFrame);
        }
        let current = self.current.ok_or(DeviceError::NoProgramBound)?;
        let end = first.checked_add(count).ok_or_else(|| DeviceError::AttributeLayout {
            slot: 0,
            reason: format!("draw range {first}+{count} overflows"),
        })?;
        for input in &self.linked_interface(current)?.attributes {
            let (buffer, attribute) = self.attributes.resolve(input)?;
            let size = *self.buffers.get(&buffer).ok_or(DeviceError::UnknownBuffer(buffer))?;
            let needed = attribute.required_bytes(end).ok_or_else(|| DeviceError::AttributeLayout {
                slot: attribute.slot,
                reason: format!("offset {} and stride {} overflow", attribute.offset, attribute.stride),
            })?;
            if size < needed {
                return Err(DeviceError::BufferTooSmall { buffer, size, needed });
            }
        }
        self.calls.push(DeviceCall::DrawArrays { first, count });
        Ok(())
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        if !self.frame_open {
            return Err(DeviceError::NoFrame);
        }
        self.frame_open = false;
        self.presented += 1;
        self.calls.push(DeviceCall::Present);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_assets::builtin;

    fn compiled(device: &mut HeadlessDevice, stage: ShaderStage, text: &str) -> ShaderId {
        let id = device.create_shader(stage, "test").unwrap();
        device.shader_source(id, text).unwrap();
        device.compile_shader(id).unwrap();
        id
    }

    #[test]
    fn compile_without_source_is_an_error() {
        let mut device = HeadlessDevice::new();
        let id = device.create_shader(ShaderStage::Vertex, "empty").unwrap();
        assert_eq!(device.compile_shader(id), Err(DeviceError::NoSource(id)));
    }

    #[test]
    fn failed_compile_reports_status_and_log() {
        let mut device = HeadlessDevice::new();
        let id = compiled(&mut device, ShaderStage::Fragment, "fn broken( {");
        assert!(!device.compile_status(id).unwrap());
        let len = device.shader_info_log_len(id).unwrap();
        assert!(len > 1);
        let mut buf = vec![0u8; len];
        let written = device.shader_info_log(id, &mut buf).unwrap();
        assert_eq!(written, len - 1);
        assert_eq!(buf[len - 1], 0);
    }

    #[test]
    fn link_requires_both_stages() {
        let mut device = HeadlessDevice::new();
        let v = compiled(&mut device, ShaderStage::Vertex, builtin::PASSTHROUGH_VERTEX);
        let p = device.create_program().unwrap();
        device.attach_shader(p, v).unwrap();
        device.link_program(p).unwrap();
        assert!(!device.link_status(p).unwrap());
        assert!(device.program_info_log_len(p).unwrap() > 0);
        assert!(matches!(device.use_program(p), Err(DeviceError::ProgramNotLinked(_))));
    }

    #[test]
    fn set_uniform_checks_current_program_and_kind() {
        let mut device = HeadlessDevice::new();
        let v = compiled(&mut device, ShaderStage::Vertex, builtin::CUBE_VERTEX);
        let f = compiled(&mut device, ShaderStage::Fragment, builtin::CUBE_FRAGMENT);
        let p = device.create_program().unwrap();
        device.attach_shader(p, v).unwrap();
        device.attach_shader(p, f).unwrap();
        device.link_program(p).unwrap();
        assert!(device.link_status(p).unwrap());

        let uniforms = device.active_uniforms(p).unwrap();
        let angle = uniforms.iter().find(|u| u.name == "angle").unwrap().location;
        assert_eq!(
            device.set_uniform(angle, UniformValue::Float(1.0)),
            Err(DeviceError::NoProgramBound)
        );

        device.use_program(p).unwrap();
        assert!(matches!(
            device.set_uniform(angle, UniformValue::Mat4(glam::Mat4::IDENTITY)),
            Err(DeviceError::UniformKind { .. })
        ));
        device.set_uniform(angle, UniformValue::Float(1.0)).unwrap();
        assert_eq!(device.uniform_value(angle), Some(UniformValue::Float(1.0)));

        let stale = UniformLocation {
            program: ProgramId(999),
            index: 0,
        };
        assert!(matches!(
            device.set_uniform(stale, UniformValue::Float(0.0)),
            Err(DeviceError::ProgramNotCurrent { .. })
        ));
    }

    #[test]
    fn draw_outside_a_frame_is_rejected() {
        let mut device = HeadlessDevice::new();
        assert_eq!(device.draw_arrays(0, 3), Err(DeviceError::NoFrame));
        assert_eq!(device.present(), Err(DeviceError::NoFrame));
    }

    #[test]
    fn draw_checks_buffer_size() {
        let mut device = HeadlessDevice::new();
        let v = compiled(&mut device, ShaderStage::Vertex, builtin::PASSTHROUGH_VERTEX);
        let f = compiled(&mut device, ShaderStage::Fragment, builtin::PASSTHROUGH_FRAGMENT);
        let p = device.create_program().unwrap();
        device.attach_shader(p, v).unwrap();
        device.attach_shader(p, f).unwrap();
        device.link_program(p).unwrap();

        let buffer = device.create_vertex_buffer("tri", &[0.0; 9]).unwrap();
        device.clear([0.0; 4]).unwrap();
        device.use_program(p).unwrap();
        assert_eq!(
            device.draw_arrays(0, 3),
            Err(DeviceError::AttributeNotEnabled { slot: 0 })
        );
        device.enable_attribute(0).unwrap();
        device
            .attribute_pointer(buffer, &VertexAttribute::float32(0, 3))
            .unwrap();
        device.draw_arrays(0, 3).unwrap();
        assert!(matches!(
            device.draw_arrays(0, 4),
            Err(DeviceError::BufferTooSmall { needed: 48, .. })
        ));
        device.present().unwrap();
        assert_eq!(device.draw_calls(), vec![(0, 3)]);
        assert_eq!(device.presented(), 1);
    }

    #[test]
    fn draw_rejects_overflowing_layout() {
        let mut device = HeadlessDevice::new();
        let v = compiled(&mut device, ShaderStage::Vertex, builtin::PASSTHROUGH_VERTEX);
        let f = compiled(&mut device, ShaderStage::Fragment, builtin::PASSTHROUGH_FRAGMENT);
        let p = device.create_program().unwrap();
        device.attach_shader(p, v).unwrap();
        device.attach_shader(p, f).unwrap();
        device.link_program(p).unwrap();

        let buffer = device.create_vertex_buffer("tri", &[0.0; 9]).unwrap();
        device.clear([0.0; 4]).unwrap();
        device.use_program(p).unwrap();
        device.enable_attribute(0).unwrap();
        device
            .attribute_pointer(buffer, &VertexAttribute::float32(0, 3).with_offset(u64::MAX))
            .unwrap();
        assert!(matches!(
            device.draw_arrays(0, 3),
            Err(DeviceError::AttributeLayout { slot: 0, .. })
        ));
        assert!(device.draw_calls().is_empty());
    }

    #[test]
    fn buffer_limit_fails_allocation() {
        let mut device = HeadlessDevice::new().with_buffer_limit(0);
        assert!(matches!(
            device.create_vertex_buffer("x", &[0.0]),
            Err(DeviceError::Allocation { .. })
        ));
    }
}
