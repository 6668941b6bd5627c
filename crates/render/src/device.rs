use crate::geometry::VertexAttribute;
use crate::wgsl::AttributeInput;
use glam::{Mat4, Vec2, Vec3, Vec4};
use lumen_common::ShaderStage;
use std::collections::BTreeMap;
use std::fmt;

/// Device shader object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);

/// Device program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// Device vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl fmt::Display for ShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shader #{}", self.0)
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program #{}", self.0)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer #{}", self.0)
    }
}

/// Where a uniform lives inside a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation {
    pub program: ProgramId,
    pub index: u32,
}

/// Uniform types a program may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformKind {
    /// Size in bytes of the value as uploaded.
    pub fn size(self) -> u64 {
        match self {
            UniformKind::Float => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UniformKind::Float => "f32",
            UniformKind::Vec2 => "vec2<f32>",
            UniformKind::Vec3 => "vec3<f32>",
            UniformKind::Vec4 => "vec4<f32>",
            UniformKind::Mat4 => "mat4x4<f32>",
        })
    }
}

/// A value to upload to a uniform location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    /// Raw bytes as the device expects them, matrices in column-major order.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v).to_vec(),
            UniformValue::Vec2(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            UniformValue::Vec3(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            UniformValue::Vec4(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            UniformValue::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
        }
    }
}

/// A uniform that the linked entry points actually read.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUniform {
    pub name: String,
    pub location: UniformLocation,
    pub kind: UniformKind,
}

/// Device-level failures. None of these are recoverable within a session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("device allocation failed for {what}: {reason}")]
    Allocation { what: &'static str, reason: String },
    #[error("unknown {0}")]
    UnknownShader(ShaderId),
    #[error("unknown {0}")]
    UnknownProgram(ProgramId),
    #[error("unknown {0}")]
    UnknownBuffer(BufferId),
    #[error("{0} has no source text")]
    NoSource(ShaderId),
    #[error("{0} is not linked")]
    ProgramNotLinked(ProgramId),
    #[error("no program is current")]
    NoProgramBound,
    #[error("uniform location belongs to {location}, but the current program is {current:?}")]
    ProgramNotCurrent {
        location: ProgramId,
        current: Option<ProgramId>,
    },
    #[error("{program} has no uniform at index {index}")]
    UnknownUniform { program: ProgramId, index: u32 },
    #[error("uniform `{name}` is declared as {expected}, got {actual}")]
    UniformKind {
        name: String,
        expected: UniformKind,
        actual: UniformKind,
    },
    #[error("vertex attribute slot {slot} is read by the program but not enabled")]
    AttributeNotEnabled { slot: u32 },
    #[error("vertex attribute slot {slot}: {reason}")]
    AttributeLayout { slot: u32, reason: String },
    #[error("{buffer} holds {size} bytes, draw needs {needed}")]
    BufferTooSmall { buffer: BufferId, size: u64, needed: u64 },
    #[error("no frame in progress; clear must come first")]
    NoFrame,
    #[error("surface error: {0}")]
    Surface(String),
}

/// A rasterization device driven through explicit handles.
///
/// Nothing is bound implicitly: every call names the object it acts on, and
/// the frame-time calls (`use_program` .. `present`) are the only ones that
/// touch per-frame state.
pub trait Device {
    fn create_shader(&mut self, stage: ShaderStage, label: &str) -> Result<ShaderId, DeviceError>;
    fn shader_source(&mut self, shader: ShaderId, text: &str) -> Result<(), DeviceError>;
    fn compile_shader(&mut self, shader: ShaderId) -> Result<(), DeviceError>;
    fn compile_status(&self, shader: ShaderId) -> Result<bool, DeviceError>;
    /// Length of the compile log including its terminating NUL; 0 when empty.
    fn shader_info_log_len(&self, shader: ShaderId) -> Result<usize, DeviceError>;
    /// Copy the compile log into `buf`, NUL-terminated. Returns the number of
    /// text bytes written, excluding the NUL.
    fn shader_info_log(&self, shader: ShaderId, buf: &mut [u8]) -> Result<usize, DeviceError>;
    fn delete_shader(&mut self, shader: ShaderId) -> Result<(), DeviceError>;

    fn create_program(&mut self) -> Result<ProgramId, DeviceError>;
    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) -> Result<(), DeviceError>;
    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) -> Result<(), DeviceError>;
    fn link_program(&mut self, program: ProgramId) -> Result<(), DeviceError>;
    fn link_status(&self, program: ProgramId) -> Result<bool, DeviceError>;
    /// Same contract as [`Device::shader_info_log_len`], for the link log.
    fn program_info_log_len(&self, program: ProgramId) -> Result<usize, DeviceError>;
    fn program_info_log(&self, program: ProgramId, buf: &mut [u8]) -> Result<usize, DeviceError>;
    fn active_uniforms(&self, program: ProgramId) -> Result<Vec<ActiveUniform>, DeviceError>;
    fn delete_program(&mut self, program: ProgramId) -> Result<(), DeviceError>;

    /// Upload static vertex data. The buffer is never rewritten.
    fn create_vertex_buffer(&mut self, label: &str, data: &[f32]) -> Result<BufferId, DeviceError>;
    fn delete_buffer(&mut self, buffer: BufferId) -> Result<(), DeviceError>;

    /// Start a frame by resetting color and depth.
    fn clear(&mut self, color: [f32; 4]) -> Result<(), DeviceError>;
    fn use_program(&mut self, program: ProgramId) -> Result<(), DeviceError>;
    /// Upload to a location of the current program.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> Result<(), DeviceError>;
    fn enable_attribute(&mut self, slot: u32) -> Result<(), DeviceError>;
    /// Associate `attribute.slot` with `buffer` and the attribute's layout.
    fn attribute_pointer(&mut self, buffer: BufferId, attribute: &VertexAttribute) -> Result<(), DeviceError>;
    fn disable_attribute(&mut self, slot: u32);
    /// Non-indexed triangle-list draw of `count` vertices starting at `first`.
    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), DeviceError>;
    /// Finish the frame and show it.
    fn present(&mut self) -> Result<(), DeviceError>;
}

/// Info-log length as reported by [`Device::shader_info_log_len`].
pub fn info_log_len(log: &str) -> usize {
    if log.is_empty() { 0 } else { log.len() + 1 }
}

/// Copy `log` into `buf` with a terminating NUL, truncating to fit.
/// Returns the number of text bytes written.
pub fn write_info_log(log: &str, buf: &mut [u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }
    let n = log.len().min(buf.len() - 1);
    buf[..n].copy_from_slice(&log.as_bytes()[..n]);
    buf[n] = 0;
    n
}

/// Fetch an info log of the reported length. The buffer is sized to exactly
/// `len` bytes, which already counts the terminating NUL.
pub(crate) fn read_info_log(
    len: usize,
    fetch: impl FnOnce(&mut [u8]) -> Result<usize, DeviceError>,
) -> Result<String, DeviceError> {
    if len == 0 {
        return Ok(String::new());
    }
    let mut buf = vec![0u8; len];
    let written = fetch(&mut buf)?;
    buf.truncate(written.min(len));
    let text = String::from_utf8_lossy(&buf);
    Ok(text.trim_end_matches('\0').trim_end().to_string())
}

#[derive(Debug, Clone, Default)]
struct AttributeSlot {
    enabled: bool,
    pointer: Option<(BufferId, VertexAttribute)>,
}

/// Per-slot enable flags and buffer associations, as a device tracks them.
#[derive(Debug, Clone, Default)]
pub struct AttributeTable {
    slots: BTreeMap<u32, AttributeSlot>,
}

impl AttributeTable {
    pub fn enable(&mut self, slot: u32) {
        self.slots.entry(slot).or_default().enabled = true;
    }

    pub fn disable(&mut self, slot: u32) {
        if let Some(s) = self.slots.get_mut(&slot) {
            s.enabled = false;
        }
    }

    pub fn point(&mut self, buffer: BufferId, attribute: VertexAttribute) {
        self.slots.entry(attribute.slot).or_default().pointer = Some((buffer, attribute));
    }

    pub fn enabled_slots(&self) -> Vec<u32> {
        self.slots
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(slot, _)| *slot)
            .collect()
    }

    /// The buffer and layout feeding a program input, checked for shape.
    pub fn resolve(&self, input: &AttributeInput) -> Result<(BufferId, VertexAttribute), DeviceError> {
        let slot = input.location;
        let state = self
            .slots
            .get(&slot)
            .filter(|s| s.enabled)
            .ok_or(DeviceError::AttributeNotEnabled { slot })?;
        let (buffer, attribute) = state.pointer.ok_or_else(|| DeviceError::AttributeLayout {
            slot,
            reason: "enabled without a buffer".into(),
        })?;
        if attribute.components != input.components {
            return Err(DeviceError::AttributeLayout {
                slot,
                reason: format!(
                    "buffer supplies {} components, `{}` expects {}",
                    attribute.components, input.name, input.components
                ),
            });
        }
        Ok((buffer, attribute))
    }
}
