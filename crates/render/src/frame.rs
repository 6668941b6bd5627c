use crate::device::{Device, DeviceError, UniformValue};
use crate::geometry::GeometryBuffer;
use crate::program::LinkedProgram;
use lumen_common::TransformSet;
use std::fmt;

pub const MODEL_UNIFORM: &str = "model";
pub const VIEW_UNIFORM: &str = "view";
pub const PROJECTION_UNIFORM: &str = "projection";
pub const MVP_UNIFORM: &str = "mvp";
/// Seconds since the session started, as `f32`.
pub const TIME_UNIFORM: &str = "angle";

/// The steps of one frame, in execution order.
///
/// Attribute slots are disabled between `Draw` and `Present`; that cannot
/// fail, so it has no step of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    Clear,
    ActivateProgram,
    UploadUniforms,
    BindAttributes,
    Draw,
    Present,
}

impl fmt::Display for FrameStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FrameStep::Clear => "clear",
            FrameStep::ActivateProgram => "activate program",
            FrameStep::UploadUniforms => "upload uniforms",
            FrameStep::BindAttributes => "bind attributes",
            FrameStep::Draw => "draw",
            FrameStep::Present => "present",
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("frame step `{step}` failed: {source}")]
pub struct FrameError {
    pub step: FrameStep,
    #[source]
    pub source: DeviceError,
}

fn at(step: FrameStep) -> impl FnOnce(DeviceError) -> FrameError {
    move |source| FrameError { step, source }
}

/// What one presented frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub frame_index: u64,
    pub vertices: u32,
    pub uniforms_uploaded: u32,
    pub attributes_bound: u32,
}

/// Owns the linked program and the uploaded geometry for the session and
/// turns every tick into one presented frame.
#[derive(Debug)]
pub struct FrameRenderer {
    program: LinkedProgram,
    geometry: GeometryBuffer,
    transforms: TransformSet,
    clear_color: [f32; 4],
    frame_index: u64,
}

impl FrameRenderer {
    pub fn new(program: LinkedProgram, geometry: GeometryBuffer, transforms: TransformSet) -> Self {
        Self {
            program,
            geometry,
            transforms,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            frame_index: 0,
        }
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn program(&self) -> &LinkedProgram {
        &self.program
    }

    pub fn geometry(&self) -> &GeometryBuffer {
        &self.geometry
    }

    pub fn transforms(&self) -> &TransformSet {
        &self.transforms
    }

    /// Replace the matrices uploaded from the next tick on, e.g. after the
    /// surface changed aspect ratio.
    pub fn set_transforms(&mut self, transforms: TransformSet) {
        self.transforms = transforms;
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Frames presented so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Every uniform the renderer can supply, by name, for time `time`.
    pub fn uniform_values(&self, time: f64) -> [(&'static str, UniformValue); 5] {
        let t = &self.transforms;
        [
            (MODEL_UNIFORM, UniformValue::Mat4(t.model)),
            (VIEW_UNIFORM, UniformValue::Mat4(t.view)),
            (PROJECTION_UNIFORM, UniformValue::Mat4(t.projection)),
            (MVP_UNIFORM, UniformValue::Mat4(t.mvp())),
            (TIME_UNIFORM, UniformValue::Float(time as f32)),
        ]
    }

    /// Render and present one frame.
    pub fn tick<D: Device + ?Sized>(&mut self, device: &mut D, time: f64) -> Result<FrameStats, FrameError> {
        device.clear(self.clear_color).map_err(at(FrameStep::Clear))?;
        device
            .use_program(self.program.id())
            .map_err(at(FrameStep::ActivateProgram))?;

        let mut uploaded = 0;
        for (name, value) in self.uniform_values(time) {
            match self.program.uniform(name) {
                Some(location) => {
                    device
                        .set_uniform(location, value)
                        .map_err(at(FrameStep::UploadUniforms))?;
                    uploaded += 1;
                }
                None => tracing::trace!("program does not read `{name}`, skipping"),
            }
        }

        let vertices = self.geometry.vertex_count();
        let attributes_bound = {
            let mut bound = self
                .geometry
                .bind_all(device)
                .map_err(at(FrameStep::BindAttributes))?;
            bound
                .device()
                .draw_arrays(0, vertices)
                .map_err(at(FrameStep::Draw))?;
            bound.slots().len() as u32
        };

        device.present().map_err(at(FrameStep::Present))?;

        let stats = FrameStats {
            frame_index: self.frame_index,
            vertices,
            uniforms_uploaded: uploaded,
            attributes_bound,
        };
        tracing::trace!(?stats, "frame presented");
        self.frame_index += 1;
        Ok(stats)
    }

    /// Delete the program and the vertex buffers.
    pub fn release<D: Device + ?Sized>(self, device: &mut D) -> Result<(), DeviceError> {
        let program = self.program.release(device);
        let geometry = self.geometry.release(device);
        program.and(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{GeometryBuffer, VertexAttribute};
    use crate::headless::{DeviceCall, HeadlessDevice};
    use crate::program::load_program;
    use lumen_assets::{ShaderSource, builtin};
    use lumen_common::{Mesh, ShaderStage, TransformBuilder};

    fn triangle_renderer(device: &mut HeadlessDevice) -> FrameRenderer {
        let (v, f) = builtin::passthrough_pair();
        let program = load_program(device, &v, &f).unwrap();
        let mesh = Mesh::from_positions(vec![[0.0, 1.0, 0.0], [1.0, -1.0, 0.0], [-1.0, -1.0, 0.0]]).unwrap();
        let geometry = GeometryBuffer::upload(device, &mesh).unwrap();
        FrameRenderer::new(program, geometry, TransformSet::IDENTITY)
    }

    #[test]
    fn triangle_tick_draws_three_vertices_once() {
        let mut device = HeadlessDevice::new();
        let mut renderer = triangle_renderer(&mut device);
        device.take_calls();

        let stats = renderer.tick(&mut device, 0.0).unwrap();
        assert_eq!(device.draw_calls(), vec![(0, 3)]);
        assert_eq!(device.presented(), 1);
        assert_eq!(stats.vertices, 3);
        assert_eq!(stats.uniforms_uploaded, 0);
        assert_eq!(stats.attributes_bound, 1);
        assert_eq!(renderer.frame_index(), 1);
    }

    #[test]
    fn frame_steps_run_in_order() {
        let mut device = HeadlessDevice::new();
        let (v, f) = builtin::cube_pair();
        let program = load_program(&mut device, &v, &f).unwrap();
        let geometry = GeometryBuffer::upload(&mut device, &Mesh::cube()).unwrap();
        let transforms = TransformBuilder::default().build();
        let mut renderer = FrameRenderer::new(program, geometry, transforms).with_clear_color([0.0, 0.0, 0.4, 0.0]);
        device.take_calls();

        renderer.tick(&mut device, 1.5).unwrap();
        let calls = device.take_calls();
        let kinds: Vec<&str> = calls
            .iter()
            .map(|c| match c {
                DeviceCall::Clear { .. } => "clear",
                DeviceCall::UseProgram { .. } => "use",
                DeviceCall::SetUniform { .. } => "uniform",
                DeviceCall::EnableAttribute { .. } => "enable",
                DeviceCall::AttributePointer { .. } => "pointer",
                DeviceCall::DrawArrays { .. } => "draw",
                DeviceCall::DisableAttribute { .. } => "disable",
                DeviceCall::Present => "present",
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "clear", "use", "uniform", "uniform", "uniform", "uniform", "enable", "pointer", "enable", "pointer",
                "draw", "disable", "disable", "present",
            ]
        );
        assert!(calls.contains(&DeviceCall::DrawArrays { first: 0, count: 36 }));
        assert!(device.enabled_attributes().is_empty());

        let angle = renderer.program().uniform(TIME_UNIFORM).unwrap();
        assert_eq!(device.uniform_value(angle), Some(UniformValue::Float(1.5)));
        let model = renderer.program().uniform(MODEL_UNIFORM).unwrap();
        assert_eq!(device.uniform_value(model), Some(UniformValue::Mat4(transforms.model)));
    }

    #[test]
    fn replaced_transforms_reach_the_next_tick() {
        let mut device = HeadlessDevice::new();
        let (v, f) = builtin::cube_pair();
        let program = load_program(&mut device, &v, &f).unwrap();
        let geometry = GeometryBuffer::upload(&mut device, &Mesh::cube()).unwrap();
        let mut renderer = FrameRenderer::new(program, geometry, TransformBuilder::new(4.0 / 3.0).build());
        renderer.tick(&mut device, 0.0).unwrap();

        let wide = TransformBuilder::new(16.0 / 9.0).build();
        renderer.set_transforms(wide);
        renderer.tick(&mut device, 0.0).unwrap();
        let projection = renderer.program().uniform(PROJECTION_UNIFORM).unwrap();
        assert_eq!(device.uniform_value(projection), Some(UniformValue::Mat4(wide.projection)));
    }

    #[test]
    fn absent_uniforms_are_skipped() {
        let mut device = HeadlessDevice::new();
        let mut renderer = triangle_renderer(&mut device);
        assert!(renderer.program().uniform(MVP_UNIFORM).is_none());
        renderer.tick(&mut device, 0.0).unwrap();
        assert!(!device.calls().iter().any(|c| matches!(c, DeviceCall::SetUniform { .. })));
    }

    #[test]
    fn draw_failure_names_the_step_and_unbinds() {
        let mut device = HeadlessDevice::new();
        let (v, f) = builtin::passthrough_pair();
        let program = load_program(&mut device, &v, &f).unwrap();
        // Two floats per vertex where the program reads three.
        let data = [0.0f32; 6];
        let geometry =
            GeometryBuffer::from_arrays(&mut device, 3, &[(VertexAttribute::float32(0, 2), &data[..])]).unwrap();
        let mut renderer = FrameRenderer::new(program, geometry, TransformSet::IDENTITY);

        let err = renderer.tick(&mut device, 0.0).unwrap_err();
        assert_eq!(err.step, FrameStep::Draw);
        assert!(err.to_string().starts_with("frame step `draw` failed"));
        assert!(device.enabled_attributes().is_empty());
        assert_eq!(device.presented(), 0);
    }

    #[test]
    fn uniform_type_mismatch_names_the_step() {
        let mut device = HeadlessDevice::new();
        let v = ShaderSource::new(
            "tinted.vert.wgsl",
            ShaderStage::Vertex,
            "@group(0) @binding(0) var<uniform> model: vec4<f32>;
             @vertex fn vs_main(@location(0) p: vec3<f32>) -> @builtin(position) vec4<f32> {
                 return vec4<f32>(p, 1.0) + model * 0.0;
             }",
        );
        let (_, f) = builtin::passthrough_pair();
        let program = load_program(&mut device, &v, &f).unwrap();
        let geometry = GeometryBuffer::upload(&mut device, &Mesh::triangle()).unwrap();
        let mut renderer = FrameRenderer::new(program, geometry, TransformSet::IDENTITY);

        let err = renderer.tick(&mut device, 0.0).unwrap_err();
        assert_eq!(err.step, FrameStep::UploadUniforms);
        assert!(matches!(err.source, DeviceError::UniformKind { .. }));
        assert!(device.draw_calls().is_empty());
    }

    #[test]
    fn release_frees_everything() {
        let mut device = HeadlessDevice::new();
        let renderer = triangle_renderer(&mut device);
        renderer.release(&mut device).unwrap();
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_shaders(), 0);
    }
}
