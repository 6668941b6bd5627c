use lumen_common::ShaderStage;
use lumen_render::device::{info_log_len, write_info_log};
use lumen_render::geometry::AttributeType;
use lumen_render::wgsl::{self, CompiledModule, ProgramInterface};
use lumen_render::{
    ActiveUniform, AttributeTable, BufferId, Device, DeviceError, ProgramId, ShaderId, UniformKind, UniformLocation,
    UniformValue, VertexAttribute,
};
use std::collections::BTreeMap;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const MSAA_SAMPLES: u32 = 4;

struct ShaderObject {
    stage: ShaderStage,
    label: String,
    source: Option<String>,
    compiled: Option<(CompiledModule, wgpu::ShaderModule)>,
    log: String,
}

/// GPU objects backing a linked program.
struct Pipeline {
    interface: ProgramInterface,
    pipeline: wgpu::RenderPipeline,
    bind_group: Option<wgpu::BindGroup>,
    /// One per uniform, indexed like `interface.uniforms`.
    uniform_buffers: Vec<wgpu::Buffer>,
}

#[derive(Default)]
struct ProgramObject {
    attached: Vec<ShaderId>,
    linked: Option<Pipeline>,
    log: String,
}

struct PendingDraw {
    program: ProgramId,
    first: u32,
    count: u32,
    /// Vertex buffer and byte offset per program attribute, in location order.
    buffers: Vec<(BufferId, u64)>,
}

struct PendingFrame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    clear: [f32; 4],
    draws: Vec<PendingDraw>,
}

/// A [`Device`] that renders to a window surface.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    sample_count: u32,
    targets: RenderTargets,
    next_id: u32,
    shaders: BTreeMap<ShaderId, ShaderObject>,
    programs: BTreeMap<ProgramId, ProgramObject>,
    buffers: BTreeMap<BufferId, wgpu::Buffer>,
    attributes: AttributeTable,
    current: Option<ProgramId>,
    frame: Option<PendingFrame>,
}

impl WgpuDevice {
    /// Create a device presenting to `target`, usually an `Arc<Window>`.
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(target)
            .map_err(|e| DeviceError::Surface(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DeviceError::Allocation {
            what: "adapter",
            reason: "no adapter can present to this surface".into(),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("lumen_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .map_err(|e| DeviceError::Allocation {
            what: "device",
            reason: e.to_string(),
        })?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(caps.formats.first())
            .copied()
            .ok_or_else(|| DeviceError::Surface("surface reports no texture formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let sample_count = pick_sample_count(
            adapter.get_texture_format_features(format).flags,
            adapter.get_texture_format_features(DEPTH_FORMAT).flags,
        );
        let targets = RenderTargets::new(&device, &config, sample_count);

        tracing::info!(
            "GPU initialized with {} backend ({}), {}x MSAA",
            adapter.get_info().backend.to_str(),
            adapter.get_info().name,
            sample_count
        );

        Ok(Self {
            device,
            queue,
            surface,
            config,
            sample_count,
            targets,
            next_id: 0,
            shaders: BTreeMap::new(),
            programs: BTreeMap::new(),
            buffers: BTreeMap::new(),
            attributes: AttributeTable::default(),
            current: None,
            frame: None,
        })
    }

    /// Reconfigure the surface and render targets for a new window size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.targets = RenderTargets::new(&self.device, &self.config, self.sample_count);
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Run `f` inside validation and out-of-memory error scopes.
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        (value, validation.or(oom))
    }

    fn shader(&self, id: ShaderId) -> Result<&ShaderObject, DeviceError> {
        self.shaders.get(&id).ok_or(DeviceError::UnknownShader(id))
    }

    fn program(&self, id: ProgramId) -> Result<&ProgramObject, DeviceError> {
        self.programs.get(&id).ok_or(DeviceError::UnknownProgram(id))
    }

    fn pipeline(&self, id: ProgramId) -> Result<&Pipeline, DeviceError> {
        self.program(id)?
            .linked
            .as_ref()
            .ok_or(DeviceError::ProgramNotLinked(id))
    }

    fn acquire(&mut self) -> Result<wgpu::SurfaceTexture, DeviceError> {
        match self.surface.get_current_texture() {
            Ok(output) => Ok(output),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.surface
                    .get_current_texture()
                    .map_err(|e| DeviceError::Surface(e.to_string()))
            }
            Err(e) => Err(DeviceError::Surface(e.to_string())),
        }
    }

    /// Build the render pipeline for a checked program interface.
    fn build_pipeline(
        &self,
        interface: ProgramInterface,
        vertex: &wgpu::ShaderModule,
        fragment: &wgpu::ShaderModule,
    ) -> Result<Pipeline, String> {
        let (built, error) = self.scoped(|device| {
            let uniform_buffers: Vec<wgpu::Buffer> = interface
                .uniforms
                .iter()
                .map(|u| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some(u.name.as_str()),
                        size: uniform_buffer_size(u.kind),
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    })
                })
                .collect();

            let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = interface
                .uniforms
                .iter()
                .map(|u| {
                    let mut visibility = wgpu::ShaderStages::NONE;
                    if u.vertex {
                        visibility |= wgpu::ShaderStages::VERTEX;
                    }
                    if u.fragment {
                        visibility |= wgpu::ShaderStages::FRAGMENT;
                    }
                    wgpu::BindGroupLayoutEntry {
                        binding: u.binding,
                        visibility,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }
                })
                .collect();

            let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("uniform_bind_group_layout"),
                entries: &layout_entries,
            });

            let bind_group = (!uniform_buffers.is_empty()).then(|| {
                let entries: Vec<wgpu::BindGroupEntry> = interface
                    .uniforms
                    .iter()
                    .zip(&uniform_buffers)
                    .map(|(u, buffer)| wgpu::BindGroupEntry {
                        binding: u.binding,
                        resource: buffer.as_entire_binding(),
                    })
                    .collect();
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("uniform_bind_group"),
                    layout: &bind_group_layout,
                    entries: &entries,
                })
            });

            let with_uniforms = [&bind_group_layout];
            let bind_group_layouts: &[&wgpu::BindGroupLayout] =
                if bind_group.is_some() { &with_uniforms } else { &[] };
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("pipeline_layout"),
                bind_group_layouts,
                push_constant_ranges: &[],
            });

            // One tightly packed buffer per attribute.
            let attributes: Vec<[wgpu::VertexAttribute; 1]> = interface
                .attributes
                .iter()
                .map(|a| {
                    [wgpu::VertexAttribute {
                        format: vertex_format(a.components),
                        offset: 0,
                        shader_location: a.location,
                    }]
                })
                .collect();
            let buffers: Vec<wgpu::VertexBufferLayout> = interface
                .attributes
                .iter()
                .zip(&attributes)
                .map(|(a, attrs)| wgpu::VertexBufferLayout {
                    array_stride: AttributeType::Float32.size() * u64::from(a.components),
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: attrs,
                })
                .collect();

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("program_pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: Some(interface.vertex_entry.as_str()),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: Some(interface.fragment_entry.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: self.sample_count,
                    ..Default::default()
                },
                multiview: None,
                cache: None,
            });

            (pipeline, bind_group, uniform_buffers)
        });

        match error {
            Some(e) => Err(e.to_string()),
            None => {
                let (pipeline, bind_group, uniform_buffers) = built;
                Ok(Pipeline {
                    interface,
                    pipeline,
                    bind_group,
                    uniform_buffers,
                })
            }
        }
    }

    /// Check the attached shaders and build their pipeline.
    fn link_attached(&self, program: &ProgramObject) -> Result<Pipeline, String> {
        let mut vertex = Vec::new();
        let mut fragment = Vec::new();
        for id in &program.attached {
            let shader = self
                .shaders
                .get(id)
                .ok_or_else(|| format!("error: attached {id} no longer exists"))?;
            let compiled = shader
                .compiled
                .as_ref()
                .ok_or_else(|| format!("error: {} ({id}) has not been compiled successfully", shader.label))?;
            match shader.stage {
                ShaderStage::Vertex => vertex.push(compiled),
                ShaderStage::Fragment => fragment.push(compiled),
            }
        }
        let ([(vs, vs_gpu)], [(fs, fs_gpu)]) = (vertex.as_slice(), fragment.as_slice()) else {
            return Err(format!(
                "error: a program needs exactly one vertex and one fragment shader, found {} and {}",
                vertex.len(),
                fragment.len()
            ));
        };
        let interface = wgsl::link(vs, fs)?;
        self.build_pipeline(interface, vs_gpu, fs_gpu)
    }
}

impl Device for WgpuDevice {
    fn create_shader(&mut self, stage: ShaderStage, label: &str) -> Result<ShaderId, DeviceError> {
        let id = ShaderId(self.next());
        self.shaders.insert(
            id,
            ShaderObject {
                stage,
                label: label.to_string(),
                source: None,
                compiled: None,
                log: String::new(),
            },
        );
        Ok(id)
    }

    fn shader_source(&mut self, shader: ShaderId, text: &str) -> Result<(), DeviceError> {
        let object = self.shaders.get_mut(&shader).ok_or(DeviceError::UnknownShader(shader))?;
        object.source = Some(text.to_string());
        Ok(())
    }

    fn compile_shader(&mut self, shader: ShaderId) -> Result<(), DeviceError> {
        let object = self.shader(shader)?;
        let text = object.source.as_deref().ok_or(DeviceError::NoSource(shader))?;
        let result = wgsl::compile(&object.label, object.stage, text).and_then(|compiled| {
            let (module, error) = self.scoped(|device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(object.label.as_str()),
                    source: wgpu::ShaderSource::Wgsl(text.into()),
                })
            });
            match error {
                Some(e) => Err(format!("error: {}: {e}", object.label)),
                None => Ok((compiled, module)),
            }
        });

        let object = self.shaders.get_mut(&shader).ok_or(DeviceError::UnknownShader(shader))?;
        match result {
            Ok(compiled) => {
                object.compiled = Some(compiled);
                object.log.clear();
            }
            Err(log) => {
                object.compiled = None;
                object.log = log;
            }
        }
        Ok(())
    }

    fn compile_status(&self, shader: ShaderId) -> Result<bool, DeviceError> {
        Ok(self.shader(shader)?.compiled.is_some())
    }

    fn shader_info_log_len(&self, shader: ShaderId) -> Result<usize, DeviceError> {
        Ok(info_log_len(&self.shader(shader)?.log))
    }

    fn shader_info_log(&self, shader: ShaderId, buf: &mut [u8]) -> Result<usize, DeviceError> {
        Ok(write_info_log(&self.shader(shader)?.log, buf))
    }

    fn delete_shader(&mut self, shader: ShaderId) -> Result<(), DeviceError> {
        self.shaders.remove(&shader).ok_or(DeviceError::UnknownShader(shader))?;
        Ok(())
    }

    fn create_program(&mut self) -> Result<ProgramId, DeviceError> {
        let id = ProgramId(self.next());
        self.programs.insert(id, ProgramObject::default());
        Ok(id)
    }

    fn attach_shader(&mut self, program: ProgramId, shader: ShaderId) -> Result<(), DeviceError> {
        self.shader(shader)?;
        let object = self.programs.get_mut(&program).ok_or(DeviceError::UnknownProgram(program))?;
        if !object.attached.contains(&shader) {
            object.attached.push(shader);
        }
        Ok(())
    }

    fn detach_shader(&mut self, program: ProgramId, shader: ShaderId) -> Result<(), DeviceError> {
        let object = self.programs.get_mut(&program).ok_or(DeviceError::UnknownProgram(program))?;
        object.attached.retain(|s| *s != shader);
        Ok(())
    }

    fn link_program(&mut self, program: ProgramId) -> Result<(), DeviceError> {
        let result = self.link_attached(self.program(program)?);
        let object = self.programs.get_mut(&program).ok_or(DeviceError::UnknownProgram(program))?;
        match result {
            Ok(pipeline) => {
                object.linked = Some(pipeline);
                object.log.clear();
            }
            Err(log) => {
                object.linked = None;
                object.log = log;
            }
        }
        Ok(())
    }

    fn link_status(&self, program: ProgramId) -> Result<bool, DeviceError> {
        Ok(self.program(program)?.linked.is_some())
    }

    fn program_info_log_len(&self, program: ProgramId) -> Result<usize, DeviceError> {
        Ok(info_log_len(&self.program(program)?.log))
    }

    fn program_info_log(&self, program: ProgramId, buf: &mut [u8]) -> Result<usize, DeviceError> {
        Ok(write_info_log(&self.program(program)?.log, buf))
    }

    fn active_uniforms(&self, program: ProgramId) -> Result<Vec<ActiveUniform>, DeviceError> {
        Ok(self.pipeline(program)?.interface.active_uniforms(program))
    }

    fn delete_program(&mut self, program: ProgramId) -> Result<(), DeviceError> {
        self.programs.remove(&program).ok_or(DeviceError::UnknownProgram(program))?;
        if self.current == Some(program) {
            self.current = None;
        }
        Ok(())
    }

    fn create_vertex_buffer(&mut self, label: &str, data: &[f32]) -> Result<BufferId, DeviceError> {
        let (buffer, error) = self.scoped(|device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
        if let Some(e) = error {
            return Err(DeviceError::Allocation {
                what: "vertex buffer",
                reason: e.to_string(),
            });
        }
        let id = BufferId(self.next());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn delete_buffer(&mut self, buffer: BufferId) -> Result<(), DeviceError> {
        let removed = self.buffers.remove(&buffer).ok_or(DeviceError::UnknownBuffer(buffer))?;
        removed.destroy();
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) -> Result<(), DeviceError> {
        if let Some(frame) = &mut self.frame {
            frame.clear = color;
            frame.draws.clear();
            return Ok(());
        }
        let output = self.acquire()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(PendingFrame {
            output,
            view,
            clear: color,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), DeviceError> {
        self.pipeline(program)?;
        self.current = Some(program);
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
        let pipeline = self.pipeline(current)?;
        let index = location.index as usize;
        let (Some(uniform), Some(buffer)) = (
            pipeline.interface.uniforms.get(index),
            pipeline.uniform_buffers.get(index),
        ) else {
            return Err(DeviceError::UnknownUniform {
                program: current,
                index: location.index,
            });
        };
        if uniform.kind != value.kind() {
            return Err(DeviceError::UniformKind {
                name: uniform.name.clone(),
                expected: uniform.kind,
                actual: value.kind(),
            });
        }
        // Staged until the next submit, so one value per uniform per frame.
        self.queue.write_buffer(buffer, 0, &value.to_bytes());
        Ok(())
    }

    fn enable_attribute(&mut self, slot: u32) -> Result<(), DeviceError> {
        self.attributes.enable(slot);
        Ok(())
    }

    fn attribute_pointer(&mut self, buffer: BufferId, attribute: &VertexAttribute) -> Result<(), DeviceError> {
        if !self.buffers.contains_key(&buffer) {
            return Err(DeviceError::UnknownBuffer(buffer));
        }
        if attribute.normalized {
            return Err(DeviceError::AttributeLayout {
                slot: attribute.slot,
                reason: "normalized float attributes are not supported".into(),
            });
        }
        self.attributes.point(buffer, *attribute);
        Ok(())
    }

    fn disable_attribute(&mut self, slot: u32) {
        self.attributes.disable(slot);
    }

    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), DeviceError> {
        if self.frame.is_none() {
            return Err(DeviceError::NoFrame);
        }
        let current = self.current.ok_or(DeviceError::NoProgramBound)?;
        let end = first.checked_add(count).ok_or_else(|| DeviceError::AttributeLayout {
            slot: 0,
            reason: format!("draw range {first}+{count} overflows"),
        })?;

        let mut buffers = Vec::new();
        for input in &self.pipeline(current)?.interface.attributes {
            let (buffer, attribute) = self.attributes.resolve(input)?;
            if attribute.effective_stride() != attribute.element_size() {
                return Err(DeviceError::AttributeLayout {
                    slot: attribute.slot,
                    reason: format!(
                        "stride {} is not tightly packed; this device needs one buffer per attribute",
                        attribute.stride
                    ),
                });
            }
            let size = self
                .buffers
                .get(&buffer)
                .ok_or(DeviceError::UnknownBuffer(buffer))?
                .size();
            let needed = attribute.required_bytes(end).ok_or_else(|| DeviceError::AttributeLayout {
                slot: attribute.slot,
                reason: format!("offset {} and stride {} overflow", attribute.offset, attribute.stride),
            })?;
            if size < needed {
                return Err(DeviceError::BufferTooSmall { buffer, size, needed });
            }
            buffers.push((buffer, attribute.offset));
        }

        if let Some(frame) = &mut self.frame {
            frame.draws.push(PendingDraw {
                program: current,
                first,
                count,
                buffers,
            });
        }
        Ok(())
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        let frame = self.frame.take().ok_or(DeviceError::NoFrame)?;
        let [r, g, b, a] = frame.clear.map(f64::from);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: self.targets.color.as_ref().unwrap_or(&frame.view),
                    resolve_target: self.targets.color.as_ref().map(|_| &frame.view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for draw in &frame.draws {
                let pipeline = self
                    .programs
                    .get(&draw.program)
                    .and_then(|p| p.linked.as_ref())
                    .ok_or(DeviceError::ProgramNotLinked(draw.program))?;
                pass.set_pipeline(&pipeline.pipeline);
                if let Some(bind_group) = &pipeline.bind_group {
                    pass.set_bind_group(0, bind_group, &[]);
                }
                for (index, (buffer, offset)) in (0u32..).zip(&draw.buffers) {
                    let buffer = self.buffers.get(buffer).ok_or(DeviceError::UnknownBuffer(*buffer))?;
                    pass.set_vertex_buffer(index, buffer.slice(*offset..));
                }
                pass.draw(draw.first..draw.first + draw.count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.output.present();
        Ok(())
    }
}

/// Depth buffer, plus the multisampled color target that resolves into the
/// surface texture when MSAA is on.
struct RenderTargets {
    depth: wgpu::TextureView,
    color: Option<wgpu::TextureView>,
}

impl RenderTargets {
    fn new(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration, sample_count: u32) -> Self {
        let depth = create_target(device, config, "depth_texture", DEPTH_FORMAT, sample_count);
        let color = (sample_count > 1)
            .then(|| create_target(device, config, "msaa_color_texture", config.format, sample_count));
        Self { depth, color }
    }
}

fn create_target(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    label: &str,
    format: wgpu::TextureFormat,
    sample_count: u32,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: config.width.max(1),
            height: config.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

/// 4x when both the surface format and the depth format support it, else 1.
fn pick_sample_count(color: wgpu::TextureFormatFeatureFlags, depth: wgpu::TextureFormatFeatureFlags) -> u32 {
    let x4 = wgpu::TextureFormatFeatureFlags::MULTISAMPLE_X4;
    let resolve = wgpu::TextureFormatFeatureFlags::MULTISAMPLE_RESOLVE;
    if color.contains(x4 | resolve) && depth.contains(x4) {
        MSAA_SAMPLES
    } else {
        1
    }
}

fn vertex_format(components: u8) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

/// Uniform buffers are padded to 16 bytes.
fn uniform_buffer_size(kind: UniformKind) -> u64 {
    kind.size().next_multiple_of(16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_formats_match_component_counts() {
        for components in 1..=4u8 {
            let format = vertex_format(components);
            assert_eq!(format.size(), 4 * u64::from(components));
        }
    }

    #[test]
    fn msaa_needs_color_resolve_and_depth_support() {
        use wgpu::TextureFormatFeatureFlags as F;
        let color = F::MULTISAMPLE_X4 | F::MULTISAMPLE_RESOLVE;
        assert_eq!(pick_sample_count(color, F::MULTISAMPLE_X4), 4);
        assert_eq!(pick_sample_count(F::MULTISAMPLE_X4, F::MULTISAMPLE_X4), 1);
        assert_eq!(pick_sample_count(color, F::empty()), 1);
    }

    #[test]
    fn uniform_buffers_are_padded() {
        assert_eq!(uniform_buffer_size(UniformKind::Float), 16);
        assert_eq!(uniform_buffer_size(UniformKind::Vec3), 16);
        assert_eq!(uniform_buffer_size(UniformKind::Mat4), 64);
    }
}
