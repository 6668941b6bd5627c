//! WGSL front end shared by every device: compile = parse + validate with
//! naga, link = check the vertex/fragment interface and reflect the program's
//! attributes and uniforms.

use crate::device::{ActiveUniform, ProgramId, UniformKind, UniformLocation};
use lumen_common::ShaderStage;
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, Module, Scalar, ScalarKind, Type, TypeInner, VectorSize};
use std::collections::BTreeMap;

/// A validated module and the entry point it contributes to a program.
#[derive(Debug)]
pub struct CompiledModule {
    pub stage: ShaderStage,
    pub module: Module,
    pub info: ModuleInfo,
    pub entry_index: usize,
    pub entry_point: String,
}

/// A per-vertex input read by the vertex entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInput {
    pub name: String,
    pub location: u32,
    pub components: u8,
}

/// A uniform read by at least one linked entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBinding {
    pub name: String,
    pub binding: u32,
    pub kind: UniformKind,
    pub vertex: bool,
    pub fragment: bool,
}

/// Everything a device needs to know about a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInterface {
    pub vertex_entry: String,
    pub fragment_entry: String,
    /// Sorted by location.
    pub attributes: Vec<AttributeInput>,
    /// Sorted by binding; a uniform's index here is its location index.
    pub uniforms: Vec<UniformBinding>,
}

impl ProgramInterface {
    /// Uniforms as a device reports them for `program`. A uniform's location
    /// index is its position in binding order.
    pub fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform> {
        self.uniforms
            .iter()
            .zip(0u32..)
            .map(|(u, index)| ActiveUniform {
                name: u.name.clone(),
                location: UniformLocation { program, index },
                kind: u.kind,
            })
            .collect()
    }
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Parse and validate one shader unit. The error string is the full
/// diagnostic report, labelled with `name`.
pub fn compile(name: &str, stage: ShaderStage, text: &str) -> Result<CompiledModule, String> {
    let module = naga::front::wgsl::parse_str(text).map_err(|e| e.emit_to_string_with_path(text, name))?;
    let info = Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|e| e.emit_to_string_with_path(text, name))?;

    let wanted = naga_stage(stage);
    let entry_index = module
        .entry_points
        .iter()
        .position(|ep| ep.stage == wanted)
        .ok_or_else(|| {
            format!(
                "error: {name}: no {} entry point; a {stage} shader needs one",
                stage.entry_attribute()
            )
        })?;
    let entry_point = module.entry_points[entry_index].name.clone();
    tracing::debug!(%name, %stage, entry = %entry_point, "validated shader module");

    Ok(CompiledModule {
        stage,
        module,
        info,
        entry_index,
        entry_point,
    })
}

/// Check that two compiled modules form a complete program and reflect its
/// interface. The error string lists every problem found, one per line.
pub fn link(vertex: &CompiledModule, fragment: &CompiledModule) -> Result<ProgramInterface, String> {
    let mut errors = Vec::new();
    if vertex.stage != ShaderStage::Vertex {
        errors.push(format!("error: a {} shader is attached as the vertex stage", vertex.stage));
    }
    if fragment.stage != ShaderStage::Fragment {
        errors.push(format!("error: a {} shader is attached as the fragment stage", fragment.stage));
    }
    if !errors.is_empty() {
        return Err(errors.join("\n"));
    }

    let attributes = vertex_attributes(vertex, &mut errors);
    check_varyings(vertex, fragment, &mut errors);
    let uniforms = collect_uniforms(&[vertex, fragment], &mut errors);

    if errors.is_empty() {
        Ok(ProgramInterface {
            vertex_entry: vertex.entry_point.clone(),
            fragment_entry: fragment.entry_point.clone(),
            attributes,
            uniforms,
        })
    } else {
        Err(errors.join("\n"))
    }
}

struct LocationSlot {
    name: String,
    location: u32,
    ty: Handle<Type>,
}

/// `@location` bindings carried by one argument or result, looking through
/// structs one level deep.
fn location_slots(module: &Module, name: Option<&str>, binding: Option<&Binding>, ty: Handle<Type>) -> Vec<LocationSlot> {
    match binding {
        Some(Binding::Location { location, .. }) => vec![LocationSlot {
            name: name.unwrap_or_default().to_string(),
            location: *location,
            ty,
        }],
        Some(Binding::BuiltIn(_)) => Vec::new(),
        None => match &module.types[ty].inner {
            TypeInner::Struct { members, .. } => members
                .iter()
                .filter_map(|m| match &m.binding {
                    Some(Binding::Location { location, .. }) => Some(LocationSlot {
                        name: m.name.clone().unwrap_or_default(),
                        location: *location,
                        ty: m.ty,
                    }),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        },
    }
}

fn entry_inputs(unit: &CompiledModule) -> Vec<LocationSlot> {
    let function = &unit.module.entry_points[unit.entry_index].function;
    function
        .arguments
        .iter()
        .flat_map(|arg| location_slots(&unit.module, arg.name.as_deref(), arg.binding.as_ref(), arg.ty))
        .collect()
}

fn entry_outputs(unit: &CompiledModule) -> Vec<LocationSlot> {
    let function = &unit.module.entry_points[unit.entry_index].function;
    match &function.result {
        Some(result) => location_slots(&unit.module, None, result.binding.as_ref(), result.ty),
        None => Vec::new(),
    }
}

const F32: Scalar = Scalar {
    kind: ScalarKind::Float,
    width: 4,
};

fn vector_len(size: VectorSize) -> u8 {
    match size {
        VectorSize::Bi => 2,
        VectorSize::Tri => 3,
        VectorSize::Quad => 4,
    }
}

fn float_components(inner: &TypeInner) -> Option<u8> {
    match *inner {
        TypeInner::Scalar(s) if s == F32 => Some(1),
        TypeInner::Vector { size, scalar } if scalar == F32 => Some(vector_len(size)),
        _ => None,
    }
}

fn uniform_kind(inner: &TypeInner) -> Option<UniformKind> {
    match *inner {
        TypeInner::Scalar(s) if s == F32 => Some(UniformKind::Float),
        TypeInner::Vector { size, scalar } if scalar == F32 => Some(match size {
            VectorSize::Bi => UniformKind::Vec2,
            VectorSize::Tri => UniformKind::Vec3,
            VectorSize::Quad => UniformKind::Vec4,
        }),
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar == F32 => Some(UniformKind::Mat4),
        _ => None,
    }
}

fn describe(inner: &TypeInner) -> String {
    match *inner {
        TypeInner::Scalar(s) if s == F32 => "f32".into(),
        TypeInner::Vector { size, scalar } if scalar == F32 => format!("vec{}<f32>", vector_len(size)),
        TypeInner::Matrix { columns, rows, scalar } if scalar == F32 => {
            format!("mat{}x{}<f32>", vector_len(columns), vector_len(rows))
        }
        ref other => format!("{other:?}"),
    }
}

fn vertex_attributes(vertex: &CompiledModule, errors: &mut Vec<String>) -> Vec<AttributeInput> {
    let mut attributes: Vec<AttributeInput> = entry_inputs(vertex)
        .into_iter()
        .filter_map(|slot| {
            let inner = &vertex.module.types[slot.ty].inner;
            match float_components(inner) {
                Some(components) => Some(AttributeInput {
                    name: slot.name,
                    location: slot.location,
                    components,
                }),
                None => {
                    errors.push(format!(
                        "error: vertex input `{}` at @location({}) is {}; only f32 and vecN<f32> attributes are supported",
                        slot.name,
                        slot.location,
                        describe(inner)
                    ));
                    None
                }
            }
        })
        .collect();
    attributes.sort_by_key(|a| a.location);
    attributes
}

fn check_varyings(vertex: &CompiledModule, fragment: &CompiledModule, errors: &mut Vec<String>) {
    let outputs: BTreeMap<u32, LocationSlot> = entry_outputs(vertex)
        .into_iter()
        .map(|slot| (slot.location, slot))
        .collect();

    for input in entry_inputs(fragment) {
        let wanted = &fragment.module.types[input.ty].inner;
        match outputs.get(&input.location) {
            None => errors.push(format!(
                "error: fragment input `{}` at @location({}) is not written by the vertex stage",
                input.name, input.location
            )),
            Some(out) => {
                let written = &vertex.module.types[out.ty].inner;
                if written != wanted {
                    errors.push(format!(
                        "error: @location({}) is {} in the vertex stage but {} in the fragment stage",
                        input.location,
                        describe(written),
                        describe(wanted)
                    ));
                }
            }
        }
    }
}

fn collect_uniforms(units: &[&CompiledModule], errors: &mut Vec<String>) -> Vec<UniformBinding> {
    let mut by_name: BTreeMap<String, UniformBinding> = BTreeMap::new();

    for unit in units {
        let usage = unit.info.get_entry_point(unit.entry_index);
        for (handle, var) in unit.module.global_variables.iter() {
            if usage[handle].is_empty() {
                continue;
            }
            let name = var.name.clone().unwrap_or_else(|| "<unnamed>".into());
            match var.space {
                AddressSpace::Uniform => {}
                AddressSpace::Handle | AddressSpace::Storage { .. } | AddressSpace::PushConstant => {
                    errors.push(format!(
                        "error: `{name}` in the {} stage is not a uniform; only var<uniform> resources are supported",
                        unit.stage
                    ));
                    continue;
                }
                _ => continue,
            }
            let Some(rb) = var.binding.as_ref() else {
                errors.push(format!("error: uniform `{name}` has no @binding"));
                continue;
            };
            if rb.group != 0 {
                errors.push(format!(
                    "error: uniform `{name}` is in @group({}); only group 0 is supported",
                    rb.group
                ));
                continue;
            }
            let inner = &unit.module.types[var.ty].inner;
            let Some(kind) = uniform_kind(inner) else {
                errors.push(format!(
                    "error: uniform `{name}` has unsupported type {}",
                    describe(inner)
                ));
                continue;
            };

            let entry = by_name.entry(name.clone()).or_insert_with(|| UniformBinding {
                name: name.clone(),
                binding: rb.binding,
                kind,
                vertex: false,
                fragment: false,
            });
            if entry.binding != rb.binding || entry.kind != kind {
                errors.push(format!(
                    "error: uniform `{name}` is declared as {} at @binding({}) and as {kind} at @binding({})",
                    entry.kind, entry.binding, rb.binding
                ));
                continue;
            }
            match unit.stage {
                ShaderStage::Vertex => entry.vertex = true,
                ShaderStage::Fragment => entry.fragment = true,
            }
        }
    }

    let mut owners: BTreeMap<u32, &str> = BTreeMap::new();
    for u in by_name.values() {
        if let Some(other) = owners.insert(u.binding, &u.name) {
            errors.push(format!(
                "error: uniforms `{other}` and `{}` share @binding({})",
                u.name, u.binding
            ));
        }
    }

    let mut uniforms: Vec<UniformBinding> = by_name.into_values().collect();
    uniforms.sort_by_key(|u| u.binding);
    uniforms
}
