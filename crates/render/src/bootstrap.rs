use crate::device::Device;
use crate::frame::FrameRenderer;
use crate::geometry::{GeometryBuffer, GeometryError};
use crate::program::{PipelineError, load_program};
use lumen_assets::{AssetError, SceneConfig, ShaderSource, load_shader_pair};
use lumen_common::{Mesh, TransformSet};

/// Anything that stops a session from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Set up a renderer for a scene. Both shader files are read before the
/// device is touched.
pub fn bootstrap<D: Device + ?Sized>(
    device: &mut D,
    scene: &SceneConfig,
    aspect: f32,
) -> Result<FrameRenderer, StartupError> {
    let (vertex, fragment) = load_shader_pair(&scene.shaders.vertex, &scene.shaders.fragment)?;
    let transforms = scene.transform_builder(aspect).build();
    let renderer = prepare(device, &vertex, &fragment, &scene.mesh(), transforms)?;
    Ok(renderer.with_clear_color(scene.clear_color))
}

/// Build the program, then upload the mesh. If the upload fails the program
/// is deleted again.
pub fn prepare<D: Device + ?Sized>(
    device: &mut D,
    vertex: &ShaderSource,
    fragment: &ShaderSource,
    mesh: &Mesh,
    transforms: TransformSet,
) -> Result<FrameRenderer, StartupError> {
    let program = load_program(device, vertex, fragment)?;
    let geometry = match GeometryBuffer::upload(device, mesh) {
        Ok(geometry) => geometry,
        Err(e) => {
            if let Err(release) = program.release(device) {
                tracing::warn!("failed to delete program after upload error: {release}");
            }
            return Err(e.into());
        }
    };
    tracing::info!(
        uniforms = program.active_uniforms().count(),
        vertices = geometry.vertex_count(),
        "session ready"
    );
    Ok(FrameRenderer::new(program, geometry, transforms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use crate::headless::HeadlessDevice;
    use lumen_assets::builtin;
    use lumen_common::MeshPreset;

    #[test]
    fn missing_shader_file_fails_before_device_work() {
        let dir = tempfile::tempdir().unwrap();
        let mut scene = SceneConfig::default();
        scene.shaders.vertex = dir.path().join("missing.vert.wgsl");
        scene.shaders.fragment = dir.path().join("missing.frag.wgsl");

        let mut device = HeadlessDevice::new();
        let err = bootstrap(&mut device, &scene, 1.0).unwrap_err();
        assert!(matches!(err, StartupError::Asset(AssetError::Read { .. })));
        assert!(err.to_string().contains("missing.vert.wgsl"));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn scene_files_bootstrap_a_renderer() {
        let dir = tempfile::tempdir().unwrap();
        let vert = dir.path().join("cube.vert.wgsl");
        let frag = dir.path().join("cube.frag.wgsl");
        std::fs::write(&vert, builtin::CUBE_VERTEX).unwrap();
        std::fs::write(&frag, builtin::CUBE_FRAGMENT).unwrap();

        let mut scene = SceneConfig::default();
        scene.shaders.vertex = vert;
        scene.shaders.fragment = frag;
        scene.mesh = MeshPreset::Triangle;

        let mut device = HeadlessDevice::new();
        let mut renderer = bootstrap(&mut device, &scene, scene.aspect()).unwrap();
        assert_eq!(renderer.clear_color(), [0.0, 0.0, 0.4, 0.0]);
        assert_eq!(*renderer.transforms(), scene.transform_builder(scene.aspect()).build());
        renderer.tick(&mut device, 0.0).unwrap();
        assert_eq!(device.draw_calls(), vec![(0, 3)]);
    }

    #[test]
    fn allocation_failure_releases_the_program() {
        let mut device = HeadlessDevice::new().with_buffer_limit(0);
        let (v, f) = builtin::cube_pair();
        let err = prepare(&mut device, &v, &f, &Mesh::cube(), TransformSet::IDENTITY).unwrap_err();
        assert!(matches!(
            err,
            StartupError::Geometry(GeometryError::Device(DeviceError::Allocation { .. }))
        ));
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.live_shaders(), 0);
    }
}
