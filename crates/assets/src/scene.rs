use crate::AssetError;
use glam::Vec3;
use lumen_common::{Mesh, MeshPreset, TransformBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Window size and title requested from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "lumen".into(),
        }
    }
}

/// Vertex and fragment shader file paths, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/cube.vert.wgsl"),
            fragment: PathBuf::from("shaders/cube.frag.wgsl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let d = TransformBuilder::default();
        Self {
            fov_degrees: d.fov_degrees,
            eye: d.eye,
            target: d.target,
            up: d.up,
            near: d.near,
            far: d.far,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub translation: Vec3,
    pub rotation_axis: Vec3,
    pub rotation_degrees: f32,
    pub scale: Vec3,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let d = TransformBuilder::default();
        Self {
            translation: d.translation,
            rotation_axis: d.rotation_axis,
            rotation_degrees: d.rotation_degrees,
            scale: d.scale,
        }
    }
}

/// Everything one rendering session needs besides the device.
///
/// Every field has a default, so a scene file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneConfig {
    pub window: WindowConfig,
    pub shaders: ShaderPaths,
    pub mesh: MeshPreset,
    pub clear_color: [f32; 4],
    pub camera: CameraConfig,
    pub model: ModelConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            shaders: ShaderPaths::default(),
            mesh: MeshPreset::Cube,
            clear_color: [0.0, 0.0, 0.4, 0.0],
            camera: CameraConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl SceneConfig {
    /// Load a scene from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AssetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let scene = serde_yaml::from_str(&text).map_err(|source| AssetError::Scene {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("loaded scene {}", path.display());
        Ok(scene)
    }

    pub fn from_yaml(text: &str) -> Result<Self, AssetError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String, AssetError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Save the scene as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AssetError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_yaml()?).map_err(|source| AssetError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn aspect(&self) -> f32 {
        self.window.width.max(1) as f32 / self.window.height.max(1) as f32
    }

    pub fn mesh(&self) -> Mesh {
        self.mesh.build()
    }

    /// Camera and model inputs for the given aspect ratio.
    pub fn transform_builder(&self, aspect: f32) -> TransformBuilder {
        TransformBuilder::new(aspect)
            .camera(
                self.camera.fov_degrees,
                self.camera.eye,
                self.camera.target,
                self.camera.up,
            )
            .clip_planes(self.camera.near, self.camera.far)
            .model(
                self.model.translation,
                self.model.rotation_axis,
                self.model.rotation_degrees,
                self.model.scale,
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_transform_builder() {
        let scene = SceneConfig::default();
        assert_eq!(scene.transform_builder(scene.aspect()), TransformBuilder::default());
        assert_eq!(scene.mesh().vertex_count(), 36);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let scene = SceneConfig::from_yaml(
            "mesh: triangle\ncamera:\n  fov_degrees: 45.0\n  eye: [0.0, 0.0, 5.0]\n",
        )
        .unwrap();
        assert_eq!(scene.mesh, MeshPreset::Triangle);
        assert_eq!(scene.camera.fov_degrees, 45.0);
        assert_eq!(scene.camera.eye, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(scene.camera.up, Vec3::Y);
        assert_eq!(scene.window.width, 800);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(SceneConfig::from_yaml("meshh: cube\n").is_err());
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut scene = SceneConfig::default();
        scene.window.title = "saved".into();
        scene.model.rotation_degrees = 30.0;
        scene.save(tmp.path()).unwrap();

        let loaded = SceneConfig::load(tmp.path()).unwrap();
        assert_eq!(loaded, scene);
    }

    #[test]
    fn bad_scene_file_names_the_path() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "window: [1, 2").unwrap();
        let err = SceneConfig::load(tmp.path()).unwrap_err();
        assert!(matches!(err, AssetError::Scene { .. }));
        assert!(err.to_string().contains(&tmp.path().display().to_string()));
    }

    #[test]
    fn shipped_scenes_parse() {
        let cube = SceneConfig::from_yaml(include_str!("../../../scenes/cube.yaml")).unwrap();
        assert_eq!(cube, SceneConfig::default());
        let tri = SceneConfig::from_yaml(include_str!("../../../scenes/triangle.yaml")).unwrap();
        assert_eq!(tri.mesh, MeshPreset::Triangle);
    }
}
