use crate::AssetError;
use lumen_common::ShaderStage;
use std::path::Path;

/// Shader text for one stage, tagged with where it came from.
///
/// Immutable once loaded; the compiler only ever borrows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    name: String,
    stage: ShaderStage,
    text: String,
}

impl ShaderSource {
    /// Wrap in-memory text. `name` is used in diagnostics in place of a path.
    pub fn new(name: impl Into<String>, stage: ShaderStage, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage,
            text: text.into(),
        }
    }

    /// Read a shader file fully into memory.
    pub fn load(path: impl AsRef<Path>, stage: ShaderStage) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AssetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), %stage, bytes = text.len(), "read shader source");
        Ok(Self::new(path.display().to_string(), stage, text))
    }

    /// File path or logical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Read the vertex and fragment files of one program. Both are read before
/// either is returned, so a missing fragment file fails just as early as a
/// missing vertex file.
pub fn load_shader_pair(
    vertex: impl AsRef<Path>,
    fragment: impl AsRef<Path>,
) -> Result<(ShaderSource, ShaderSource), AssetError> {
    let vertex = ShaderSource::load(vertex, ShaderStage::Vertex)?;
    let fragment = ShaderSource::load(fragment, ShaderStage::Fragment)?;
    Ok((vertex, fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_reads_whole_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "@fragment\nfn fs_main() {{}}\n").unwrap();

        let src = ShaderSource::load(tmp.path(), ShaderStage::Fragment).unwrap();
        assert_eq!(src.stage(), ShaderStage::Fragment);
        assert_eq!(src.text(), "@fragment\nfn fs_main() {}\n");
        assert_eq!(src.name(), tmp.path().display().to_string());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.vert.wgsl");
        let err = ShaderSource::load(&path, ShaderStage::Vertex).unwrap_err();
        match err {
            AssetError::Read { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pair_fails_on_missing_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let vert = dir.path().join("a.vert.wgsl");
        std::fs::write(&vert, "// vertex").unwrap();
        let frag = dir.path().join("a.frag.wgsl");

        let err = load_shader_pair(&vert, &frag).unwrap_err();
        assert!(err.to_string().contains("a.frag.wgsl"));
    }

    #[test]
    fn in_memory_source_keeps_logical_name() {
        let src = ShaderSource::new("builtin:passthrough", ShaderStage::Vertex, "x");
        assert_eq!(src.name(), "builtin:passthrough");
        assert_eq!(src.text(), "x");
    }
}
