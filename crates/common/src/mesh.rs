use serde::{Deserialize, Serialize};

/// Errors from mesh construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    #[error("mesh has no vertices")]
    Empty,
    #[error("mesh has {positions} positions but {colors} colors")]
    ColorCountMismatch { positions: usize, colors: usize },
    #[error("mesh has {0} vertices, more than a single draw can address")]
    TooLarge(usize),
}

/// Static triangle-list geometry: positions plus an optional parallel color array.
///
/// Invariant: when colors are present there is exactly one per position.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    positions: Vec<[f32; 3]>,
    colors: Option<Vec<[f32; 3]>>,
}

impl Mesh {
    /// Build a mesh, rejecting empty geometry and mismatched color arrays.
    pub fn new(positions: Vec<[f32; 3]>, colors: Option<Vec<[f32; 3]>>) -> Result<Self, MeshError> {
        if positions.is_empty() {
            return Err(MeshError::Empty);
        }
        if u32::try_from(positions.len()).is_err() {
            return Err(MeshError::TooLarge(positions.len()));
        }
        if let Some(colors) = &colors {
            if colors.len() != positions.len() {
                return Err(MeshError::ColorCountMismatch {
                    positions: positions.len(),
                    colors: colors.len(),
                });
            }
        }
        Ok(Self { positions, colors })
    }

    /// Positions only, no per-vertex color.
    pub fn from_positions(positions: Vec<[f32; 3]>) -> Result<Self, MeshError> {
        Self::new(positions, None)
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn colors(&self) -> Option<&[[f32; 3]]> {
        self.colors.as_deref()
    }

    /// Positions as a flat float array, three floats per vertex.
    pub fn position_data(&self) -> &[f32] {
        self.positions.as_flattened()
    }

    /// Colors as a flat float array, three floats per vertex.
    pub fn color_data(&self) -> Option<&[f32]> {
        self.colors.as_deref().map(<[[f32; 3]]>::as_flattened)
    }

    /// Number of vertices a draw call must cover.
    pub fn vertex_count(&self) -> u32 {
        // Bounded by the check in `new`.
        self.positions.len() as u32
    }

    /// The single triangle used by smoke tests.
    pub fn triangle() -> Self {
        Self {
            positions: vec![[0.0, 1.0, 0.0], [1.0, -1.0, 0.0], [-1.0, -1.0, 0.0]],
            colors: Some(vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]),
        }
    }

    /// Twelve triangles forming a 2x2x2 cube centered on the origin, one color per vertex.
    pub fn cube() -> Self {
        #[rustfmt::skip]
        let positions = vec![
            [-1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [-1.0,  1.0,  1.0],
            [ 1.0,  1.0, -1.0], [-1.0, -1.0, -1.0], [-1.0,  1.0, -1.0],
            [ 1.0, -1.0,  1.0], [-1.0, -1.0, -1.0], [ 1.0, -1.0, -1.0],
            [ 1.0,  1.0, -1.0], [ 1.0, -1.0, -1.0], [-1.0, -1.0, -1.0],
            [-1.0, -1.0, -1.0], [-1.0,  1.0,  1.0], [-1.0,  1.0, -1.0],
            [ 1.0, -1.0,  1.0], [-1.0, -1.0,  1.0], [-1.0, -1.0, -1.0],
            [-1.0,  1.0,  1.0], [-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0],
            [ 1.0,  1.0,  1.0], [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0],
            [ 1.0, -1.0, -1.0], [ 1.0,  1.0,  1.0], [ 1.0, -1.0,  1.0],
            [ 1.0,  1.0,  1.0], [ 1.0,  1.0, -1.0], [-1.0,  1.0, -1.0],
            [ 1.0,  1.0,  1.0], [-1.0,  1.0, -1.0], [-1.0,  1.0,  1.0],
            [ 1.0,  1.0,  1.0], [-1.0,  1.0,  1.0], [ 1.0, -1.0,  1.0],
        ];
        #[rustfmt::skip]
        let colors = vec![
            [0.583, 0.771, 0.014], [0.609, 0.115, 0.436], [0.327, 0.483, 0.844],
            [0.822, 0.569, 0.201], [0.435, 0.602, 0.223], [0.310, 0.747, 0.185],
            [0.597, 0.770, 0.761], [0.559, 0.436, 0.730], [0.359, 0.583, 0.152],
            [0.483, 0.596, 0.789], [0.559, 0.861, 0.639], [0.195, 0.548, 0.859],
            [0.014, 0.184, 0.576], [0.771, 0.328, 0.970], [0.406, 0.615, 0.116],
            [0.676, 0.977, 0.133], [0.971, 0.572, 0.833], [0.140, 0.616, 0.489],
            [0.997, 0.513, 0.064], [0.945, 0.719, 0.592], [0.543, 0.021, 0.978],
            [0.279, 0.317, 0.505], [0.167, 0.620, 0.077], [0.347, 0.857, 0.137],
            [0.055, 0.953, 0.042], [0.714, 0.505, 0.345], [0.783, 0.290, 0.734],
            [0.722, 0.645, 0.174], [0.302, 0.455, 0.848], [0.225, 0.587, 0.040],
            [0.517, 0.713, 0.338], [0.053, 0.959, 0.120], [0.393, 0.621, 0.362],
            [0.673, 0.211, 0.457], [0.820, 0.883, 0.371], [0.982, 0.099, 0.879],
        ];
        Self {
            positions,
            colors: Some(colors),
        }
    }
}

/// Named built-in meshes selectable from scene configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshPreset {
    #[default]
    Cube,
    Triangle,
}

impl MeshPreset {
    pub fn build(self) -> Mesh {
        match self {
            MeshPreset::Cube => Mesh::cube(),
            MeshPreset::Triangle => Mesh::triangle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_color_count_mismatch() {
        let err = Mesh::new(
            vec![[0.0; 3], [1.0; 3], [2.0; 3]],
            Some(vec![[1.0, 0.0, 0.0]]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            MeshError::ColorCountMismatch {
                positions: 3,
                colors: 1
            }
        );
    }

    #[test]
    fn rejects_empty_mesh() {
        assert_eq!(Mesh::from_positions(Vec::new()), Err(MeshError::Empty));
    }

    #[test]
    fn positions_only_mesh_has_no_colors() {
        let mesh = Mesh::from_positions(vec![[0.0, 1.0, 0.0], [1.0, -1.0, 0.0], [-1.0, -1.0, 0.0]])
            .unwrap();
        assert_eq!(mesh.vertex_count(), 3);
        assert!(mesh.colors().is_none());
        assert!(mesh.color_data().is_none());
    }

    #[test]
    fn flat_data_is_three_floats_per_vertex() {
        let mesh = Mesh::triangle();
        assert_eq!(mesh.position_data().len(), 9);
        assert_eq!(mesh.color_data().unwrap().len(), 9);
        assert_eq!(&mesh.position_data()[..3], &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn cube_preset_is_twelve_triangles() {
        let cube = MeshPreset::Cube.build();
        assert_eq!(cube.vertex_count(), 36);
        assert_eq!(cube.colors().unwrap().len(), 36);
        // Re-validating the preset through the checked constructor must succeed.
        assert!(Mesh::new(cube.positions().to_vec(), cube.colors().map(<[_]>::to_vec)).is_ok());
    }
}
