use glam::{Mat4, Vec3};

/// Projection, view and model matrices consumed by the shader program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSet {
    pub projection: Mat4,
    pub view: Mat4,
    pub model: Mat4,
}

impl TransformSet {
    pub const IDENTITY: Self = Self {
        projection: Mat4::IDENTITY,
        view: Mat4::IDENTITY,
        model: Mat4::IDENTITY,
    };

    /// `projection * view * model`, for shaders that take a single matrix.
    pub fn mvp(&self) -> Mat4 {
        self.projection * self.view * self.model
    }
}

impl Default for TransformSet {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Inputs for the perspective camera and the model transform.
///
/// `build` is pure: the same inputs always produce bit-identical matrices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformBuilder {
    pub aspect: f32,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub translation: Vec3,
    pub rotation_axis: Vec3,
    pub rotation_degrees: f32,
    pub scale: Vec3,
}

impl Default for TransformBuilder {
    fn default() -> Self {
        Self {
            aspect: 800.0 / 600.0,
            fov_degrees: 80.0,
            near: 0.1,
            far: 100.0,
            eye: Vec3::new(4.0, 3.0, -3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            translation: Vec3::ZERO,
            rotation_axis: Vec3::Z,
            rotation_degrees: 0.0,
            scale: Vec3::splat(2.0),
        }
    }
}

impl TransformBuilder {
    pub fn new(aspect: f32) -> Self {
        Self {
            aspect,
            ..Self::default()
        }
    }

    pub fn camera(mut self, fov_degrees: f32, eye: Vec3, target: Vec3, up: Vec3) -> Self {
        self.fov_degrees = fov_degrees;
        self.eye = eye;
        self.target = target;
        self.up = up;
        self
    }

    pub fn clip_planes(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    pub fn model(mut self, translation: Vec3, rotation_axis: Vec3, rotation_degrees: f32, scale: Vec3) -> Self {
        self.translation = translation;
        self.rotation_axis = rotation_axis;
        self.rotation_degrees = rotation_degrees;
        self.scale = scale;
        self
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// `translate * rotate * scale`. A zero-length axis means no rotation.
    pub fn model_matrix(&self) -> Mat4 {
        let translate = Mat4::from_translation(self.translation);
        let axis = self.rotation_axis.normalize_or_zero();
        let rotate = if axis == Vec3::ZERO {
            Mat4::IDENTITY
        } else {
            Mat4::from_axis_angle(axis, self.rotation_degrees.to_radians())
        };
        let scale = Mat4::from_scale(self.scale);
        translate * rotate * scale
    }

    pub fn build(&self) -> TransformSet {
        TransformSet {
            projection: self.projection_matrix(),
            view: self.view_matrix(),
            model: self.model_matrix(),
        }
    }
}
