use glam::{Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Size of the render target in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Capability trait that lets cameras and transforms be written once for
/// both planar and spatial scenes.
pub trait Dimension: Copy + Default + Debug + 'static {
    const NAME: &'static str;

    type Vector: Copy + Default + PartialEq + Debug;
    type Rotation: Copy + PartialEq + Debug;

    fn identity_rotation() -> Self::Rotation;
    fn to_vec3(v: Self::Vector) -> Vec3;
    fn from_vec3(v: Vec3) -> Self::Vector;
    fn to_quat(r: Self::Rotation) -> Quat;

    /// Projection for the given viewport. `zoom` > 1 magnifies.
    fn projection(viewport: Viewport, zoom: f32) -> Mat4;
}

/// Planar scenes: pixel-unit orthographic projection centered on the camera.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dim2;

/// Spatial scenes: perspective projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dim3;

const NEAR_2D: f32 = -1000.0;
const FAR_2D: f32 = 1000.0;
const FOV_3D: f32 = std::f32::consts::FRAC_PI_3;
const NEAR_3D: f32 = 0.1;
const FAR_3D: f32 = 1000.0;

impl Dimension for Dim2 {
    const NAME: &'static str = "2d";

    type Vector = Vec2;
    type Rotation = f32;

    fn identity_rotation() -> f32 {
        0.0
    }

    fn to_vec3(v: Vec2) -> Vec3 {
        v.extend(0.0)
    }

    fn from_vec3(v: Vec3) -> Vec2 {
        v.truncate()
    }

    fn to_quat(r: f32) -> Quat {
        Quat::from_rotation_z(r)
    }

    fn projection(viewport: Viewport, zoom: f32) -> Mat4 {
        let zoom = zoom.max(f32::EPSILON);
        let half_w = viewport.width.max(1) as f32 / (2.0 * zoom);
        let half_h = viewport.height.max(1) as f32 / (2.0 * zoom);
        Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, NEAR_2D, FAR_2D)
    }
}

impl Dimension for Dim3 {
    const NAME: &'static str = "3d";

    type Vector = Vec3;
    type Rotation = Quat;

    fn identity_rotation() -> Quat {
        Quat::IDENTITY
    }

    fn to_vec3(v: Vec3) -> Vec3 {
        v
    }

    fn from_vec3(v: Vec3) -> Vec3 {
        v
    }

    fn to_quat(r: Quat) -> Quat {
        r
    }

    fn projection(viewport: Viewport, zoom: f32) -> Mat4 {
        let fov = (FOV_3D / zoom.max(f32::EPSILON)).clamp(0.01, 3.0);
        Mat4::perspective_rh(fov, viewport.aspect(), NEAR_3D, FAR_3D)
    }
}
