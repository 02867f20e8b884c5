use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use glint_common::Viewport;
use glint_ecs::UniformType;
use std::borrow::Cow;

/// A typed value ready to be written to a uniform location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    Int(i32),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            Self::Float(_) => UniformType::Float,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Mat3(_) => UniformType::Mat3,
            Self::Mat4(_) => UniformType::Mat4,
            Self::Int(_) => UniformType::Int,
        }
    }

    /// Whether this value can be written to a uniform declared as `ty`.
    /// Samplers take the integer texture unit.
    pub fn fits(&self, ty: UniformType) -> bool {
        match (self, ty) {
            (Self::Int(_), UniformType::Sampler) => true,
            _ => self.ty() == ty,
        }
    }

    /// Column-major scalars. Integers are widened to `f32`.
    pub fn to_floats(&self) -> Vec<f32> {
        match self {
            Self::Float(v) => vec![*v],
            Self::Vec2(v) => v.to_array().to_vec(),
            Self::Vec3(v) => v.to_array().to_vec(),
            Self::Vec4(v) => v.to_array().to_vec(),
            Self::Mat3(m) => m.to_cols_array().to_vec(),
            Self::Mat4(m) => m.to_cols_array().to_vec(),
            Self::Int(v) => vec![*v as f32],
        }
    }

    /// Builds a value of type `ty` from exactly `ty.component_count()` scalars.
    pub fn from_floats(ty: UniformType, floats: &[f32]) -> Option<Self> {
        if floats.len() != ty.component_count() {
            return None;
        }
        Some(match ty {
            UniformType::Float => Self::Float(floats[0]),
            UniformType::Vec2 => Self::Vec2(Vec2::from_slice(floats)),
            UniformType::Vec3 => Self::Vec3(Vec3::from_slice(floats)),
            UniformType::Vec4 => Self::Vec4(Vec4::from_slice(floats)),
            UniformType::Mat3 => Self::Mat3(Mat3::from_cols_slice(floats)),
            UniformType::Mat4 => Self::Mat4(Mat4::from_cols_slice(floats)),
            UniformType::Int | UniformType::Sampler => Self::Int(floats[0] as i32),
        })
    }
}

/// Output of an entity resolver: a single scalar, a run of floats (one
/// entity-wide value or one value per vertex), or a ready uniform value.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderValue<'e> {
    Scalar(f32),
    Floats(Cow<'e, [f32]>),
    Uniform(UniformValue),
}

impl<'e> ShaderValue<'e> {
    pub fn borrowed(floats: &'e [f32]) -> Self {
        Self::Floats(Cow::Borrowed(floats))
    }

    pub fn owned(floats: Vec<f32>) -> Self {
        Self::Floats(Cow::Owned(floats))
    }

    pub fn as_floats(&self) -> Cow<'_, [f32]> {
        match self {
            Self::Scalar(v) => Cow::Owned(vec![*v]),
            Self::Floats(floats) => Cow::Borrowed(floats.as_ref()),
            Self::Uniform(value) => Cow::Owned(value.to_floats()),
        }
    }
}

/// Per-draw global state the static resolvers read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    pub projection: Mat4,
    pub view: Mat4,
    pub texture_unit: Option<u32>,
    pub viewport: Viewport,
    pub elapsed_ms: f32,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            texture_unit: None,
            viewport: Viewport::default(),
            elapsed_ms: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_accepts_int() {
        assert!(UniformValue::Int(3).fits(UniformType::Sampler));
        assert!(!UniformValue::Float(3.0).fits(UniformType::Sampler));
        assert!(UniformValue::Vec4(Vec4::ONE).fits(UniformType::Vec4));
    }

    #[test]
    fn from_floats_checks_length() {
        assert_eq!(
            UniformValue::from_floats(UniformType::Vec2, &[1.0, 2.0]),
            Some(UniformValue::Vec2(Vec2::new(1.0, 2.0)))
        );
        assert!(UniformValue::from_floats(UniformType::Vec3, &[1.0, 2.0]).is_none());
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let floats = UniformValue::Mat4(m).to_floats();
        assert_eq!(
            UniformValue::from_floats(UniformType::Mat4, &floats),
            Some(UniformValue::Mat4(m))
        );
    }

    #[test]
    fn shader_value_floats() {
        let data = [1.0, 2.0];
        assert_eq!(ShaderValue::borrowed(&data).as_floats().as_ref(), &data);
        assert_eq!(ShaderValue::Scalar(4.0).as_floats().as_ref(), &[4.0]);
        assert_eq!(
            ShaderValue::Uniform(UniformValue::Vec2(Vec2::ONE)).as_floats().len(),
            2
        );
    }
}
