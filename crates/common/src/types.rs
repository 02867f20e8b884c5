use glam::{Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an entity.
///
/// Ids are ordered, so an unordered pair of entities can be keyed as
/// `(min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, for log lines and inspector output.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Spatial transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Planar transform: rotation is an angle in radians around +Z.
    pub fn planar(position: Vec2, rotation: f32, scale: Vec2) -> Self {
        Self {
            position: position.extend(0.0),
            rotation: Quat::from_rotation_z(rotation),
            scale: scale.extend(1.0),
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Model matrix (scale, then rotate, then translate).
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_uniqueness() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn entity_id_short_form() {
        let id = EntityId::new();
        assert_eq!(id.short().len(), 8);
        assert_eq!(format!("{id}"), id.short());
    }

    #[test]
    fn transform_default_is_identity() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn planar_transform_lives_on_z_plane() {
        let t = Transform::planar(Vec2::new(3.0, 4.0), 0.0, Vec2::new(2.0, 2.0));
        assert_eq!(t.position, Vec3::new(3.0, 4.0, 0.0));
        assert_eq!(t.scale, Vec3::new(2.0, 2.0, 1.0));
        let corner = t.matrix().transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert!((corner - Vec3::new(5.0, 6.0, 0.0)).length() < 1e-5);
    }
}
