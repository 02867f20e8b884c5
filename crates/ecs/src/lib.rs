//! Entity and component model.
//!
//! An [`Entity`] is an id, a tag and one slot per [`ComponentKind`]. The set of
//! kinds is closed, so component presence is a bitmask test and slot lookup is
//! an array index.
//!
//! # Invariants
//! - An entity holds at most one component of each kind; the last write wins.
//! - `Entity::mask()` always matches the occupied slots.
//! - Behaviors never touch the owning manager directly; they queue spawns and
//!   removals through [`TickContext`].

mod component;
mod entity;
mod error;
mod geometry;
mod shader;

pub use component::{
    BoxCollider, Component, ComponentData, ComponentKind, ComponentMask, FlatColor, Model, Motion,
    MultiColor, Shader, Texture,
};
pub use entity::{Behavior, Entity, EntityCommands, TickContext};
pub use error::EcsError;
pub use geometry::{DrawMode, Geometry};
pub use shader::{
    AttributeSpec, FragmentShaderSpec, ShaderProgramSpec, ShaderStage, TEX_COORD_VARIABLE,
    UniformSpec, UniformType, Variation, VertexShaderSpec, normalize_variable_name,
};

pub use glint_common::{EntityId, Transform};

pub fn crate_info() -> &'static str {
    "glint-ecs v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("ecs"));
    }
}
