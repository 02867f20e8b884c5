//! Engine kernel: entity managers, vertex batching, cameras, systems and the
//! frame loop.
//!
//! An [`EntityManager`] groups the renderable entities it owns by shader
//! program and model, compiles each group into one interleaved vertex buffer
//! and hands those buffers to the [`Renderer`](glint_render::Renderer).
//! [`Game`] owns the renderer and drives every manager and [`System`] once per
//! frame.
//!
//! # Invariants
//! - Additions and removals are staged; a manager's membership only changes
//!   inside `tick`.
//! - A vertex buffer exists exactly for each non-empty (program, model) group
//!   and is rebuilt whenever that group's membership changes.
//! - Cached filter results stay valid until the next applied addition or
//!   removal.

mod camera;
mod collision;
mod compile;
mod config;
mod error;
mod filter;
mod game;
mod manager;
mod physics;
mod system;

pub use camera::{Camera, Follow};
pub use collision::{Aabb, CollisionEvent, CollisionListener, CollisionSystem};
pub use compile::compile_vertices;
pub use config::{AtlasConfig, GameConfig, ManagerConfig};
pub use error::{ConfigError, EngineError};
pub use filter::{FilterCache, FilterKey};
pub use game::{Clock, FixedClock, Game, WallClock};
pub use manager::{EntityManager, PairKey};
pub use physics::{PhysicsSystem, integrate};
pub use system::{ManagerSet, System};

pub fn crate_info() -> &'static str {
    "glint-kernel v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("kernel"));
    }
}
