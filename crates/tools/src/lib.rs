//! Developer tooling: a read-only inspector over managers and the renderer,
//! and the demo scene the apps run.
//!
//! # Invariants
//! - The inspector never mutates what it inspects.
//! - The demo scene only uses public engine API.

pub mod demo;
mod inspector;

pub use demo::DemoScene;
pub use inspector::{
    BucketSummary, EntityInfo, GameSummary, Inspector, ManagerSummary, RendererSummary,
};

pub fn crate_info() -> &'static str {
    "glint-tools v0.1.0"
}
