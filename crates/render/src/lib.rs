//! Backend-agnostic renderer.
//!
//! [`Renderer`] turns compiled vertex buffers plus the entities they were
//! built from into backend calls: program and buffer binds, texture binds,
//! uniform uploads and draws. Shader variables are resolved by name through
//! [`ShaderVariableResolver`]. Texture atlases remap geometry UVs into grid
//! cells of a shared image.
//!
//! # Invariants
//! - Redundant state changes are skipped: a program, buffer or texture that is
//!   already active is not rebound.
//! - A vertex buffer is uploaded only while its `changed` flag is set.
//! - Static uniforms are written once per draw request; entity uniforms once
//!   per entity, immediately before that entity's draw.
//!
//! # Backends
//! [`HeadlessBackend`] records every call and is what tests and the CLI run
//! on. The wgpu backend lives in `glint-render-wgpu` and implements the same
//! [`GraphicsBackend`] trait.

mod atlas;
mod backend;
mod error;
mod headless;
mod loader;
mod renderer;
mod resolver;
mod value;
mod vbo;

pub use atlas::{TextureAtlas, TextureSource};
pub use backend::{
    AttributeLocation, BackendError, BufferHandle, GraphicsBackend, ProgramHandle, ShaderHandle,
    TextureHandle, UniformLocation,
};
pub use error::RenderError;
pub use headless::{BackendCall, HeadlessBackend};
pub use loader::{DecodedImage, LoadResult, TextureLoader};
pub use renderer::{FrameStats, PLACEHOLDER_RGBA, Renderer, RendererConfig};
pub use resolver::ShaderVariableResolver;
pub use value::{RenderContext, ShaderValue, UniformValue};
pub use vbo::Vbo;

pub fn crate_info() -> &'static str {
    "glint-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
