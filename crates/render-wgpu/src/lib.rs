//! wgpu implementation of the glint graphics backend.
//!
//! [`WgpuBackend`] replays the renderer's bind-then-draw calls as wgpu render
//! pipelines and a single render pass per frame. The built-in programs in
//! [`shaders`] are WGSL; each program's uniform block is derived from its
//! declared uniforms by [`UniformBlock`].
//!
//! # Invariants
//! - Uniform values are snapshotted at every draw, so per-entity uniforms never
//!   leak into another entity's draw.
//! - A program's WGSL prelude and the bytes the backend uploads share one
//!   layout.
//! - Nothing is presented; the caller owns the surface and presents after
//!   `end_frame`.

mod gpu;
mod layout;
pub mod shaders;

pub use gpu::WgpuBackend;
pub use layout::{TEXTURE_GROUP, UNIFORM_GROUP, UniformBlock, UniformField, write_value};
pub use shaders::builtin_programs;

pub fn crate_info() -> &'static str {
    "glint-render-wgpu v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("wgpu"));
    }
}
