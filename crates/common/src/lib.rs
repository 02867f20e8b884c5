//! Shared types used across the glint crates.
//!
//! # Invariants
//! - `EntityId` is unique per constructed entity and totally ordered.
//! - `Transform` is always stored in 3D; 2D content lives on the z = 0 plane.

mod dimension;
mod types;

pub use dimension::{Dim2, Dim3, Dimension, Viewport};
pub use types::{EntityId, Transform};
