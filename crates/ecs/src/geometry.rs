use crate::error::EcsError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Primitive topology used when drawing a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

/// Vertex positions plus optional texture coordinates for one model.
///
/// Positions are `vertex_size` floats per vertex; texture coordinates are two
/// floats per vertex with v pointing up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    vertices: Vec<f32>,
    vertex_size: usize,
    vertex_count: usize,
    draw_mode: DrawMode,
    tex_coords: Option<Vec<f32>>,
}

impl Geometry {
    pub fn new(vertices: Vec<f32>, vertex_size: usize, draw_mode: DrawMode) -> Result<Self, EcsError> {
        if vertex_size == 0 || vertices.is_empty() || vertices.len() % vertex_size != 0 {
            return Err(EcsError::InvalidGeometry(format!(
                "{} floats do not divide into vertices of size {vertex_size}",
                vertices.len()
            )));
        }
        Ok(Self {
            vertex_count: vertices.len() / vertex_size,
            vertices,
            vertex_size,
            draw_mode,
            tex_coords: None,
        })
    }

    pub fn with_tex_coords(mut self, tex_coords: Vec<f32>) -> Result<Self, EcsError> {
        if tex_coords.len() != self.vertex_count * 2 {
            return Err(EcsError::InvalidGeometry(format!(
                "expected {} texture coordinates, got {}",
                self.vertex_count * 2,
                tex_coords.len()
            )));
        }
        self.tex_coords = Some(tex_coords);
        Ok(self)
    }

    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn vertex_size(&self) -> usize {
        self.vertex_size
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    pub fn tex_coords(&self) -> Option<&[f32]> {
        self.tex_coords.as_deref()
    }

    /// Unit square spanning -1..1, drawn as a 4-vertex strip.
    pub fn square() -> Arc<Self> {
        Arc::new(Self {
            vertices: vec![-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0],
            vertex_size: 2,
            vertex_count: 4,
            draw_mode: DrawMode::TriangleStrip,
            tex_coords: Some(vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]),
        })
    }

    pub fn triangle() -> Arc<Self> {
        Arc::new(Self {
            vertices: vec![-1.0, -1.0, 1.0, -1.0, 0.0, 1.0],
            vertex_size: 2,
            vertex_count: 3,
            draw_mode: DrawMode::Triangles,
            tex_coords: Some(vec![0.0, 0.0, 1.0, 0.0, 0.5, 1.0]),
        })
    }

    /// Cube spanning -1..1 on every axis, 36 vertices as a triangle list.
    pub fn cube() -> Arc<Self> {
        // Each face: outward normal axis, sign, and the two in-plane axes.
        const FACES: [(usize, f32, usize, usize); 6] = [
            (0, 1.0, 2, 1),
            (0, -1.0, 2, 1),
            (1, 1.0, 0, 2),
            (1, -1.0, 0, 2),
            (2, 1.0, 0, 1),
            (2, -1.0, 0, 1),
        ];
        const CORNERS: [(f32, f32); 6] = [
            (-1.0, -1.0),
            (1.0, -1.0),
            (1.0, 1.0),
            (-1.0, -1.0),
            (1.0, 1.0),
            (-1.0, 1.0),
        ];

        let mut vertices = Vec::with_capacity(36 * 3);
        let mut tex_coords = Vec::with_capacity(36 * 2);
        for (normal, sign, u_axis, v_axis) in FACES {
            for (u, v) in CORNERS {
                let mut p = [0.0f32; 3];
                p[normal] = sign;
                p[u_axis] = u;
                p[v_axis] = v;
                vertices.extend_from_slice(&p);
                tex_coords.extend_from_slice(&[(u + 1.0) * 0.5, (v + 1.0) * 0.5]);
            }
        }

        Arc::new(Self {
            vertices,
            vertex_size: 3,
            vertex_count: 36,
            draw_mode: DrawMode::Triangles,
            tex_coords: Some(tex_coords),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_consistent() {
        for g in [Geometry::square(), Geometry::triangle(), Geometry::cube()] {
            assert_eq!(g.vertices().len(), g.vertex_size() * g.vertex_count());
            assert_eq!(g.tex_coords().unwrap().len(), g.vertex_count() * 2);
        }
        assert_eq!(Geometry::square().vertex_count(), 4);
        assert_eq!(Geometry::square().draw_mode(), DrawMode::TriangleStrip);
        assert_eq!(Geometry::cube().vertex_count(), 36);
    }

    #[test]
    fn cube_stays_in_unit_bounds() {
        let cube = Geometry::cube();
        assert!(cube.vertices().iter().all(|v| v.abs() == 1.0));
        assert!(cube.tex_coords().unwrap().iter().all(|t| (0.0..=1.0).contains(t)));
    }

    #[test]
    fn new_rejects_ragged_vertices() {
        assert!(Geometry::new(vec![0.0; 5], 2, DrawMode::Lines).is_err());
        assert!(Geometry::new(vec![], 2, DrawMode::Lines).is_err());
        let g = Geometry::new(vec![0.0; 6], 3, DrawMode::Lines).unwrap();
        assert_eq!(g.vertex_count(), 2);
        assert!(g.clone().with_tex_coords(vec![0.0; 3]).is_err());
        assert!(g.with_tex_coords(vec![0.0; 4]).is_ok());
    }
}
