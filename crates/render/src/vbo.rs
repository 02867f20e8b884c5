use glint_ecs::DrawMode;

/// CPU-side copy of one interleaved vertex buffer.
///
/// `changed` is set whenever `data` is rebuilt and cleared once the buffer
/// has been drawn; the renderer only re-uploads while it is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Vbo {
    pub name: String,
    pub data: Vec<f32>,
    pub vertex_size: usize,
    pub vertex_count: usize,
    pub draw_mode: DrawMode,
    pub changed: bool,
}

impl Vbo {
    pub fn new(
        name: impl Into<String>,
        data: Vec<f32>,
        vertex_size: usize,
        vertex_count: usize,
        draw_mode: DrawMode,
    ) -> Self {
        Self {
            name: name.into(),
            data,
            vertex_size,
            vertex_count,
            draw_mode,
            changed: true,
        }
    }

    /// Number of entities whose vertices the buffer holds.
    pub fn entity_count(&self) -> usize {
        let per_entity = self.vertex_size * self.vertex_count;
        if per_entity == 0 { 0 } else { self.data.len() / per_entity }
    }
}
