use crate::error::RenderError;
use glam::Vec2;
use glint_ecs::Texture;
use std::path::PathBuf;
use std::sync::Arc;

/// Where an atlas image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    File(PathBuf),
    Rgba {
        width: u32,
        height: u32,
        pixels: Arc<[u8]>,
    },
}

/// A shared image split into a grid of equally sized cells.
///
/// Geometry UVs in 0..1 are remapped into the cell (or span of cells) an
/// entity samples, inset by half a texel so neighbouring cells never bleed in.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureAtlas {
    name: String,
    source: TextureSource,
    width: u32,
    height: u32,
    columns: u32,
    rows: u32,
}

impl TextureAtlas {
    pub fn new(
        name: impl Into<String>,
        source: TextureSource,
        width: u32,
        height: u32,
        columns: u32,
        rows: u32,
    ) -> Result<Self, RenderError> {
        let name = name.into();
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidAtlas {
                name,
                reason: format!("image size {width}x{height} is empty"),
            });
        }
        if columns == 0 || rows == 0 {
            return Err(RenderError::InvalidAtlas {
                name,
                reason: format!("grid {columns}x{rows} has no cells"),
            });
        }
        Ok(Self {
            name,
            source,
            width,
            height,
            columns,
            rows,
        })
    }

    /// Atlas over an in-memory image; the size is taken from the source.
    pub fn from_rgba(
        name: impl Into<String>,
        width: u32,
        height: u32,
        pixels: impl Into<Arc<[u8]>>,
        columns: u32,
        rows: u32,
    ) -> Result<Self, RenderError> {
        let source = TextureSource::Rgba {
            width,
            height,
            pixels: pixels.into(),
        };
        Self::new(name, source, width, height, columns, rows)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Maps `uv` into the atlas region starting at (`column`, `row`) and
    /// covering `column_span` × `row_span` cells. Rows count from the top of
    /// the image while `uv.y` points up.
    pub fn resolve_texture_coordinates(
        &self,
        uv: Vec2,
        column: u32,
        row: u32,
        column_span: u32,
        row_span: u32,
    ) -> Vec2 {
        let cell_w = 1.0 / self.columns as f32;
        let cell_h = 1.0 / self.rows as f32;
        let half_u = 0.5 / self.width as f32;
        let half_v = 0.5 / self.height as f32;

        let u = column as f32 * cell_w + half_u + uv.x * (column_span as f32 * cell_w - 2.0 * half_u);
        let v = row as f32 * cell_h + half_v + (1.0 - uv.y) * (row_span as f32 * cell_h - 2.0 * half_v);
        Vec2::new(u.max(0.0), v.max(0.0))
    }

    pub fn resolve_for(&self, texture: &Texture, uv: Vec2) -> Vec2 {
        self.resolve_texture_coordinates(
            uv,
            texture.column,
            texture.row,
            texture.column_span,
            texture.row_span,
        )
    }
}
