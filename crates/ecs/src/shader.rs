use serde::{Deserialize, Serialize};

/// Normalized name of the attribute that is routed through the texture atlas.
pub const TEX_COORD_VARIABLE: &str = "TexCoord";

/// Strips a one-character prefix and underscore: `a_Position` → `Position`,
/// `u_Color` → `Color`. Names without such a prefix are returned unchanged.
pub fn normalize_variable_name(name: &str) -> &str {
    match name.split_once('_') {
        Some((prefix, rest)) if prefix.len() == 1 && !rest.is_empty() => rest,
        _ => name,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Int,
    Sampler,
}

impl UniformType {
    /// Number of scalars in a value of this type.
    pub fn component_count(self) -> usize {
        match self {
            Self::Float | Self::Int | Self::Sampler => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }
}

/// When a uniform changes: once per draw call, or once per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variation {
    Static,
    Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformSpec {
    pub name: String,
    pub ty: UniformType,
    pub variation: Variation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexShaderSpec {
    pub source: String,
    pub attributes: Vec<AttributeSpec>,
    pub uniforms: Vec<UniformSpec>,
}

impl VertexShaderSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, size: usize) -> Self {
        self.attributes.push(AttributeSpec {
            name: name.into(),
            size,
        });
        self
    }

    pub fn uniform(mut self, name: impl Into<String>, ty: UniformType, variation: Variation) -> Self {
        self.uniforms.push(UniformSpec {
            name: name.into(),
            ty,
            variation,
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentShaderSpec {
    pub source: String,
    pub uniforms: Vec<UniformSpec>,
}

impl FragmentShaderSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            uniforms: Vec::new(),
        }
    }

    pub fn uniform(mut self, name: impl Into<String>, ty: UniformType, variation: Variation) -> Self {
        self.uniforms.push(UniformSpec {
            name: name.into(),
            ty,
            variation,
        });
        self
    }
}

/// A vertex/fragment pair plus the variables it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderProgramSpec {
    pub name: String,
    pub vertex: VertexShaderSpec,
    pub fragment: FragmentShaderSpec,
}

impl ShaderProgramSpec {
    pub fn new(name: impl Into<String>, vertex: VertexShaderSpec, fragment: FragmentShaderSpec) -> Self {
        Self {
            name: name.into(),
            vertex,
            fragment,
        }
    }

    /// Floats per interleaved vertex: the attribute sizes summed in declared order.
    pub fn vertex_size(&self) -> usize {
        self.vertex.attributes.iter().map(|a| a.size).sum()
    }

    /// Every uniform, vertex stage first. A name declared by both stages is
    /// reported once.
    pub fn uniforms(&self) -> impl Iterator<Item = &UniformSpec> {
        let vertex = &self.vertex.uniforms;
        vertex.iter().chain(
            self.fragment
                .uniforms
                .iter()
                .filter(move |u| !vertex.iter().any(|v| v.name == u.name)),
        )
    }

    pub fn has_entity_uniforms(&self) -> bool {
        self.uniforms().any(|u| u.variation == Variation::Entity)
    }

    pub fn uses_texture_coordinates(&self) -> bool {
        self.vertex
            .attributes
            .iter()
            .any(|a| normalize_variable_name(&a.name) == TEX_COORD_VARIABLE)
    }

    pub fn uses_sampler(&self) -> bool {
        self.uniforms().any(|u| u.ty == UniformType::Sampler)
    }
}
