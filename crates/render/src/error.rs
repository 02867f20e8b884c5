use crate::backend::BackendError;
use glint_ecs::{EcsError, ShaderStage, UniformType};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    // Configuration
    #[error("{context}: program '{program}' samples a texture but no texture atlas is set")]
    MissingTextureAtlas {
        context: &'static str,
        program: String,
    },

    #[error("{context}: entity '{tag}' has no texture coordinates for '{variable}'")]
    MissingTextureCoordinates {
        context: &'static str,
        variable: String,
        tag: String,
    },

    #[error(
        "{context}: variable '{variable}' resolved to {found} floats, expected {expected} or {per_vertex}"
    )]
    AttributeSizeMismatch {
        context: &'static str,
        variable: String,
        expected: usize,
        per_vertex: usize,
        found: usize,
    },

    #[error("{context}: uniform '{variable}' expects {expected:?}, resolved {found}")]
    UniformTypeMismatch {
        context: &'static str,
        variable: String,
        expected: UniformType,
        found: String,
    },

    #[error("texture atlas '{name}' is invalid: {reason}")]
    InvalidAtlas { name: String, reason: String },

    #[error(transparent)]
    Component(#[from] EcsError),

    // Lookup
    #[error("{context}: shader variable '{name}' is not registered")]
    UnknownVariable { context: &'static str, name: String },

    #[error("ShaderVariableResolver::register: '{0}' is already registered")]
    VariableAlreadyRegistered(String),

    #[error("ShaderVariableResolver::override: '{0}' is not registered")]
    VariableNotRegistered(String),

    #[error("{context}: unknown shader program '{name}'")]
    UnknownProgram { context: &'static str, name: String },

    #[error("{context}: unknown vbo '{name}'")]
    UnknownVbo { context: &'static str, name: String },

    #[error("{context}: unknown texture '{name}'")]
    UnknownTexture { context: &'static str, name: String },

    #[error("Renderer::create_shader_program: program '{0}' already exists")]
    DuplicateProgram(String),

    #[error("Renderer::create_vbo: vbo '{0}' already exists")]
    DuplicateVbo(String),

    #[error("Renderer::create_texture: texture '{0}' already exists")]
    DuplicateTexture(String),

    #[error("Renderer::create_shader_program: program '{program}' has no location for '{variable}'")]
    MissingLocation { program: String, variable: String },

    // Backend
    #[error("Renderer::create_shader_program: {stage} shader of '{program}' failed to compile: {log}")]
    ShaderCompile {
        program: String,
        stage: ShaderStage,
        log: String,
    },

    #[error("Renderer::create_shader_program: program '{program}' failed to link: {log}")]
    ProgramLink { program: String, log: String },

    #[error("Renderer::poll_textures: texture '{name}' failed to load: {reason}")]
    TextureDecode { name: String, reason: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}
