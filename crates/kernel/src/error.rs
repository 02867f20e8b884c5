use glint_ecs::EcsError;
use glint_render::RenderError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{context}: unknown entity manager '{name}'")]
    UnknownManager { context: &'static str, name: String },

    #[error("{context}: unknown camera '{name}'")]
    UnknownCamera { context: &'static str, name: String },

    #[error("{context}: unknown system '{name}'")]
    UnknownSystem { context: &'static str, name: String },

    #[error("entity manager '{0}' already exists")]
    DuplicateManager(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Component(#[from] EcsError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported config format '{0}' (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("invalid config: {0}")]
    Invalid(String),
}
