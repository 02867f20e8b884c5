use crate::component::ComponentKind;

#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    #[error("{context}: entity '{tag}' has no {kind} component")]
    MissingComponent {
        context: &'static str,
        kind: ComponentKind,
        tag: String,
    },

    #[error("unknown component kind '{0}'")]
    UnknownComponent(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}
