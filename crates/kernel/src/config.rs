use crate::error::ConfigError;
use glint_common::Viewport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Atlas image and grid attached to an entity manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasConfig {
    pub name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub columns: u32,
    pub rows: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub name: String,
    pub camera: String,
    #[serde(default)]
    pub atlas: Option<AtlasConfig>,
}

/// Startup settings for a [`Game`](crate::Game). Every field has a default,
/// so a config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub clear_color: [f32; 4],
    pub texture_base_unit: u32,
    /// Frame deltas above this are clamped so a stall does not tunnel
    /// bodies through each other.
    pub max_frame_delta_ms: f32,
    pub log_filter: Option<String>,
    pub managers: Vec<ManagerConfig>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            title: "glint".to_string(),
            width: 1280,
            height: 720,
            clear_color: [0.05, 0.05, 0.08, 1.0],
            texture_base_unit: 0,
            max_frame_delta_ms: 100.0,
            log_filter: None,
            managers: Vec::new(),
        }
    }
}

impl GameConfig {
    /// Reads a `.yaml`/`.yml` or `.json` file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        let config: Self = match ext.as_deref() {
            Some("yaml" | "yml") => serde_yaml::from_str(&text)?,
            Some("json") => serde_json::from_str(&text)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        config.validate()?;
        tracing::debug!(path = %path.display(), managers = config.managers.len(), "config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "viewport must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if self.max_frame_delta_ms.is_nan() || self.max_frame_delta_ms <= 0.0 {
            return Err(ConfigError::Invalid("max_frame_delta_ms must be positive".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for manager in &self.managers {
            if !seen.insert(manager.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "entity manager '{}' is listed twice",
                    manager.name
                )));
            }
            if let Some(atlas) = &manager.atlas {
                if atlas.columns == 0 || atlas.rows == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "atlas '{}' needs at least one column and row",
                        atlas.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height)
    }
}
