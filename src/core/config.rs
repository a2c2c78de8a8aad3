//! Session configuration with documented defaults
//!
//! These knobs govern the session kernel itself, not the game rules. Game
//! rules (players, victory conditions, terrain) live in the content manifest.

use std::path::Path;

use serde::Deserialize;

use crate::core::error::ConfigurationError;

/// File name looked up in the root directory for config overrides
pub const CONFIG_FILE: &str = "session.toml";

/// Configuration for one session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the content manifest inside the root directory
    pub manifest: String,

    /// Hard cap on live entities
    ///
    /// Spawns beyond this are rejected with `PlacementError::WorldFull`.
    /// Keeps a runaway spawner from turning every tick into a full-world
    /// scan.
    pub max_entities: usize,

    /// Ring radius searched when a spawner places its output
    ///
    /// At 3, a building can emit units into any free tile within a 7x7
    /// square around itself.
    pub spawn_search_radius: i32,

    /// Number of recent per-tick diagnostics retained in session metadata
    ///
    /// Older entries are dropped first. Everything is also logged through
    /// `tracing`, so this only bounds what readers can inspect later.
    pub diagnostics_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            manifest: "modpack.toml".to_string(),
            max_entities: 10_000,
            spawn_search_radius: 3,
            diagnostics_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `session.toml` from `root`, falling back to defaults if absent
    pub fn load(root: &Path) -> Result<Self, ConfigurationError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigurationError::Io {
            path: path.clone(),
            source,
        })?;
        let config: SessionConfig =
            toml::from_str(&content).map_err(|source| ConfigurationError::Toml {
                origin: path.display().to_string(),
                source,
            })?;
        config.validate().map_err(ConfigurationError::InvalidConfig)?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.manifest.trim().is_empty() {
            return Err("manifest file name must not be empty".into());
        }

        if self.max_entities == 0 {
            return Err("max_entities must be at least 1".into());
        }

        if self.spawn_search_radius < 1 {
            return Err(format!(
                "spawn_search_radius ({}) must be at least 1",
                self.spawn_search_radius
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let config: SessionConfig = toml::from_str("max_entities = 12").unwrap();
        assert_eq!(config.max_entities, 12);
        assert_eq!(config.manifest, "modpack.toml");
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config = SessionConfig {
            max_entities: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = SessionConfig::load(Path::new("does/not/exist")).unwrap();
        assert_eq!(config.spawn_search_radius, 3);
    }
}
