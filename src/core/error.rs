use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::{EntityId, PlayerId, TileCoord};

/// Top-level error type for session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Placement error: {0}")]
    Placement(#[from] PlacementError),

    #[error("Entity not found: {0}")]
    NotFound(EntityId),

    #[error("Schema violation: {0}")]
    SchemaViolation(#[from] SchemaViolation),
}

impl SessionError {
    /// Short machine-friendly label, used in diagnostics output
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Configuration(_) => "configuration",
            SessionError::Initialization(_) => "initialization",
            SessionError::Placement(_) => "placement",
            SessionError::NotFound(_) => "not_found",
            SessionError::SchemaViolation(_) => "schema_violation",
        }
    }
}

/// Errors while loading content or session configuration
///
/// Always fatal to session construction.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Required content missing: {0}")]
    Missing(PathBuf),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {origin}: {source}")]
    Toml {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Template '{template}' has invalid schema: {reason}")]
    InvalidSchema { template: String, reason: String },

    #[error("Template '{0}' is defined more than once")]
    DuplicateTemplate(String),

    #[error("No entity templates found under {0}")]
    NoTemplates(PathBuf),

    #[error("Invalid terrain definition: {0}")]
    InvalidTerrain(String),

    #[error("Start entity {index} ('{template}') could not be created: {reason}")]
    InvalidStart {
        index: usize,
        template: String,
        reason: String,
    },

    #[error("Invalid session config: {0}")]
    InvalidConfig(String),
}

/// Spawn or terrain placement was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    #[error("{0} is outside the terrain")]
    OutOfBounds(TileCoord),

    #[error("{0} is impassable")]
    Impassable(TileCoord),

    #[error("{coord} is occupied by {by}")]
    Occupied { coord: TileCoord, by: EntityId },

    #[error("no free tile within {radius} of {origin}")]
    NoFreeTile { origin: TileCoord, radius: i32 },

    #[error("world is full ({0} entities)")]
    WorldFull(usize),
}

/// A value or lookup fell outside the contract declared by the content data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("template '{template}' declares no component '{component}'")]
    UnknownComponent { template: String, component: String },

    #[error("component '{component}' of '{template}' expects {expected}, got {found}")]
    TypeMismatch {
        template: String,
        component: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("component '{component}' of '{template}' value {value} outside [{min}, {max}]")]
    OutOfRange {
        template: String,
        component: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("component '{component}' of '{template}' does not allow '{value}'")]
    NotAllowed {
        template: String,
        component: String,
        value: String,
    },

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("unknown tile kind '{0}'")]
    UnknownTileKind(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(SessionError::NotFound(EntityId(3)).kind(), "not_found");
        let err: SessionError = PlacementError::Impassable(TileCoord::new(1, 2)).into();
        assert_eq!(err.kind(), "placement");
        assert_eq!(err.to_string(), "Placement error: (1, 2) is impassable");
    }

    #[test]
    fn test_schema_violation_message() {
        let v = SchemaViolation::UnknownComponent {
            template: "villager".into(),
            component: "mana".into(),
        };
        assert_eq!(
            v.to_string(),
            "template 'villager' declares no component 'mana'"
        );
    }
}
