//! Content manifest (`modpack.toml`) types
//!
//! The manifest names the content set and carries everything that is global
//! to a session: rules, the player roster, the terrain layout, and the
//! entities present when the session starts.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::core::error::ConfigurationError;
use crate::core::types::{PlayerId, TeamId};
use crate::data::schema::ComponentValue;

/// Root structure of the manifest file
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub info: ModInfo,
    #[serde(default)]
    pub rules: GameRules,
    #[serde(default)]
    pub players: Vec<PlayerDef>,
    pub terrain: TerrainDef,
    #[serde(default)]
    pub start: Vec<StartEntity>,
}

/// Content set metadata
#[derive(Debug, Clone, Deserialize)]
pub struct ModInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Template directory, relative to the root directory
    #[serde(default = "default_templates_dir")]
    pub templates: String,
}

fn default_templates_dir() -> String {
    "templates".to_string()
}

/// Global rule parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameRules {
    /// Seed for every random choice the simulation makes
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub victory: VictoryCondition,
}

/// How a session is decided
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VictoryCondition {
    /// Sandbox; the session never ends on its own
    #[default]
    None,
    /// Last team with live entities wins
    Annihilation,
    /// Highest team score when the limit is reached
    TimeLimit { seconds: f64 },
}

/// One entry of the player roster
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerDef {
    pub id: PlayerId,
    pub name: String,
    pub team: TeamId,
}

/// Terrain layout
#[derive(Debug, Clone, Deserialize)]
pub struct TerrainDef {
    pub width: u32,
    pub height: u32,
    /// Tile kind covering the map before regions are applied
    pub fill: String,
    /// World units per tile
    #[serde(default = "default_tile_size")]
    pub tile_size: f32,
    pub tiles: Vec<TileKindDef>,
    #[serde(default)]
    pub regions: Vec<RegionDef>,
}

fn default_tile_size() -> f32 {
    1.0
}

/// A tile kind in the terrain palette
#[derive(Debug, Clone, Deserialize)]
pub struct TileKindDef {
    pub id: String,
    #[serde(default = "default_passable")]
    pub passable: bool,
}

fn default_passable() -> bool {
    true
}

/// Inclusive rectangle painted with one tile kind
#[derive(Debug, Clone, Deserialize)]
pub struct RegionDef {
    pub tile: String,
    pub min: [i32; 2],
    pub max: [i32; 2],
    #[serde(default)]
    pub height: Option<f32>,
}

/// Entity present at session start
#[derive(Debug, Clone, Deserialize)]
pub struct StartEntity {
    pub template: String,
    pub at: [i32; 2],
    #[serde(default)]
    pub owner: Option<PlayerId>,
    #[serde(default)]
    pub overrides: BTreeMap<String, ComponentValue>,
}

impl Manifest {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerDef> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Validate roster and rules; terrain is checked when it is built
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (i, player) in self.players.iter().enumerate() {
            if self.players[..i].iter().any(|p| p.id == player.id) {
                return Err(ConfigurationError::InvalidSchema {
                    template: self.info.name.clone(),
                    reason: format!("duplicate player id {}", player.id),
                });
            }
        }

        if let VictoryCondition::TimeLimit { seconds } = self.rules.victory {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(ConfigurationError::InvalidSchema {
                    template: self.info.name.clone(),
                    reason: format!("time limit {} must be > 0", seconds),
                });
            }
        }

        Ok(())
    }
}
