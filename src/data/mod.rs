//! Data-driven content: entity templates, rules, roster and terrain layout
//! loaded from TOML.

pub mod database;
pub mod manifest;
pub mod schema;

pub use database::ContentDatabase;
pub use manifest::{
    GameRules, Manifest, PlayerDef, RegionDef, StartEntity, TerrainDef, TileKindDef,
    VictoryCondition,
};
pub use schema::{ComponentType, ComponentValue, EntityKind, EntityTemplate};
