//! Terrain: tile kinds, heights, passability and occupancy.
//!
//! Terrain is owned by the universe and borrowed by the world for every
//! operation that touches space. Only the world mutates it, so occupancy
//! can never drift from the entity registry.

pub mod grid;

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use ahash::AHashMap;
use glam::Vec2;
use serde::Serialize;

use crate::core::error::{ConfigurationError, PlacementError};
use crate::core::types::{EntityId, TileCoord};
use crate::data::manifest::TerrainDef;
use crate::render::TerrainConnector;

pub use grid::Grid;

/// Upper bound on `width * height`, checked before any tile is allocated
pub const MAX_TILES: usize = 1 << 24;

/// Index into the terrain's tile-kind palette
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct TileKindId(pub u16);

/// A tile kind resolved from the content manifest
#[derive(Debug, Clone, PartialEq)]
pub struct TileKind {
    pub id: String,
    pub passable: bool,
}

/// One terrain cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Tile {
    pub kind: TileKindId,
    pub height: f32,
}

impl Tile {
    pub fn new(kind: TileKindId, height: f32) -> Self {
        Self { kind, height }
    }
}

pub struct Terrain {
    grid: Grid<Tile>,
    kinds: Vec<TileKind>,
    occupancy: AHashMap<TileCoord, EntityId>,
    /// Tiles modified since the last render flush
    changed: BTreeSet<TileCoord>,
    connector: Option<Weak<dyn TerrainConnector>>,
}

impl Terrain {
    /// Build terrain from its manifest definition
    pub fn from_def(def: &TerrainDef) -> Result<Self, ConfigurationError> {
        if def.width == 0 || def.height == 0 {
            return Err(ConfigurationError::InvalidTerrain(format!(
                "size {}x{} must be non-zero",
                def.width, def.height
            )));
        }
        let (Ok(width), Ok(height)) = (i32::try_from(def.width), i32::try_from(def.height)) else {
            return Err(ConfigurationError::InvalidTerrain(format!(
                "size {}x{} exceeds the coordinate range",
                def.width, def.height
            )));
        };
        let tiles = (def.width as usize).checked_mul(def.height as usize);
        if tiles.map_or(true, |n| n > MAX_TILES) {
            return Err(ConfigurationError::InvalidTerrain(format!(
                "size {}x{} exceeds {} tiles",
                def.width, def.height, MAX_TILES
            )));
        }
        if !def.tile_size.is_finite() || def.tile_size <= 0.0 {
            return Err(ConfigurationError::InvalidTerrain(format!(
                "tile_size {} must be > 0",
                def.tile_size
            )));
        }
        if def.tiles.len() > u16::MAX as usize {
            return Err(ConfigurationError::InvalidTerrain(
                "too many tile kinds".into(),
            ));
        }

        let kinds: Vec<TileKind> = def
            .tiles
            .iter()
            .map(|t| TileKind {
                id: t.id.clone(),
                passable: t.passable,
            })
            .collect();

        let mut terrain = Self {
            grid: Grid::new(def.width as usize, def.height as usize, def.tile_size),
            kinds,
            occupancy: AHashMap::new(),
            changed: BTreeSet::new(),
            connector: None,
        };

        let fill = terrain.kind_id(&def.fill).ok_or_else(|| {
            ConfigurationError::InvalidTerrain(format!("unknown fill tile '{}'", def.fill))
        })?;
        let fill_tile = Tile::new(fill, 0.0);
        for y in 0..height {
            for x in 0..width {
                terrain.grid.set(TileCoord::new(x, y), fill_tile);
            }
        }

        for region in &def.regions {
            let kind = terrain.kind_id(&region.tile).ok_or_else(|| {
                ConfigurationError::InvalidTerrain(format!("unknown region tile '{}'", region.tile))
            })?;
            let (min, max) = (TileCoord::from(region.min), TileCoord::from(region.max));
            if !terrain.in_bounds(min) || !terrain.in_bounds(max) || min.x > max.x || min.y > max.y
            {
                return Err(ConfigurationError::InvalidTerrain(format!(
                    "region {}..{} of '{}' is outside the map",
                    min, max, region.tile
                )));
            }
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    let coord = TileCoord::new(x, y);
                    let height = region
                        .height
                        .unwrap_or_else(|| terrain.height_at(coord).unwrap_or(0.0));
                    terrain.grid.set(coord, Tile::new(kind, height));
                }
            }
        }

        Ok(terrain)
    }

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    pub fn tile_size(&self) -> f32 {
        self.grid.cell_size
    }

    pub fn in_bounds(&self, coord: TileCoord) -> bool {
        self.grid.contains(coord)
    }

    pub fn tile(&self, coord: TileCoord) -> Option<Tile> {
        self.grid.get(coord).copied()
    }

    pub fn kinds(&self) -> &[TileKind] {
        &self.kinds
    }

    pub fn kind_id(&self, name: &str) -> Option<TileKindId> {
        self.kinds
            .iter()
            .position(|k| k.id == name)
            .map(|i| TileKindId(i as u16))
    }

    pub fn kind_at(&self, coord: TileCoord) -> Option<&TileKind> {
        self.tile(coord)
            .and_then(|t| self.kinds.get(t.kind.0 as usize))
    }

    /// In bounds and of a passable kind; occupancy is not considered
    pub fn is_passable(&self, coord: TileCoord) -> bool {
        self.kind_at(coord).map_or(false, |k| k.passable)
    }

    pub fn height_at(&self, coord: TileCoord) -> Option<f32> {
        self.grid.get(coord).map(|t| t.height)
    }

    pub fn occupant(&self, coord: TileCoord) -> Option<EntityId> {
        self.occupancy.get(&coord).copied()
    }

    pub fn occupied_count(&self) -> usize {
        self.occupancy.len()
    }

    /// Passable and unoccupied
    pub fn is_free(&self, coord: TileCoord) -> bool {
        self.is_passable(coord) && !self.occupancy.contains_key(&coord)
    }

    /// Why an entity could not stand on `coord`, if it could not
    pub fn check_placement(&self, coord: TileCoord) -> Result<(), PlacementError> {
        if !self.in_bounds(coord) {
            return Err(PlacementError::OutOfBounds(coord));
        }
        if !self.is_passable(coord) {
            return Err(PlacementError::Impassable(coord));
        }
        if let Some(by) = self.occupant(coord) {
            return Err(PlacementError::Occupied { coord, by });
        }
        Ok(())
    }

    /// World-space center of a tile
    pub fn world_position(&self, coord: TileCoord) -> Vec2 {
        self.grid.cell_center(coord)
    }

    pub fn has_connector(&self) -> bool {
        self.connector.is_some()
    }

    pub fn tiles(&self) -> impl Iterator<Item = (TileCoord, &Tile)> {
        self.grid.iter()
    }

    // Mutation, reachable only through the world

    pub(crate) fn set_tile(&mut self, coord: TileCoord, tile: Tile) -> Result<(), PlacementError> {
        if !self.grid.set(coord, tile) {
            return Err(PlacementError::OutOfBounds(coord));
        }
        self.changed.insert(coord);
        Ok(())
    }

    pub(crate) fn occupy(&mut self, coord: TileCoord, entity: EntityId) {
        self.occupancy.insert(coord, entity);
    }

    pub(crate) fn vacate(&mut self, coord: TileCoord, entity: EntityId) {
        if self.occupancy.get(&coord) == Some(&entity) {
            self.occupancy.remove(&coord);
        }
    }

    pub(crate) fn relocate(&mut self, from: TileCoord, to: TileCoord, entity: EntityId) {
        self.vacate(from, entity);
        self.occupy(to, entity);
    }

    pub(crate) fn set_connector(&mut self, connector: Option<&Arc<dyn TerrainConnector>>) {
        self.connector = connector.map(Arc::downgrade);
    }

    /// Drop the connector; returns whether one was attached
    pub(crate) fn clear_connector(&mut self) -> bool {
        self.connector.take().is_some()
    }

    /// Send batched tile changes to the connector, if any, and reset them
    pub(crate) fn flush_changes(&mut self) {
        if self.changed.is_empty() {
            return;
        }
        let changed: Vec<TileCoord> = std::mem::take(&mut self.changed).into_iter().collect();
        if let Some(connector) = self.connector.as_ref().and_then(Weak::upgrade) {
            connector.on_tiles_changed(self, &changed);
        }
    }
}

impl std::fmt::Debug for Terrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terrain")
            .field("width", &self.grid.width)
            .field("height", &self.grid.height)
            .field("kinds", &self.kinds)
            .field("occupied", &self.occupancy.len())
            .field("connected", &self.connector.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::manifest::{RegionDef, TileKindDef};

    fn test_def() -> TerrainDef {
        TerrainDef {
            width: 6,
            height: 4,
            fill: "grass".into(),
            tile_size: 2.0,
            tiles: vec![
                TileKindDef {
                    id: "grass".into(),
                    passable: true,
                },
                TileKindDef {
                    id: "water".into(),
                    passable: false,
                },
            ],
            regions: vec![RegionDef {
                tile: "water".into(),
                min: [2, 0],
                max: [2, 3],
                height: Some(-1.0),
            }],
        }
    }

    #[test]
    fn test_build_from_def() {
        let terrain = Terrain::from_def(&test_def()).unwrap();
        assert_eq!(terrain.width(), 6);
        assert_eq!(terrain.height(), 4);
        assert!(terrain.is_passable(TileCoord::new(0, 0)));
        assert!(!terrain.is_passable(TileCoord::new(2, 1)));
        assert_eq!(terrain.height_at(TileCoord::new(2, 1)), Some(-1.0));
        assert_eq!(terrain.height_at(TileCoord::new(3, 1)), Some(0.0));
        assert_eq!(terrain.kind_at(TileCoord::new(2, 2)).map(|k| k.id.as_str()), Some("water"));
    }

    #[test]
    fn test_out_of_bounds_queries() {
        let terrain = Terrain::from_def(&test_def()).unwrap();
        assert!(!terrain.is_passable(TileCoord::new(-1, 0)));
        assert!(!terrain.is_passable(TileCoord::new(6, 0)));
        assert_eq!(terrain.height_at(TileCoord::new(0, 4)), None);
    }

    #[test]
    fn test_check_placement() {
        let mut terrain = Terrain::from_def(&test_def()).unwrap();
        assert_eq!(
            terrain.check_placement(TileCoord::new(9, 9)),
            Err(PlacementError::OutOfBounds(TileCoord::new(9, 9)))
        );
        assert_eq!(
            terrain.check_placement(TileCoord::new(2, 0)),
            Err(PlacementError::Impassable(TileCoord::new(2, 0)))
        );
        terrain.occupy(TileCoord::new(1, 1), EntityId(4));
        assert_eq!(
            terrain.check_placement(TileCoord::new(1, 1)),
            Err(PlacementError::Occupied {
                coord: TileCoord::new(1, 1),
                by: EntityId(4)
            })
        );
        assert!(terrain.check_placement(TileCoord::new(0, 0)).is_ok());
    }

    #[test]
    fn test_vacate_only_removes_own_entry() {
        let mut terrain = Terrain::from_def(&test_def()).unwrap();
        let coord = TileCoord::new(0, 0);
        terrain.occupy(coord, EntityId(1));
        terrain.vacate(coord, EntityId(2));
        assert_eq!(terrain.occupant(coord), Some(EntityId(1)));
        terrain.vacate(coord, EntityId(1));
        assert_eq!(terrain.occupant(coord), None);
    }

    #[test]
    fn test_set_tile_tracks_changes() {
        let mut terrain = Terrain::from_def(&test_def()).unwrap();
        let water = terrain.kind_id("water").unwrap();
        terrain.set_tile(TileCoord::new(0, 0), Tile::new(water, 0.5)).unwrap();
        assert!(!terrain.is_passable(TileCoord::new(0, 0)));
        assert_eq!(terrain.changed.len(), 1);
        terrain.flush_changes();
        assert!(terrain.changed.is_empty());
        assert!(terrain.set_tile(TileCoord::new(7, 0), Tile::default()).is_err());
    }

    #[test]
    fn test_unknown_fill_rejected() {
        let mut def = test_def();
        def.fill = "lava".into();
        assert!(matches!(
            Terrain::from_def(&def),
            Err(ConfigurationError::InvalidTerrain(_))
        ));
    }

    #[test]
    fn test_oversized_terrain_rejected() {
        let mut def = test_def();
        def.width = u32::MAX;
        def.height = u32::MAX;
        assert!(matches!(
            Terrain::from_def(&def),
            Err(ConfigurationError::InvalidTerrain(_))
        ));

        // Within i32 range but far too many tiles
        def.width = 100_000;
        def.height = 100_000;
        assert!(matches!(
            Terrain::from_def(&def),
            Err(ConfigurationError::InvalidTerrain(_))
        ));

        def.width = MAX_TILES as u32 + 1;
        def.height = 1;
        assert!(matches!(
            Terrain::from_def(&def),
            Err(ConfigurationError::InvalidTerrain(_))
        ));
    }

    #[test]
    fn test_region_outside_map_rejected() {
        let mut def = test_def();
        def.regions[0].max = [2, 10];
        assert!(Terrain::from_def(&def).is_err());
    }

    #[test]
    fn test_world_position_uses_tile_size() {
        let terrain = Terrain::from_def(&test_def()).unwrap();
        assert_eq!(terrain.world_position(TileCoord::new(1, 0)), Vec2::new(3.0, 1.0));
    }
}
