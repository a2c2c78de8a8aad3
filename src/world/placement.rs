//! Spawn requests and placement policies

use std::collections::BTreeMap;

use crate::core::error::PlacementError;
use crate::core::types::{PlayerId, TileCoord};
use crate::data::schema::ComponentValue;
use crate::terrain::Terrain;

/// What to do when the requested tile cannot take the entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlacementPolicy {
    /// Reject with a `PlacementError`
    #[default]
    Rigid,
    /// Search rings out to `radius` for the first free tile
    NearestFree { radius: i32 },
}

/// Where to put a new entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub coord: TileCoord,
    pub policy: PlacementPolicy,
}

impl Placement {
    pub fn rigid(coord: impl Into<TileCoord>) -> Self {
        Self {
            coord: coord.into(),
            policy: PlacementPolicy::Rigid,
        }
    }

    pub fn nearest_free(coord: impl Into<TileCoord>, radius: i32) -> Self {
        Self {
            coord: coord.into(),
            policy: PlacementPolicy::NearestFree { radius },
        }
    }

    /// Resolve the tile the entity will occupy
    ///
    /// Relocation only happens under `NearestFree`. Candidates are scanned
    /// ring by ring in a fixed order, so the result depends only on terrain
    /// and occupancy.
    pub fn resolve(&self, terrain: &Terrain) -> Result<TileCoord, PlacementError> {
        let err = match terrain.check_placement(self.coord) {
            Ok(()) => return Ok(self.coord),
            Err(err) => err,
        };
        match self.policy {
            PlacementPolicy::Rigid => Err(err),
            PlacementPolicy::NearestFree { radius } => (1..=radius)
                .flat_map(|r| self.coord.ring(r))
                .find(|c| terrain.is_free(*c))
                .ok_or(PlacementError::NoFreeTile {
                    origin: self.coord,
                    radius,
                }),
        }
    }
}

/// Everything needed to create one entity
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub template: String,
    pub placement: Placement,
    pub owner: Option<PlayerId>,
    /// Initial component values replacing the template defaults
    pub overrides: BTreeMap<String, ComponentValue>,
}

impl SpawnRequest {
    pub fn new(template: impl Into<String>, placement: Placement) -> Self {
        Self {
            template: template.into(),
            placement,
            owner: None,
            overrides: BTreeMap::new(),
        }
    }

    pub fn owned_by(mut self, owner: PlayerId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_override(mut self, component: impl Into<String>, value: ComponentValue) -> Self {
        self.overrides.insert(component.into(), value);
        self
    }
}
