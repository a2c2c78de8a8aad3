//! Render factory that records every call it receives.
//!
//! Used by the headless runner to report renderer traffic and by tests to
//! verify connector lifecycles.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ahash::AHashMap;

use super::{RenderConnector, RenderFactory, TerrainConnector};
use crate::core::types::{EntityId, TileCoord};
use crate::entity::GameEntity;
use crate::terrain::Terrain;

/// One call observed by the recording factory
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Created(EntityId),
    Updated { entity: EntityId, coord: TileCoord },
    TornDown(EntityId),
    TerrainCreated,
    TerrainChanged(Vec<TileCoord>),
    TerrainTornDown,
}

type EventLog = Arc<Mutex<Vec<RenderEvent>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct RecordingConnector {
    log: EventLog,
}

impl RenderConnector for RecordingConnector {
    fn on_update(&self, entity: &GameEntity) {
        lock(&self.log).push(RenderEvent::Updated {
            entity: entity.id(),
            coord: entity.coord(),
        });
    }
}

struct RecordingTerrainConnector {
    log: EventLog,
}

impl TerrainConnector for RecordingTerrainConnector {
    fn on_tiles_changed(&self, _terrain: &Terrain, tiles: &[TileCoord]) {
        lock(&self.log).push(RenderEvent::TerrainChanged(tiles.to_vec()));
    }
}

/// Records calls and keeps its connectors alive until teardown
#[derive(Default)]
pub struct RecordingRenderFactory {
    log: EventLog,
    connectors: Mutex<AHashMap<EntityId, Arc<RecordingConnector>>>,
    terrain: Mutex<Option<Arc<RecordingTerrainConnector>>>,
    with_terrain: bool,
}

impl RecordingRenderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also provide a terrain connector
    pub fn with_terrain() -> Self {
        Self {
            with_terrain: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        lock(&self.log).clone()
    }

    pub fn created(&self) -> Vec<EntityId> {
        self.filter(|e| match e {
            RenderEvent::Created(id) => Some(*id),
            _ => None,
        })
    }

    pub fn torn_down(&self) -> Vec<EntityId> {
        self.filter(|e| match e {
            RenderEvent::TornDown(id) => Some(*id),
            _ => None,
        })
    }

    pub fn updates_for(&self, entity: EntityId) -> usize {
        lock(&self.log)
            .iter()
            .filter(|e| matches!(e, RenderEvent::Updated { entity: id, .. } if *id == entity))
            .count()
    }

    /// Connectors created and not yet torn down
    pub fn live_connectors(&self) -> usize {
        lock(&self.connectors).len()
    }

    pub fn has_terrain_connector(&self) -> bool {
        lock(&self.terrain).is_some()
    }

    pub fn clear(&self) {
        lock(&self.log).clear();
    }

    fn filter<F>(&self, f: F) -> Vec<EntityId>
    where
        F: Fn(&RenderEvent) -> Option<EntityId>,
    {
        lock(&self.log).iter().filter_map(f).collect()
    }
}

impl RenderFactory for RecordingRenderFactory {
    fn create_connector(&self, entity: &GameEntity) -> Arc<dyn RenderConnector> {
        lock(&self.log).push(RenderEvent::Created(entity.id()));
        let connector = Arc::new(RecordingConnector {
            log: Arc::clone(&self.log),
        });
        lock(&self.connectors).insert(entity.id(), Arc::clone(&connector));
        connector
    }

    fn teardown_connector(&self, entity: EntityId) {
        lock(&self.log).push(RenderEvent::TornDown(entity));
        // Tearing down an unknown connector is a no-op
        lock(&self.connectors).remove(&entity);
    }

    fn create_terrain_connector(&self, _terrain: &Terrain) -> Option<Arc<dyn TerrainConnector>> {
        if !self.with_terrain {
            return None;
        }
        lock(&self.log).push(RenderEvent::TerrainCreated);
        let connector = Arc::new(RecordingTerrainConnector {
            log: Arc::clone(&self.log),
        });
        *lock(&self.terrain) = Some(Arc::clone(&connector));
        Some(connector)
    }

    fn teardown_terrain_connector(&self) {
        lock(&self.log).push(RenderEvent::TerrainTornDown);
        lock(&self.terrain).take();
    }
}
