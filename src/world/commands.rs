//! External requests against the world
//!
//! Anything outside the update callback talks to the world through a
//! [`Commands`] handle. Requests are queued and applied FIFO at the start of
//! the next tick, so the update pass stays the only writer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::types::{EntityId, TileCoord};
use crate::data::schema::ComponentValue;

use super::placement::SpawnRequest;

/// Monotonic entity id source shared by the world and its command handles
#[derive(Debug, Clone, Default)]
pub(crate) struct IdAllocator(Arc<AtomicU64>);

impl IdAllocator {
    pub(crate) fn next(&self) -> EntityId {
        EntityId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorldCommand {
    Spawn { id: EntityId, request: SpawnRequest },
    Despawn(EntityId),
    SetComponent {
        entity: EntityId,
        component: String,
        value: ComponentValue,
    },
    Move { entity: EntityId, target: TileCoord },
    SetTile {
        coord: TileCoord,
        kind: String,
        height: Option<f32>,
    },
}

/// Cloneable handle for queueing world requests
#[derive(Debug, Clone)]
pub struct Commands {
    queue: Arc<Mutex<VecDeque<WorldCommand>>>,
    ids: IdAllocator,
}

impl Commands {
    pub(crate) fn new(ids: IdAllocator) -> Self {
        Self {
            queue: Arc::default(),
            ids,
        }
    }

    /// Queue a spawn and return the id the entity will have if it succeeds
    pub fn spawn(&self, request: SpawnRequest) -> EntityId {
        let id = self.ids.next();
        self.push(WorldCommand::Spawn { id, request });
        id
    }

    pub fn despawn(&self, entity: EntityId) {
        self.push(WorldCommand::Despawn(entity));
    }

    pub fn set_component(
        &self,
        entity: EntityId,
        component: impl Into<String>,
        value: ComponentValue,
    ) {
        self.push(WorldCommand::SetComponent {
            entity,
            component: component.into(),
            value,
        });
    }

    pub fn move_to(&self, entity: EntityId, target: impl Into<TileCoord>) {
        self.push(WorldCommand::Move {
            entity,
            target: target.into(),
        });
    }

    /// `height` of `None` keeps the tile's current height
    pub fn set_tile(&self, coord: impl Into<TileCoord>, kind: impl Into<String>, height: Option<f32>) {
        self.push(WorldCommand::SetTile {
            coord: coord.into(),
            kind: kind.into(),
            height,
        });
    }

    /// Requests waiting for the next tick
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn drain(&self) -> Vec<WorldCommand> {
        self.lock().drain(..).collect()
    }

    fn push(&self, command: WorldCommand) {
        self.lock().push_back(command);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<WorldCommand>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
