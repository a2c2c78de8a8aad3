//! Renderer attachment interface.
//!
//! The simulation never depends on a renderer. A renderer attaches by
//! handing the world a [`RenderFactory`]; the world asks it for one
//! connector per live entity and asks it again to tear each connector down.
//! Connectors are owned by the renderer: entities keep only a `Weak`, so a
//! connector the renderer dropped simply stops receiving updates.

pub mod recording;

use std::sync::Arc;

use crate::core::types::{EntityId, TileCoord};
use crate::entity::GameEntity;
use crate::terrain::Terrain;

pub use recording::{RecordingRenderFactory, RenderEvent};

/// Per-entity channel from the simulation to the renderer
pub trait RenderConnector: Send + Sync {
    /// End-of-tick state of an entity whose components, position or
    /// lifecycle changed during the tick. Called at most once per tick.
    fn on_update(&self, entity: &GameEntity);
}

/// Channel for batched terrain changes
pub trait TerrainConnector: Send + Sync {
    /// Tiles modified during the last tick, in coordinate order
    fn on_tiles_changed(&self, terrain: &Terrain, tiles: &[TileCoord]);
}

/// Capability handed to the simulation by a renderer
///
/// Both calls must be idempotent-safe on the renderer side: a teardown for
/// an entity that has no connector is a no-op, not an error. Callbacks run
/// while the session state is locked for writing and must not call back
/// into the `Game`.
pub trait RenderFactory: Send + Sync {
    /// Create the connector for `entity`. The factory must keep the
    /// returned connector alive until the matching teardown.
    fn create_connector(&self, entity: &GameEntity) -> Arc<dyn RenderConnector>;

    /// Release the connector created for `entity`
    fn teardown_connector(&self, entity: EntityId);

    /// Optional connector for terrain changes
    fn create_terrain_connector(&self, _terrain: &Terrain) -> Option<Arc<dyn TerrainConnector>> {
        None
    }

    fn teardown_terrain_connector(&self) {}
}

/// Calls made while (re)attaching a renderer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachReport {
    /// Connectors of the previous factory that were torn down
    pub torn_down: usize,
    /// Connectors created by the new factory
    pub created: usize,
}
