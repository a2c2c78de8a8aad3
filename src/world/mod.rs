//! World: registry and lifecycle manager for every game entity
//!
//! The world never owns terrain. Every operation that touches space borrows
//! it from the universe, which keeps terrain and the entity registry siblings
//! and lets the borrow checker rule out registry mutation mid-pass.

pub mod commands;
pub mod placement;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::core::config::SessionConfig;
use crate::core::error::{PlacementError, Result, SchemaViolation, SessionError};
use crate::core::types::{EntityId, PlayerId, Tick, TileCoord};
use crate::data::database::ContentDatabase;
use crate::data::schema::ComponentValue;
use crate::entity::{EntitySnapshot, GameEntity, LifecycleState};
use crate::render::{AttachReport, RenderFactory};
use crate::terrain::{Terrain, Tile};

pub use commands::{Commands, WorldCommand};
pub use placement::{Placement, PlacementPolicy, SpawnRequest};

use commands::IdAllocator;

/// An entity that came into existence during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnRecord {
    pub id: EntityId,
    pub owner: Option<PlayerId>,
    /// Template score credited to the owner
    pub score: i64,
}

/// A recoverable error raised while advancing the world
#[derive(Debug)]
pub struct Diagnostic {
    pub tick: Tick,
    pub entity: Option<EntityId>,
    pub error: SessionError,
}

/// Outcome of one `World::update`
#[derive(Debug, Default)]
pub struct TickReport {
    pub tick: Tick,
    pub spawned: Vec<SpawnRecord>,
    pub despawned: Vec<EntityId>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    fn diagnose(&mut self, entity: Option<EntityId>, error: SessionError) {
        match &error {
            SessionError::NotFound(id) => {
                tracing::debug!("Tick {}: {} already gone, request ignored", self.tick, id)
            }
            other => tracing::warn!(
                "Tick {}: {} ({}) on {:?}",
                self.tick,
                other,
                other.kind(),
                entity
            ),
        }
        self.diagnostics.push(Diagnostic {
            tick: self.tick,
            entity,
            error,
        });
    }
}

/// Registry changes requested during the entity pass
#[derive(Debug)]
enum Deferred {
    Spawn {
        source: EntityId,
        template: String,
        owner: Option<PlayerId>,
        origin: TileCoord,
    },
    Despawn(EntityId),
}

pub struct World {
    database: Arc<ContentDatabase>,
    entities: AHashMap<EntityId, GameEntity>,
    /// Registration order, the iteration order of every pass
    order: Vec<EntityId>,
    ids: IdAllocator,
    commands: Commands,
    deferred: VecDeque<Deferred>,
    render: Option<Arc<dyn RenderFactory>>,
    rng: ChaCha8Rng,
    tick: Tick,
    max_entities: usize,
    spawn_search_radius: i32,
}

impl World {
    pub fn new(database: Arc<ContentDatabase>, config: &SessionConfig) -> Self {
        let ids = IdAllocator::default();
        let rng = ChaCha8Rng::seed_from_u64(database.rules().seed);
        Self {
            database,
            entities: AHashMap::new(),
            order: Vec::new(),
            commands: Commands::new(ids.clone()),
            ids,
            deferred: VecDeque::new(),
            render: None,
            rng,
            tick: 0,
            max_entities: config.max_entities,
            spawn_search_radius: config.spawn_search_radius,
        }
    }

    // === Queries ===

    pub fn get(&self, id: EntityId) -> Option<&GameEntity> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Live entity ids in registration order
    pub fn entity_ids(&self) -> &[EntityId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameEntity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    pub fn owned_count(&self, player: PlayerId) -> usize {
        self.iter().filter(|e| e.owner() == Some(player)).count()
    }

    pub fn snapshots(&self) -> Vec<EntitySnapshot> {
        self.iter().map(GameEntity::snapshot).collect()
    }

    /// Completed update passes
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn commands(&self) -> Commands {
        self.commands.clone()
    }

    pub fn database(&self) -> &ContentDatabase {
        &self.database
    }

    pub fn has_renderer(&self) -> bool {
        self.render.is_some()
    }

    pub fn connected_count(&self) -> usize {
        self.entities.values().filter(|e| e.has_connector()).count()
    }

    // === Lifecycle ===

    /// Create an entity now
    ///
    /// Fails without touching the registry or terrain. The id is consumed
    /// either way.
    pub fn spawn(&mut self, terrain: &mut Terrain, request: SpawnRequest) -> Result<EntityId> {
        let id = self.ids.next();
        self.spawn_with_id(terrain, id, request)
    }

    fn spawn_with_id(
        &mut self,
        terrain: &mut Terrain,
        id: EntityId,
        request: SpawnRequest,
    ) -> Result<EntityId> {
        if self.entities.len() >= self.max_entities {
            return Err(PlacementError::WorldFull(self.max_entities).into());
        }
        let template = self.database.resolve(&request.template)?;
        if let Some(owner) = request.owner {
            if self.database.player(owner).is_none() {
                return Err(SchemaViolation::UnknownPlayer(owner).into());
            }
        }
        let coord = request.placement.resolve(terrain)?;

        let mut entity = GameEntity::new(id, template, request.owner, coord);
        if let Err(violation) = entity.resolve(&request.overrides) {
            entity.transition(LifecycleState::Destroyed);
            return Err(violation.into());
        }

        terrain.occupy(coord, id);
        if let Some(factory) = &self.render {
            let connector = factory.create_connector(&entity);
            entity.set_connector(&connector);
        }
        entity.mark_clean();

        tracing::debug!("Spawned {} '{}' at {}", id, entity.template_id(), coord);
        self.entities.insert(id, entity);
        self.order.push(id);
        Ok(id)
    }

    /// Remove an entity now, tearing down its connector first
    pub fn despawn(&mut self, terrain: &mut Terrain, id: EntityId) -> Result<GameEntity> {
        let Some(mut entity) = self.entities.remove(&id) else {
            tracing::debug!("Despawn of unknown {} ignored", id);
            return Err(SessionError::NotFound(id));
        };
        self.order.retain(|e| *e != id);

        entity.transition(LifecycleState::Despawning);
        if entity.clear_connector() {
            if let Some(factory) = &self.render {
                factory.teardown_connector(id);
            }
        }
        terrain.vacate(entity.coord(), id);
        entity.transition(LifecycleState::Destroyed);

        tracing::debug!("Despawned {} '{}'", id, entity.template_id());
        Ok(entity)
    }

    // === Mutation ===

    pub fn set_component(
        &mut self,
        id: EntityId,
        component: &str,
        value: ComponentValue,
    ) -> Result<()> {
        let entity = self.entities.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        entity.set_component(component, value)?;
        Ok(())
    }

    /// Order an entity to walk toward `target`
    pub fn order_move(&mut self, terrain: &Terrain, id: EntityId, target: TileCoord) -> Result<()> {
        if !terrain.in_bounds(target) {
            return Err(PlacementError::OutOfBounds(target).into());
        }
        let entity = self.entities.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        entity.order_move(target);
        Ok(())
    }

    /// Change a tile on behalf of the simulation
    ///
    /// An occupied tile cannot be made impassable.
    pub fn set_tile(
        &mut self,
        terrain: &mut Terrain,
        coord: TileCoord,
        kind: &str,
        height: Option<f32>,
    ) -> Result<()> {
        let kind_id = terrain
            .kind_id(kind)
            .ok_or_else(|| SchemaViolation::UnknownTileKind(kind.to_string()))?;
        let current = terrain
            .tile(coord)
            .ok_or(PlacementError::OutOfBounds(coord))?;
        let passable = terrain
            .kinds()
            .get(kind_id.0 as usize)
            .map_or(false, |k| k.passable);
        if !passable {
            if let Some(by) = terrain.occupant(coord) {
                return Err(PlacementError::Occupied { coord, by }.into());
            }
        }
        terrain.set_tile(coord, Tile::new(kind_id, height.unwrap_or(current.height)))?;
        Ok(())
    }

    // === Rendering ===

    /// Swap the render factory
    ///
    /// Every connector of the previous factory is torn down before the new
    /// one is installed and backfilled for each live entity. `None` detaches.
    /// `torn_down` and `created` count entity connectors only.
    pub fn attach_renderer(
        &mut self,
        terrain: &mut Terrain,
        factory: Option<Arc<dyn RenderFactory>>,
    ) -> AttachReport {
        let mut report = AttachReport::default();

        if let Some(old) = self.render.take() {
            for id in &self.order {
                if let Some(entity) = self.entities.get_mut(id) {
                    if entity.clear_connector() {
                        old.teardown_connector(*id);
                        report.torn_down += 1;
                    }
                }
            }
            if terrain.clear_connector() {
                old.teardown_terrain_connector();
            }
        }

        if let Some(factory) = factory {
            for id in &self.order {
                if let Some(entity) = self.entities.get_mut(id) {
                    let connector = factory.create_connector(entity);
                    entity.set_connector(&connector);
                    report.created += 1;
                }
            }
            let terrain_connector = factory.create_terrain_connector(terrain);
            terrain.set_connector(terrain_connector.as_ref());
            self.render = Some(factory);
        }

        tracing::info!(
            "Renderer {} at tick {}: {} connectors torn down, {} created",
            if self.render.is_some() { "attached" } else { "detached" },
            self.tick,
            report.torn_down,
            report.created
        );
        report
    }

    // === Update ===

    /// Advance the world by one tick
    ///
    /// Order: queued commands, the entity pass in registration order,
    /// deferred spawns and despawns in request order, then batched render
    /// notifications. Errors stay with the entity or request that raised them.
    pub fn update(&mut self, terrain: &mut Terrain, dt: Duration) -> TickReport {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        self.apply_commands(terrain, &mut report);

        // Registration order is fixed for the duration of the pass
        for index in 0..self.order.len() {
            let id = self.order[index];
            let Some(entity) = self.entities.get_mut(&id) else {
                continue;
            };
            if !entity.state().is_live() {
                continue;
            }
            let (owner, origin) = (entity.owner(), entity.coord());
            let actions = match entity.tick(dt) {
                Ok(actions) => actions,
                Err(violation) => {
                    report.diagnose(Some(id), violation.into());
                    continue;
                }
            };

            if actions.steps > 0 {
                self.step_entity(terrain, id, actions.steps);
            }
            if let Some(template) = actions.spawn {
                self.deferred.push_back(Deferred::Spawn {
                    source: id,
                    template,
                    owner,
                    origin,
                });
            }
            if actions.despawn {
                self.deferred.push_back(Deferred::Despawn(id));
            }
        }

        self.apply_deferred(terrain, &mut report);

        for id in &self.order {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.flush_render();
            }
        }
        terrain.flush_changes();

        report
    }

    fn apply_commands(&mut self, terrain: &mut Terrain, report: &mut TickReport) {
        for command in self.commands.drain() {
            let (entity, result) = match command {
                WorldCommand::Spawn { id, request } => (
                    Some(id),
                    self.spawn_with_id(terrain, id, request)
                        .map(|id| report.spawned.push(self.spawn_record(id))),
                ),
                WorldCommand::Despawn(id) => (
                    Some(id),
                    self.despawn(terrain, id).map(|_| report.despawned.push(id)),
                ),
                WorldCommand::SetComponent {
                    entity,
                    component,
                    value,
                } => (Some(entity), self.set_component(entity, &component, value)),
                WorldCommand::Move { entity, target } => {
                    (Some(entity), self.order_move(terrain, entity, target))
                }
                WorldCommand::SetTile {
                    coord,
                    kind,
                    height,
                } => (None, self.set_tile(terrain, coord, &kind, height)),
            };
            if let Err(error) = result {
                report.diagnose(entity, error);
            }
        }
    }

    fn apply_deferred(&mut self, terrain: &mut Terrain, report: &mut TickReport) {
        while let Some(request) = self.deferred.pop_front() {
            match request {
                Deferred::Despawn(id) => match self.despawn(terrain, id) {
                    Ok(_) => report.despawned.push(id),
                    Err(error) => report.diagnose(Some(id), error),
                },
                Deferred::Spawn {
                    source,
                    template,
                    owner,
                    origin,
                } => {
                    let result = self.scatter(terrain, origin).and_then(|coord| {
                        let mut request = SpawnRequest::new(template, Placement::rigid(coord));
                        request.owner = owner;
                        self.spawn(terrain, request)
                    });
                    match result {
                        Ok(id) => report.spawned.push(self.spawn_record(id)),
                        Err(error) => report.diagnose(Some(source), error),
                    }
                }
            }
        }
    }

    /// Walk up to `steps` tiles toward the entity's destination
    fn step_entity(&mut self, terrain: &mut Terrain, id: EntityId, steps: u32) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        for _ in 0..steps {
            let Some(target) = entity.destination() else {
                break;
            };
            let from = entity.coord();
            let next = from
                .steps_toward(&target)
                .into_iter()
                .find(|c| terrain.is_free(*c));
            match next {
                Some(next) => {
                    terrain.relocate(from, next, id);
                    entity.step_to(next);
                }
                None => {
                    tracing::trace!("{} blocked at {} heading to {}", id, from, target);
                    entity.halt();
                    break;
                }
            }
        }
    }

    /// Random free tile in the nearest ring around `origin` that has one
    fn scatter(&mut self, terrain: &Terrain, origin: TileCoord) -> Result<TileCoord> {
        for radius in 1..=self.spawn_search_radius {
            let free: Vec<TileCoord> = origin
                .ring(radius)
                .into_iter()
                .filter(|c| terrain.is_free(*c))
                .collect();
            if let Some(coord) = free.choose(&mut self.rng) {
                return Ok(*coord);
            }
        }
        Err(PlacementError::NoFreeTile {
            origin,
            radius: self.spawn_search_radius,
        }
        .into())
    }

    fn spawn_record(&self, id: EntityId) -> SpawnRecord {
        let entity = self.entities.get(&id);
        SpawnRecord {
            id,
            owner: entity.and_then(GameEntity::owner),
            score: entity.map_or(0, |e| e.template().meta.score),
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("tick", &self.tick)
            .field("entities", &self.entities.len())
            .field("deferred", &self.deferred.len())
            .field("renderer", &self.render.is_some())
            .finish()
    }
}
