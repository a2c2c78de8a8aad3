//! Game entities: one simulated object each, shaped by its template

pub mod lifecycle;

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;

use crate::core::error::SchemaViolation;
use crate::core::types::{EntityId, PlayerId, TileCoord};
use crate::data::schema::{ComponentType, ComponentValue, EntityTemplate};
use crate::render::RenderConnector;

pub use lifecycle::LifecycleState;

/// What an entity asked the world to do after its tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickActions {
    /// Remove this entity once the pass completes
    pub despawn: bool,
    /// Spawn this template next to the entity once the pass completes
    pub spawn: Option<String>,
    /// Tiles to advance toward the destination
    pub steps: u32,
}

/// Plain-data view of an entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub template: String,
    pub owner: Option<PlayerId>,
    pub coord: TileCoord,
    pub state: LifecycleState,
    pub destination: Option<TileCoord>,
    pub components: BTreeMap<String, ComponentValue>,
}

#[derive(Debug)]
pub struct GameEntity {
    id: EntityId,
    template: Arc<EntityTemplate>,
    owner: Option<PlayerId>,
    coord: TileCoord,
    components: BTreeMap<String, ComponentValue>,
    state: LifecycleState,
    destination: Option<TileCoord>,
    move_progress: f64,
    spawn_timer: f64,
    spawn_count: u32,
    age: Duration,
    connector: Option<Weak<dyn RenderConnector>>,
    /// Changed since the last render notification
    dirty: bool,
}

impl GameEntity {
    /// New entity in `Spawning`, carrying its template's default components
    pub(crate) fn new(
        id: EntityId,
        template: Arc<EntityTemplate>,
        owner: Option<PlayerId>,
        coord: TileCoord,
    ) -> Self {
        let components = template.default_components();
        Self {
            id,
            template,
            owner,
            coord,
            components,
            state: LifecycleState::Spawning,
            destination: None,
            move_progress: 0.0,
            spawn_timer: 0.0,
            spawn_count: 0,
            age: Duration::ZERO,
            connector: None,
            dirty: false,
        }
    }

    /// Apply initial overrides and activate
    pub(crate) fn resolve<'a, I>(&mut self, overrides: I) -> Result<(), SchemaViolation>
    where
        I: IntoIterator<Item = (&'a String, &'a ComponentValue)>,
    {
        for (name, value) in overrides {
            let value = self.template.check_component(name, value.clone())?;
            self.components.insert(name.clone(), value);
        }
        self.transition(LifecycleState::Active);
        Ok(())
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn template(&self) -> &EntityTemplate {
        &self.template
    }

    pub fn template_id(&self) -> &str {
        self.template.id()
    }

    pub fn owner(&self) -> Option<PlayerId> {
        self.owner
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn destination(&self) -> Option<TileCoord> {
        self.destination
    }

    /// Simulated time since the entity was spawned
    pub fn age(&self) -> Duration {
        self.age
    }

    pub fn component(&self, name: &str) -> Option<&ComponentValue> {
        self.components.get(name)
    }

    pub fn components(&self) -> &BTreeMap<String, ComponentValue> {
        &self.components
    }

    /// A connector was requested and not yet torn down
    pub fn has_connector(&self) -> bool {
        self.connector.is_some()
    }

    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            template: self.template.id().to_string(),
            owner: self.owner,
            coord: self.coord,
            state: self.state,
            destination: self.destination,
            components: self.components.clone(),
        }
    }

    pub(crate) fn transition(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid lifecycle transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(entity = %self.id, from = ?self.state, to = ?next, "Lifecycle transition");
        self.state = next;
        self.dirty = true;
    }

    pub(crate) fn set_component(
        &mut self,
        name: &str,
        value: ComponentValue,
    ) -> Result<(), SchemaViolation> {
        let value = self.template.check_component(name, value)?;
        if self.components.get(name) != Some(&value) {
            self.components.insert(name.to_string(), value);
            self.dirty = true;
        }
        Ok(())
    }

    pub(crate) fn order_move(&mut self, target: TileCoord) {
        self.destination = (target != self.coord).then_some(target);
        self.move_progress = 0.0;
        self.dirty = true;
    }

    pub(crate) fn step_to(&mut self, coord: TileCoord) {
        self.coord = coord;
        if self.destination == Some(coord) {
            self.destination = None;
            self.move_progress = 0.0;
        }
        self.dirty = true;
    }

    /// Movement blocked this tick; unused progress is dropped
    pub(crate) fn halt(&mut self) {
        self.move_progress = 0.0;
    }

    /// Run this entity's data-driven logic for one tick
    ///
    /// Component changes are staged and committed only if every rule
    /// succeeds, so a schema violation leaves the entity untouched.
    pub(crate) fn tick(&mut self, dt: Duration) -> Result<TickActions, SchemaViolation> {
        let secs = dt.as_secs_f64();
        let template = Arc::clone(&self.template);
        let mut actions = TickActions::default();

        let mut staged = None;
        for rule in &template.dynamics {
            let components = staged.get_or_insert_with(|| self.components.clone());
            let (min, max) = match template.schema(&rule.component) {
                Some(ComponentType::Float { min, max, .. }) => (*min, *max),
                Some(other) => {
                    return Err(SchemaViolation::TypeMismatch {
                        template: template.id().to_string(),
                        component: rule.component.clone(),
                        expected: "float",
                        found: other.type_name(),
                    })
                }
                None => {
                    return Err(SchemaViolation::UnknownComponent {
                        template: template.id().to_string(),
                        component: rule.component.clone(),
                    })
                }
            };
            let current = components
                .get(&rule.component)
                .and_then(ComponentValue::as_f64)
                .unwrap_or(min);
            let next = (current + rule.rate * secs).clamp(min, max);
            components.insert(rule.component.clone(), ComponentValue::Float(next));
        }

        if let Some(depletion) = &template.despawn_when {
            let components = staged.as_ref().unwrap_or(&self.components);
            let current = components.get(&depletion.component).ok_or_else(|| {
                SchemaViolation::UnknownComponent {
                    template: template.id().to_string(),
                    component: depletion.component.clone(),
                }
            })?;
            let value = current
                .as_f64()
                .ok_or_else(|| SchemaViolation::TypeMismatch {
                    template: template.id().to_string(),
                    component: depletion.component.clone(),
                    expected: "float",
                    found: current.type_name(),
                })?;
            actions.despawn = value <= depletion.at_or_below;
        }

        if let Some(components) = staged {
            if components != self.components {
                self.components = components;
                self.dirty = true;
            }
        }

        if let Some(spawner) = &template.spawner {
            let exhausted = spawner.limit.map_or(false, |limit| self.spawn_count >= limit);
            if !exhausted {
                self.spawn_timer += secs;
                if self.spawn_timer >= spawner.interval {
                    self.spawn_timer -= spawner.interval;
                    self.spawn_count += 1;
                    actions.spawn = Some(spawner.template.clone());
                }
            }
        }

        if self.destination.is_some() {
            self.move_progress += template.speed() * secs;
            let steps = self.move_progress.floor();
            self.move_progress -= steps;
            actions.steps = steps as u32;
        }

        self.age += dt;
        Ok(actions)
    }

    pub(crate) fn set_connector(&mut self, connector: &Arc<dyn RenderConnector>) {
        self.connector = Some(Arc::downgrade(connector));
    }

    /// Forget the connector; returns whether one was attached
    pub(crate) fn clear_connector(&mut self) -> bool {
        self.connector.take().is_some()
    }

    /// Deliver the batched end-of-tick update, if anything changed
    pub(crate) fn flush_render(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;
        if let Some(connector) = self.connector.as_ref().and_then(Weak::upgrade) {
            connector.on_update(self);
        }
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
