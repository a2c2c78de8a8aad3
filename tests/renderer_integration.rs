//! Integration tests for attaching, swapping and detaching renderers

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rts_gamestate::core::types::{EntityId, TileCoord};
use rts_gamestate::entity::GameEntity;
use rts_gamestate::event::ManualEventLoop;
use rts_gamestate::render::{
    AttachReport, RecordingRenderFactory, RenderConnector, RenderEvent, RenderFactory,
};
use rts_gamestate::world::{Placement, SpawnRequest};
use rts_gamestate::Game;

const TICK: Duration = Duration::from_millis(500);

fn minimal() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/minimal")
}

fn start() -> (Game, Arc<ManualEventLoop>) {
    let event_loop = Arc::new(ManualEventLoop::new());
    let game = Game::new(minimal(), event_loop.clone()).expect("minimal fixture loads");
    (game, event_loop)
}

fn live_ids(game: &Game) -> Vec<EntityId> {
    game.state().read().universe().world().entity_ids().to_vec()
}

#[test]
fn test_attach_creates_one_connector_per_live_entity() {
    let (game, event_loop) = start();
    let commands = game.commands();
    let spawned: Vec<EntityId> = (1..5)
        .map(|x| commands.spawn(SpawnRequest::new("crate", Placement::rigid((x, 0)))))
        .collect();
    event_loop.advance(TICK);
    commands.despawn(spawned[1]);
    event_loop.advance(TICK);

    let live = live_ids(&game);
    assert_eq!(live.len(), 4);

    let factory = Arc::new(RecordingRenderFactory::new());
    let report = game.attach_renderer(Some(factory.clone()));
    assert_eq!(
        report,
        AttachReport {
            torn_down: 0,
            created: 4
        }
    );
    // One call per live entity, in registration order, none for the despawned one
    assert_eq!(factory.created(), live);
    assert!(!factory.created().contains(&spawned[1]));
    assert_eq!(factory.live_connectors(), 4);
}

#[test]
fn test_detach_tears_down_each_connector_once() {
    let (game, event_loop) = start();
    let commands = game.commands();
    commands.spawn(SpawnRequest::new("crate", Placement::rigid((3, 3))));
    event_loop.advance(TICK);

    let factory = Arc::new(RecordingRenderFactory::with_terrain());
    game.attach_renderer(Some(factory.clone()));
    assert!(factory.has_terrain_connector());

    let first = game.detach_renderer();
    assert_eq!(first.torn_down, 2);
    assert_eq!(factory.torn_down(), live_ids(&game));
    assert!(!factory.has_terrain_connector());

    let second = game.detach_renderer();
    assert_eq!(second, AttachReport::default());
    assert_eq!(factory.torn_down().len(), 2);
    assert_eq!(
        factory
            .events()
            .iter()
            .filter(|e| **e == RenderEvent::TerrainTornDown)
            .count(),
        1
    );

    // The simulation keeps going without a renderer
    event_loop.advance(TICK);
    assert_eq!(game.state().tick(), 2);
    assert_eq!(game.state().read().universe().world().connected_count(), 0);
}

#[test]
fn test_late_attach_scenario() {
    let (game, event_loop) = start();
    let commands = game.commands();

    // Tick 0: spawn A with no renderer
    let a = commands.spawn(SpawnRequest::new("scout", Placement::rigid((4, 4))));
    event_loop.advance(TICK);
    {
        let state = game.state().read();
        let entity = state.universe().world().get(a).expect("A exists");
        assert!(!entity.has_connector());
    }

    event_loop.run(4, TICK);
    assert_eq!(game.state().tick(), 5);

    // Tick 5: attach
    let factory = Arc::new(RecordingRenderFactory::new());
    game.attach_renderer(Some(factory.clone()));
    assert_eq!(factory.created().iter().filter(|id| **id == a).count(), 1);
    assert!(game.state().read().universe().world().get(a).unwrap().has_connector());

    // Tick 6: despawn
    commands.despawn(a);
    event_loop.advance(TICK);
    assert_eq!(factory.torn_down(), vec![a]);
    assert!(!game.state().read().universe().world().contains(a));
    // No history was replayed
    assert_eq!(game.state().tick(), 6);
}

#[test]
fn test_reattach_tears_down_previous_factory_first() {
    let (game, event_loop) = start();
    let commands = game.commands();
    commands.spawn(SpawnRequest::new("crate", Placement::rigid((7, 7))));
    event_loop.advance(TICK);

    let old = Arc::new(RecordingRenderFactory::with_terrain());
    let new = Arc::new(RecordingRenderFactory::with_terrain());
    game.attach_renderer(Some(old.clone()));
    let report = game.attach_renderer(Some(new.clone()));

    assert_eq!(
        report,
        AttachReport {
            torn_down: 2,
            created: 2
        }
    );
    assert_eq!(old.live_connectors(), 0);
    assert!(!old.has_terrain_connector());
    assert_eq!(new.live_connectors(), 2);
    assert!(new.has_terrain_connector());
    assert_eq!(old.torn_down(), new.created());

    // Only the new factory sees updates from now on
    let crate_id = live_ids(&game)[1];
    commands.set_component(
        crate_id,
        "supplies",
        rts_gamestate::data::ComponentValue::Int(7),
    );
    event_loop.advance(TICK);
    assert_eq!(new.updates_for(crate_id), 1);
    assert_eq!(old.updates_for(crate_id), 0);
}

#[test]
fn test_spawned_entities_get_connectors_immediately() {
    let (game, event_loop) = start();
    let factory = Arc::new(RecordingRenderFactory::new());
    game.attach_renderer(Some(factory.clone()));

    let commands = game.commands();
    let hut = commands.spawn(SpawnRequest::new("hut", Placement::rigid((2, 2))));
    event_loop.advance(TICK);
    assert!(factory.created().contains(&hut));
    // Creation carries the initial state, no extra update on the spawn tick
    assert_eq!(factory.updates_for(hut), 0);

    // The hut's spawner fires every 2s
    event_loop.run(4, TICK);
    let created = factory.created();
    assert_eq!(created.len(), 3);
    let scout = created[2];
    let state = game.state().read();
    let entity = state.universe().world().get(scout).expect("scout spawned by hut");
    assert_eq!(entity.template_id(), "scout");
    assert_eq!(entity.coord().distance(&TileCoord::new(2, 2)), 1);
    assert!(entity.has_connector());
}

#[test]
fn test_dropping_game_detaches_renderer() {
    let (game, event_loop) = start();
    let factory = Arc::new(RecordingRenderFactory::with_terrain());
    game.attach_renderer(Some(factory.clone()));
    event_loop.advance(TICK);
    assert_eq!(factory.live_connectors(), 1);

    drop(game);
    assert_eq!(factory.live_connectors(), 0);
    assert!(!factory.has_terrain_connector());
    assert_eq!(event_loop.registered(), 0);
}

struct CountingConnector {
    updates: Arc<AtomicUsize>,
}

impl RenderConnector for CountingConnector {
    fn on_update(&self, _entity: &GameEntity) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out connectors but never keeps them
#[derive(Default)]
struct ForgetfulFactory {
    created: AtomicUsize,
    torn_down: AtomicUsize,
    updates: Arc<AtomicUsize>,
}

impl RenderFactory for ForgetfulFactory {
    fn create_connector(&self, _entity: &GameEntity) -> Arc<dyn RenderConnector> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(CountingConnector {
            updates: Arc::clone(&self.updates),
        })
    }

    fn teardown_connector(&self, _entity: EntityId) {
        self.torn_down.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_dropped_connectors_are_not_an_error() {
    let (game, event_loop) = start();
    let factory = Arc::new(ForgetfulFactory::default());
    game.attach_renderer(Some(factory.clone()));

    let commands = game.commands();
    let scout = commands.spawn(SpawnRequest::new("scout", Placement::rigid((1, 1))));
    event_loop.advance(TICK);
    commands.move_to(scout, (8, 1));
    event_loop.run(4, TICK);

    // The scout moved, but its connector was already gone
    let moved = game.state().read().universe().world().get(scout).unwrap().coord();
    assert_ne!(moved, TileCoord::new(1, 1));
    assert_eq!(factory.updates.load(Ordering::SeqCst), 0);
    assert_eq!(game.state().read().meta().diagnostics_total(), 0);

    // Teardown is still requested for every connector handed out
    game.detach_renderer();
    assert_eq!(
        factory.created.load(Ordering::SeqCst),
        factory.torn_down.load(Ordering::SeqCst)
    );
}
