//! Game: one play session from construction to teardown
//!
//! Construction runs once and in a fixed order: configuration, content
//! database, universe with its start entities, state handle, and finally
//! the scheduler registration. Any failure aborts construction, so a
//! `Game` value always holds a fully built, scheduled session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::config::SessionConfig;
use crate::core::error::{ConfigurationError, Result, SessionError};
use crate::data::database::ContentDatabase;
use crate::event::{EventLoop, RegistrationId};
use crate::render::{AttachReport, RenderFactory};
use crate::state::{GameState, SessionMeta, SessionState};
use crate::universe::Universe;
use crate::world::Commands;

pub struct Game {
    root_dir: PathBuf,
    config: SessionConfig,
    database: Arc<ContentDatabase>,
    state: GameState,
    event_loop: Arc<dyn EventLoop>,
    registration: RegistrationId,
}

impl Game {
    /// Start a session from `root_dir`, reading `session.toml` if present
    pub fn new(root_dir: impl AsRef<Path>, event_loop: Arc<dyn EventLoop>) -> Result<Self> {
        let config = SessionConfig::load(root_dir.as_ref())?;
        Self::with_config(root_dir, event_loop, config)
    }

    pub fn with_config(
        root_dir: impl AsRef<Path>,
        event_loop: Arc<dyn EventLoop>,
        config: SessionConfig,
    ) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        config
            .validate()
            .map_err(ConfigurationError::InvalidConfig)?;

        let database = Arc::new(ContentDatabase::load(&root_dir, &config)?);
        let mut universe = Universe::new(Arc::clone(&database), &config)?;
        let spawned = universe.populate()?;

        let mut meta = SessionMeta::new(universe.roster(), config.diagnostics_capacity);
        meta.record_spawns(&spawned);
        let state = GameState::new(SessionState::new(universe, meta));

        let handle = state.clone();
        let registration = event_loop
            .register(
                &format!("session-{}", state.id()),
                Box::new(move |dt| {
                    handle.advance(dt);
                }),
            )
            .map_err(|e| SessionError::Initialization(e.to_string()))?;

        tracing::info!(
            "Session {} started from {} ({} templates, {} start entities)",
            state.id(),
            root_dir.display(),
            database.template_count(),
            spawned.len()
        );

        Ok(Self {
            root_dir,
            config,
            database,
            state,
            event_loop,
            registration,
        })
    }

    /// Shared handle to the live session; clone it to keep it
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Install `factory` as the renderer, replacing any previous one
    ///
    /// The previous factory's connectors are all torn down first. The new
    /// factory is then asked for one connector per live entity. `None`
    /// detaches rendering. The simulation is neither paused nor replayed.
    pub fn attach_renderer(&self, factory: Option<Arc<dyn RenderFactory>>) -> AttachReport {
        let mut guard = self.state.write();
        let (world, terrain) = guard.universe.parts_mut();
        world.attach_renderer(terrain, factory)
    }

    pub fn detach_renderer(&self) -> AttachReport {
        self.attach_renderer(None)
    }

    /// Queue for requests applied at the start of the next tick
    pub fn commands(&self) -> Commands {
        self.state.read().universe.world().commands()
    }

    pub fn database(&self) -> &ContentDatabase {
        &self.database
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        let report = self.detach_renderer();
        self.event_loop.deregister(self.registration);
        tracing::info!(
            "Session {} ended, {} connectors torn down",
            self.state.id(),
            report.torn_down
        );
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("root_dir", &self.root_dir)
            .field("session", &self.state.id())
            .field("registration", &self.registration)
            .finish()
    }
}
