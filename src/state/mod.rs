//! Shared session state handle and session metadata
//!
//! [`GameState`] is what the rest of the program is handed instead of the
//! mutable internals. Any number of readers may hold a clone and take read
//! guards; writing is crate-private and only happens from the scheduler
//! callback and the owning `Game`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;

use crate::core::types::{PlayerId, SessionId, TeamId, Tick};
use crate::data::manifest::VictoryCondition;
use crate::entity::EntitySnapshot;
use crate::universe::{Roster, Universe};
use crate::world::{Diagnostic, SpawnRecord, TickReport};

/// How the session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    InProgress,
    Victory { team: TeamId },
    Draw,
}

impl Outcome {
    pub fn is_decided(&self) -> bool {
        !matches!(self, Outcome::InProgress)
    }
}

/// Session-scoped bookkeeping kept next to the universe
#[derive(Debug)]
pub struct SessionMeta {
    elapsed: Duration,
    ticks: Tick,
    scores: BTreeMap<PlayerId, i64>,
    /// Players that have owned at least one entity at some point
    fielded: BTreeSet<PlayerId>,
    outcome: Outcome,
    decided_at: Option<Tick>,
    diagnostics: VecDeque<Diagnostic>,
    diagnostics_capacity: usize,
    diagnostics_total: u64,
}

impl SessionMeta {
    pub(crate) fn new(roster: &Roster, diagnostics_capacity: usize) -> Self {
        Self {
            elapsed: Duration::ZERO,
            ticks: 0,
            scores: roster.players().iter().map(|p| (p.id, 0)).collect(),
            fielded: BTreeSet::new(),
            outcome: Outcome::InProgress,
            decided_at: None,
            diagnostics: VecDeque::with_capacity(diagnostics_capacity.min(1024)),
            diagnostics_capacity,
            diagnostics_total: 0,
        }
    }

    /// Simulated time since the session started
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn ticks(&self) -> Tick {
        self.ticks
    }

    pub fn score(&self, player: PlayerId) -> i64 {
        self.scores.get(&player).copied().unwrap_or(0)
    }

    pub fn scores(&self) -> &BTreeMap<PlayerId, i64> {
        &self.scores
    }

    pub fn team_scores(&self, roster: &Roster) -> BTreeMap<TeamId, i64> {
        let mut teams: BTreeMap<TeamId, i64> = roster.teams().into_iter().map(|t| (t, 0)).collect();
        for (player, score) in &self.scores {
            if let Some(team) = roster.team_of(*player) {
                *teams.entry(team).or_insert(0) += score;
            }
        }
        teams
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Tick on which the outcome was decided
    pub fn decided_at(&self) -> Option<Tick> {
        self.decided_at
    }

    /// Most recent diagnostics, oldest first
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Every diagnostic raised this session, including evicted ones
    pub fn diagnostics_total(&self) -> u64 {
        self.diagnostics_total
    }

    pub(crate) fn record_spawns(&mut self, spawned: &[SpawnRecord]) {
        for record in spawned {
            if let Some(owner) = record.owner {
                *self.scores.entry(owner).or_insert(0) += record.score;
                self.fielded.insert(owner);
            }
        }
    }

    pub(crate) fn record_tick(&mut self, dt: Duration, report: TickReport) {
        self.elapsed += dt;
        self.ticks = report.tick;
        self.record_spawns(&report.spawned);
        for diagnostic in report.diagnostics {
            self.diagnostics_total += 1;
            if self.diagnostics_capacity == 0 {
                continue;
            }
            if self.diagnostics.len() == self.diagnostics_capacity {
                self.diagnostics.pop_front();
            }
            self.diagnostics.push_back(diagnostic);
        }
    }

    /// Decide the outcome if the victory condition is met
    ///
    /// Once decided the outcome never changes.
    pub(crate) fn evaluate(&mut self, universe: &Universe) {
        if self.outcome.is_decided() {
            return;
        }
        let roster = universe.roster();
        let decided = match universe.rules().victory {
            VictoryCondition::None => None,
            VictoryCondition::Annihilation => {
                let fielded: BTreeSet<TeamId> = self
                    .fielded
                    .iter()
                    .filter_map(|p| roster.team_of(*p))
                    .collect();
                if fielded.len() < 2 {
                    None
                } else {
                    let alive: BTreeSet<TeamId> = universe
                        .world()
                        .iter()
                        .filter_map(|e| e.owner())
                        .filter_map(|p| roster.team_of(p))
                        .collect();
                    let mut alive = alive.into_iter();
                    match (alive.next(), alive.next()) {
                        (None, _) => Some(Outcome::Draw),
                        (Some(team), None) => Some(Outcome::Victory { team }),
                        _ => None,
                    }
                }
            }
            VictoryCondition::TimeLimit { seconds } => {
                (self.elapsed.as_secs_f64() >= seconds).then(|| {
                    let scores = self.team_scores(roster);
                    let best = scores.values().copied().max();
                    let mut leaders = scores.iter().filter(|(_, s)| Some(**s) == best);
                    match (leaders.next(), leaders.next()) {
                        (Some((team, _)), None) => Outcome::Victory { team: *team },
                        _ => Outcome::Draw,
                    }
                })
            }
        };

        if let Some(outcome) = decided {
            tracing::info!("Session decided at tick {}: {:?}", self.ticks, outcome);
            self.outcome = outcome;
            self.decided_at = Some(self.ticks);
        }
    }
}

/// Everything behind the session lock
#[derive(Debug)]
pub struct SessionState {
    pub(crate) universe: Universe,
    pub(crate) meta: SessionMeta,
}

impl SessionState {
    pub(crate) fn new(universe: Universe, meta: SessionMeta) -> Self {
        Self { universe, meta }
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }
}

/// Cloneable, thread-safe handle to the live session
#[derive(Clone)]
pub struct GameState {
    inner: Arc<RwLock<SessionState>>,
    id: SessionId,
}

impl GameState {
    pub(crate) fn new(state: SessionState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
            id: SessionId::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Read guard over the session; do not hold it across ticks
    pub fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        // A panicking reader cannot leave the state half-written
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tick(&self) -> Tick {
        self.read().meta.ticks()
    }

    pub fn outcome(&self) -> Outcome {
        self.read().meta.outcome()
    }

    pub fn snapshots(&self) -> Vec<EntitySnapshot> {
        self.read().universe.world().snapshots()
    }

    /// One scheduler step: advance the world and record the result
    pub(crate) fn advance(&self, dt: Duration) -> Tick {
        let mut guard = self.write();
        let state = &mut *guard;
        let (world, terrain) = state.universe.parts_mut();
        let report = world.update(terrain, dt);
        let tick = report.tick;
        state.meta.record_tick(dt, report);
        state.meta.evaluate(&state.universe);
        tick
    }

    /// Holders of this handle, `Game` included
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl std::fmt::Debug for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameState")
            .field("id", &self.id)
            .field("holders", &self.holders())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SessionConfig;
    use crate::data::database::ContentDatabase;
    use crate::world::{Placement, SpawnRequest};

    const TOWER: &str = r#"
[meta]
id = "tower"
name = "Tower"
kind = "building"
score = 5
"#;

    const FARM: &str = r#"
[meta]
id = "farm"
name = "Farm"
kind = "building"
score = 3
"#;

    fn manifest(victory: &str) -> String {
        format!(
            r#"
[info]
name = "test"

[rules.victory]
{victory}

[[players]]
id = 1
name = "Blue"
team = 1

[[players]]
id = 2
name = "Red"
team = 2

[terrain]
width = 6
height = 6
fill = "grass"

[[terrain.tiles]]
id = "grass"

[[start]]
template = "tower"
at = [1, 1]
owner = 1

[[start]]
template = "tower"
at = [4, 4]
owner = 2
"#
        )
    }

    fn session(victory: &str) -> GameState {
        let db = ContentDatabase::from_toml(&manifest(victory), &[TOWER, FARM]).unwrap();
        let mut universe = Universe::new(Arc::new(db), &SessionConfig::default()).unwrap();
        let spawned = universe.populate().unwrap();
        let mut meta = SessionMeta::new(universe.roster(), 4);
        meta.record_spawns(&spawned);
        GameState::new(SessionState::new(universe, meta))
    }

    #[test]
    fn test_scores_from_start_entities() {
        let state = session(r#"type = "none""#);
        let guard = state.read();
        assert_eq!(guard.meta().score(PlayerId(1)), 5);
        assert_eq!(guard.meta().score(PlayerId(2)), 5);
    }

    #[test]
    fn test_advance_counts_ticks_and_time() {
        let state = session(r#"type = "none""#);
        for _ in 0..3 {
            state.advance(Duration::from_millis(250));
        }
        assert_eq!(state.tick(), 3);
        assert_eq!(state.read().meta().elapsed(), Duration::from_millis(750));
        assert_eq!(state.outcome(), Outcome::InProgress);
    }

    #[test]
    fn test_annihilation() {
        let state = session(r#"type = "annihilation""#);
        state.advance(Duration::from_secs(1));
        assert_eq!(state.outcome(), Outcome::InProgress);

        let red = state.read().universe().terrain().occupant((4, 4).into()).unwrap();
        {
            let mut guard = state.write();
            let (world, terrain) = guard.universe.parts_mut();
            world.despawn(terrain, red).unwrap();
        }
        state.advance(Duration::from_secs(1));
        assert_eq!(state.outcome(), Outcome::Victory { team: TeamId(1) });
        assert_eq!(state.read().meta().decided_at(), Some(2));

        // Final once decided
        let blue = state.read().universe().terrain().occupant((1, 1).into()).unwrap();
        {
            let mut guard = state.write();
            let (world, terrain) = guard.universe.parts_mut();
            world.despawn(terrain, blue).unwrap();
        }
        state.advance(Duration::from_secs(1));
        assert_eq!(state.outcome(), Outcome::Victory { team: TeamId(1) });
    }

    #[test]
    fn test_time_limit_tie_and_win() {
        let state = session("type = \"time_limit\"\nseconds = 2.0");
        state.advance(Duration::from_secs(1));
        assert_eq!(state.outcome(), Outcome::InProgress);
        state.advance(Duration::from_secs(1));
        assert_eq!(state.outcome(), Outcome::Draw);

        let state = session("type = \"time_limit\"\nseconds = 2.0");
        {
            let guard = state.read();
            guard
                .universe()
                .world()
                .commands()
                .spawn(SpawnRequest::new("farm", Placement::rigid((2, 2))).owned_by(PlayerId(2)));
        }
        state.advance(Duration::from_secs(1));
        state.advance(Duration::from_secs(1));
        assert_eq!(state.outcome(), Outcome::Victory { team: TeamId(2) });
    }

    #[test]
    fn test_diagnostics_ring_is_bounded() {
        let state = session(r#"type = "none""#);
        let commands = state.read().universe().world().commands();
        for i in 0..6 {
            commands.despawn(crate::core::types::EntityId(100 + i));
        }
        state.advance(Duration::from_secs(1));
        let guard = state.read();
        assert_eq!(guard.meta().diagnostics().count(), 4);
        assert_eq!(guard.meta().diagnostics_total(), 6);
        assert_eq!(
            guard.meta().diagnostics().next().map(|d| d.entity),
            Some(Some(crate::core::types::EntityId(102)))
        );
    }
}
