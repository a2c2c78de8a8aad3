//! Universe: the composition root of one session's simulated state
//!
//! Owns the world and the terrain as siblings, plus the player roster and
//! global rules resolved from the content database. It has no update logic
//! of its own and no setters; everything it holds is fixed at construction.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core::config::SessionConfig;
use crate::core::error::ConfigurationError;
use crate::core::types::{PlayerId, TeamId};
use crate::data::database::ContentDatabase;
use crate::data::manifest::{GameRules, PlayerDef};
use crate::terrain::Terrain;
use crate::world::{Placement, SpawnRecord, SpawnRequest, World};

/// Players and their teams
///
/// Diplomacy is derived from teams: players on the same team are allied,
/// everyone else is hostile.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: Vec<PlayerDef>,
}

impl Roster {
    pub fn new(players: Vec<PlayerDef>) -> Self {
        Self { players }
    }

    pub fn players(&self) -> &[PlayerDef] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerDef> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn team_of(&self, id: PlayerId) -> Option<TeamId> {
        self.player(id).map(|p| p.team)
    }

    pub fn teams(&self) -> BTreeSet<TeamId> {
        self.players.iter().map(|p| p.team).collect()
    }

    pub fn are_allied(&self, a: PlayerId, b: PlayerId) -> bool {
        match (self.team_of(a), self.team_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

pub struct Universe {
    database: Arc<ContentDatabase>,
    world: World,
    terrain: Terrain,
    roster: Roster,
    rules: GameRules,
}

impl Universe {
    /// Build terrain and an empty world from the content database
    pub fn new(
        database: Arc<ContentDatabase>,
        config: &SessionConfig,
    ) -> Result<Self, ConfigurationError> {
        let manifest = database.manifest();
        let terrain = Terrain::from_def(&manifest.terrain)?;
        let roster = Roster::new(manifest.players.clone());
        let rules = manifest.rules.clone();
        let world = World::new(Arc::clone(&database), config);

        tracing::info!(
            "Universe built: {}x{} terrain, {} players",
            terrain.width(),
            terrain.height(),
            roster.len()
        );

        Ok(Self {
            database,
            world,
            terrain,
            roster,
            rules,
        })
    }

    /// Spawn the manifest's start entities
    ///
    /// Start entities are required content: any one that cannot be created
    /// fails the whole session.
    pub(crate) fn populate(&mut self) -> Result<Vec<SpawnRecord>, ConfigurationError> {
        let database = Arc::clone(&self.database);
        let mut spawned = Vec::with_capacity(database.manifest().start.len());

        for (index, start) in database.manifest().start.iter().enumerate() {
            let request = SpawnRequest {
                template: start.template.clone(),
                placement: Placement::rigid(start.at),
                owner: start.owner,
                overrides: start.overrides.clone(),
            };
            let id = self
                .world
                .spawn(&mut self.terrain, request)
                .map_err(|e| ConfigurationError::InvalidStart {
                    index,
                    template: start.template.clone(),
                    reason: e.to_string(),
                })?;
            spawned.push(SpawnRecord {
                id,
                owner: start.owner,
                score: database.template(&start.template).map_or(0, |t| t.meta.score),
            });
        }

        tracing::info!("Placed {} start entities", spawned.len());
        Ok(spawned)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn database(&self) -> &ContentDatabase {
        &self.database
    }

    /// Split borrow for operations that touch both entities and space
    pub(crate) fn parts_mut(&mut self) -> (&mut World, &mut Terrain) {
        (&mut self.world, &mut self.terrain)
    }
}

impl std::fmt::Debug for Universe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Universe")
            .field("world", &self.world)
            .field("terrain", &self.terrain)
            .field("roster", &self.roster)
            .field("rules", &self.rules)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TileCoord;

    const MANIFEST: &str = r#"
[info]
name = "test"

[[players]]
id = 1
name = "Blue"
team = 1

[[players]]
id = 2
name = "Teal"
team = 1

[[players]]
id = 3
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
owner = 3
"#;

    const TOWER: &str = r#"
[meta]
id = "tower"
name = "Tower"
kind = "building"
score = 5
"#;

    #[test]
    fn test_roster_diplomacy() {
        let db = ContentDatabase::from_toml(MANIFEST, &[TOWER]).unwrap();
        let roster = Roster::new(db.players().to_vec());
        assert!(roster.are_allied(PlayerId(1), PlayerId(2)));
        assert!(!roster.are_allied(PlayerId(1), PlayerId(3)));
        assert!(!roster.are_allied(PlayerId(1), PlayerId(7)));
        assert_eq!(roster.teams().len(), 2);
    }

    #[test]
    fn test_populate_places_start_entities() {
        let db = Arc::new(ContentDatabase::from_toml(MANIFEST, &[TOWER]).unwrap());
        let mut universe = Universe::new(db, &SessionConfig::default()).unwrap();
        let spawned = universe.populate().unwrap();
        assert_eq!(spawned.len(), 2);
        assert_eq!(spawned[0].score, 5);
        assert_eq!(universe.world().len(), 2);
        assert!(universe.terrain().occupant(TileCoord::new(4, 4)).is_some());
    }

    #[test]
    fn test_populate_rejects_bad_start() {
        let manifest = MANIFEST.replace("at = [4, 4]", "at = [1, 1]");
        let db = Arc::new(ContentDatabase::from_toml(&manifest, &[TOWER]).unwrap());
        let mut universe = Universe::new(db, &SessionConfig::default()).unwrap();
        let err = universe.populate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidStart { index: 1, .. }));
    }

    #[test]
    fn test_oversized_terrain_is_configuration_error() {
        let manifest = MANIFEST
            .replace("width = 6", "width = 4294967295")
            .replace("height = 6", "height = 4294967295");
        let db = Arc::new(ContentDatabase::from_toml(&manifest, &[TOWER]).unwrap());
        let err = Universe::new(db, &SessionConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidTerrain(_)));
    }
}
