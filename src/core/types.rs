//! Core type definitions used throughout the codebase

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for entities
///
/// Allocated from a monotonic counter and never reused within a session, so
/// identical input sequences produce identical ids.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "entity#{}", _0)]
pub struct EntityId(pub u64);

/// Unique identifier for one play session
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Player identifier as declared in the content manifest
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "player#{}", _0)]
pub struct PlayerId(pub u32);

/// Team identifier; players sharing a team are allied
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "team#{}", _0)]
pub struct TeamId(pub u32);

/// Simulation tick counter
pub type Tick = u64;

/// Integer tile coordinate on the terrain grid
#[derive(
    Debug, Display, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[display(fmt = "({}, {})", x, y)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance (diagonal steps cost the same as straight ones)
    pub fn distance(&self, other: &Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// Candidate next tiles when stepping toward `target`, best first.
    ///
    /// The diagonal step comes first, then the two axis-aligned steps.
    /// Returns an empty list when already at the target.
    pub fn steps_toward(&self, target: &Self) -> Vec<TileCoord> {
        let dx = (target.x - self.x).signum();
        let dy = (target.y - self.y).signum();
        let mut steps = Vec::with_capacity(3);
        if dx != 0 && dy != 0 {
            steps.push(TileCoord::new(self.x + dx, self.y + dy));
        }
        if dx != 0 {
            steps.push(TileCoord::new(self.x + dx, self.y));
        }
        if dy != 0 {
            steps.push(TileCoord::new(self.x, self.y + dy));
        }
        steps
    }

    /// Tiles at exactly `radius` from this one, in a fixed scan order
    /// (row-major from the top-left corner of the ring).
    pub fn ring(&self, radius: i32) -> Vec<TileCoord> {
        if radius <= 0 {
            return vec![*self];
        }
        let mut tiles = Vec::with_capacity((8 * radius) as usize);
        for y in (self.y - radius)..=(self.y + radius) {
            for x in (self.x - radius)..=(self.x + radius) {
                let coord = TileCoord::new(x, y);
                if coord.distance(self) == radius {
                    tiles.push(coord);
                }
            }
        }
        tiles
    }
}

impl From<[i32; 2]> for TileCoord {
    fn from(v: [i32; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<(i32, i32)> for TileCoord {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}
