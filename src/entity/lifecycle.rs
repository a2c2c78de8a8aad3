//! Entity lifecycle state machine

use serde::Serialize;

/// Lifecycle of a single entity
///
/// `Spawning -> Active -> Despawning -> Destroyed`. An entity that fails to
/// resolve while spawning goes straight to `Destroyed`; it was never
/// registered and never had a connector. A registered entity always passes
/// through `Despawning` so the renderer sees a teardown before the entity
/// is reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Spawning,
    Active,
    Despawning,
    Destroyed,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Spawning, Active) | (Spawning, Destroyed) | (Active, Despawning) | (Despawning, Destroyed)
        )
    }

    /// Takes part in world updates
    pub fn is_live(self) -> bool {
        self == LifecycleState::Active
    }
}
