//! Discrete-event scheduler interface
//!
//! The session registers one update entry point with an [`EventLoop`] and
//! makes no assumption about how simulated time maps to wall-clock time.
//! [`ManualEventLoop`] drives sessions step by step for headless runs and
//! tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use derive_more::Display;
use thiserror::Error;

/// Update entry point; `Duration` keeps deltas non-negative
pub type UpdateFn = Box<dyn FnMut(Duration) + Send>;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "registration#{}", _0)]
pub struct RegistrationId(pub u64);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventLoopError {
    #[error("Event loop is finalized")]
    Finalized,

    #[error("Callback '{0}' is already registered")]
    DuplicateName(String),
}

pub trait EventLoop: Send + Sync {
    fn register(&self, name: &str, update: UpdateFn) -> Result<RegistrationId, EventLoopError>;

    /// Remove a callback; returns whether it was registered
    fn deregister(&self, id: RegistrationId) -> bool;
}

struct Registered {
    name: String,
    update: UpdateFn,
}

#[derive(Default)]
struct LoopState {
    callbacks: BTreeMap<RegistrationId, Registered>,
    next_id: u64,
    now: Duration,
    finalized: bool,
}

/// Event loop advanced explicitly by its owner
///
/// Callbacks run in registration order while the loop is locked, so they
/// must not call back into the loop.
#[derive(Default)]
pub struct ManualEventLoop {
    state: Mutex<LoopState>,
}

impl ManualEventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every callback once with `delta`; returns how many ran
    pub fn advance(&self, delta: Duration) -> usize {
        let mut state = self.lock();
        if state.finalized {
            return 0;
        }
        state.now += delta;
        for registered in state.callbacks.values_mut() {
            (registered.update)(delta);
        }
        state.callbacks.len()
    }

    /// Advance `ticks` times by `delta`
    pub fn run(&self, ticks: u32, delta: Duration) -> usize {
        (0..ticks).map(|_| self.advance(delta)).sum()
    }

    /// Tear the loop down, dropping every callback
    ///
    /// Later registrations fail with `EventLoopError::Finalized`.
    pub fn finalize(&self) {
        let mut state = self.lock();
        state.finalized = true;
        let dropped = std::mem::take(&mut state.callbacks);
        tracing::debug!("Event loop finalized, {} callbacks dropped", dropped.len());
    }

    /// Total simulated time handed out so far
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn is_finalized(&self) -> bool {
        self.lock().finalized
    }

    pub fn registered(&self) -> usize {
        self.lock().callbacks.len()
    }

    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventLoop for ManualEventLoop {
    fn register(&self, name: &str, update: UpdateFn) -> Result<RegistrationId, EventLoopError> {
        let mut state = self.lock();
        if state.finalized {
            return Err(EventLoopError::Finalized);
        }
        if state.callbacks.values().any(|r| r.name == name) {
            return Err(EventLoopError::DuplicateName(name.to_string()));
        }
        state.next_id += 1;
        let id = RegistrationId(state.next_id);
        state.callbacks.insert(
            id,
            Registered {
                name: name.to_string(),
                update,
            },
        );
        tracing::debug!("Registered '{}' as {}", name, id);
        Ok(id)
    }

    fn deregister(&self, id: RegistrationId) -> bool {
        self.lock().callbacks.remove(&id).is_some()
    }
}

impl std::fmt::Debug for ManualEventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualEventLoop")
            .field("now", &state.now)
            .field("callbacks", &state.callbacks.len())
            .field("finalized", &state.finalized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicU64>, UpdateFn) {
        let total = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&total);
        let update: UpdateFn = Box::new(move |dt| {
            sink.fetch_add(dt.as_millis() as u64, Ordering::SeqCst);
        });
        (total, update)
    }

    #[test]
    fn test_advance_runs_callbacks() {
        let event_loop = ManualEventLoop::new();
        let (total, update) = counter();
        event_loop.register("count", update).unwrap();

        assert_eq!(event_loop.run(3, Duration::from_millis(100)), 3);
        assert_eq!(total.load(Ordering::SeqCst), 300);
        assert_eq!(event_loop.now(), Duration::from_millis(300));
    }

    #[test]
    fn test_deregister_stops_callbacks() {
        let event_loop = ManualEventLoop::new();
        let (total, update) = counter();
        let id = event_loop.register("count", update).unwrap();
        assert!(event_loop.deregister(id));
        assert!(!event_loop.deregister(id));
        event_loop.advance(Duration::from_millis(100));
        assert_eq!(total.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_finalized_loop_rejects_registration() {
        let event_loop = ManualEventLoop::new();
        event_loop.finalize();
        let (_, update) = counter();
        assert_eq!(
            event_loop.register("late", update).unwrap_err(),
            EventLoopError::Finalized
        );
        assert_eq!(event_loop.advance(Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let event_loop = ManualEventLoop::new();
        let (_, a) = counter();
        let (_, b) = counter();
        event_loop.register("count", a).unwrap();
        assert!(matches!(
            event_loop.register("count", b),
            Err(EventLoopError::DuplicateName(_))
        ));
    }
}
