//! Per-test context holder.

use std::sync::{Arc, Mutex};

use crate::state::DatabaseConfigurationState;

/// Current [`DatabaseConfigurationState`] of one executing test.
///
/// Each test owns its own context; clones share the same value so the test
/// body and anything serving it (e.g. a request handler that applied the
/// routing header) observe the same database. Starts as `Uninitialized`.
#[derive(Debug, Clone, Default)]
pub struct TestContext {
    state: Arc<Mutex<DatabaseConfigurationState>>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that starts at the given state.
    pub fn with_state(state: DatabaseConfigurationState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn get(&self) -> DatabaseConfigurationState {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set(&self, state: DatabaseConfigurationState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Store `state` and return the previous value.
    pub fn replace(&self, state: DatabaseConfigurationState) -> DatabaseConfigurationState {
        std::mem::replace(&mut *self.state.lock().unwrap_or_else(|e| e.into_inner()), state)
    }

    pub fn reset(&self) {
        self.set(DatabaseConfigurationState::Uninitialized);
    }
}
