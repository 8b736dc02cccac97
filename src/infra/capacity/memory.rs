//! In-memory capacity store with version-checked writes.

use std::collections::HashMap;

use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::core::capacity::{CapacityState, CapacityStore};
use crate::core::error::EngineError;

/// Per-day capacity states behind one mutex. Safe to share between
/// orchestrators in the same process.
#[derive(Default)]
pub struct InMemoryCapacityStore {
    states: Mutex<HashMap<NaiveDate, CapacityState>>,
}

impl InMemoryCapacityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of days with a state.
    pub fn days(&self) -> usize {
        self.states.lock().len()
    }
}

impl CapacityStore for InMemoryCapacityStore {
    fn load(&self, day: NaiveDate) -> Result<Option<CapacityState>, EngineError> {
        Ok(self.states.lock().get(&day).cloned())
    }

    fn get_or_insert(&self, state: CapacityState) -> Result<CapacityState, EngineError> {
        Ok(self.states.lock().entry(state.day).or_insert(state).clone())
    }

    fn compare_and_swap(&self, mut state: CapacityState) -> Result<CapacityState, EngineError> {
        let mut states = self.states.lock();
        let stored = states.get(&state.day).map(|s| s.version);
        match stored {
            Some(version) if version == state.version => {
                state.version += 1;
                states.insert(state.day, state.clone());
                Ok(state)
            }
            Some(version) => Err(EngineError::ConcurrencyConflict(format!(
                "capacity state for {} is at version {version}, write was based on {}",
                state.day, state.version
            ))),
            None => Err(EngineError::ConcurrencyConflict(format!(
                "no capacity state for {}",
                state.day
            ))),
        }
    }
}
