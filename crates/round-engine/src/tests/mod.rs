//! Engine scenario tests


use crate::engine::StateSink;
use crash_protocol::GameState;
use parking_lot::Mutex;

/// Sink that keeps every published snapshot
#[derive(Default)]
pub(crate) struct RecordingSink {
    states: Mutex<Vec<GameState>>,
}

impl RecordingSink {
    pub(crate) fn states(&self) -> Vec<GameState> {
        self.states.lock().clone()
    }

    pub(crate) fn last(&self) -> Option<GameState> {
        self.states.lock().last().cloned()
    }
}

impl StateSink for RecordingSink {
    fn publish(&self, state: &GameState) {
        self.states.lock().push(state.clone());
    }
}
