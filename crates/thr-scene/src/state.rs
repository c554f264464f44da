use crate::history::ActionHistory;
use crate::sticky::StickyTracker;

/// Everything the engine mutates, kept together so one lock covers both
/// an event application and a full build pass.
#[derive(Debug, Default)]
pub struct SceneState {
    pub sticky: StickyTracker,
    pub history: ActionHistory,
}

impl SceneState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all sticky commitments and bookkeeping.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
