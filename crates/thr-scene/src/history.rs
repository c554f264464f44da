//! Action-history bookkeeping.
//!
//! Folds the decision server's action lifecycle events into per-arm
//! `busy`/`at_home` flags and the held/picked object lists the predicate
//! evaluator reads.

use thr_types::{ActionEvent, EventPhase, Side};
use tracing::{debug, error};

use crate::affinity::ArmAffinity;
use crate::error::SceneError;

pub const PICK: &str = "pick";
pub const HOLD: &str = "hold";
pub const GIVE: &str = "give";

/// Bookkeeping of one arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmState {
    pub busy: bool,
    pub at_home: bool,
}

impl Default for ArmState {
    fn default() -> Self {
        Self {
            busy: false,
            at_home: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct ActionHistory {
    left: ArmState,
    right: ArmState,
    held: Vec<String>,
    picked: Vec<String>,
    last_sequence: u64,
    applied: u64,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event and return the arm it was attributed to.
    ///
    /// Rejected events leave the bookkeeping untouched.
    pub fn apply(&mut self, event: &ActionEvent, affinity: &ArmAffinity) -> Result<Side, SceneError> {
        if event.sequence <= self.last_sequence {
            let err = SceneError::OutOfOrder {
                sequence: event.sequence,
                last: self.last_sequence,
            };
            error!(%err, "rejecting action event");
            return Err(err);
        }

        let Some(side) = affinity.resolve(event) else {
            let err = SceneError::NoArmAffinity {
                action_type: event.action.action_type.clone(),
                parameters: event.action.parameters.clone(),
            };
            error!(%err, "rejecting action event");
            return Err(err);
        };
        self.last_sequence = event.sequence;
        self.applied += 1;

        let action_type = event.action_type();
        let is_home = action_type == affinity.home_action(side);
        let arm = self.arm_mut(side);
        match event.phase {
            EventPhase::FinishedSuccess if is_home => arm.at_home = true,
            EventPhase::Starting if !is_home => arm.at_home = false,
            _ => {}
        }
        arm.busy = event.phase == EventPhase::Starting;

        match (event.phase, action_type) {
            (EventPhase::Starting, HOLD) => self.held = event.action.parameters.clone(),
            (EventPhase::FinishedSuccess, PICK) => self.picked = event.action.parameters.clone(),
            (EventPhase::FinishedSuccess, HOLD) => self.held.clear(),
            (EventPhase::FinishedSuccess, GIVE) => self.picked.clear(),
            _ => {}
        }

        debug!(
            sequence = event.sequence,
            %side,
            action = action_type,
            phase = ?event.phase,
            arm = ?self.arm(side),
            "applied action event"
        );
        Ok(side)
    }

    pub fn arm(&self, side: Side) -> ArmState {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn arm_mut(&mut self, side: Side) -> &mut ArmState {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn is_busy(&self, side: Side) -> bool {
        self.arm(side).busy
    }

    pub fn is_at_home(&self, side: Side) -> bool {
        self.arm(side).at_home
    }

    pub fn is_picked(&self, object: &str) -> bool {
        self.picked.iter().any(|o| o == object)
    }

    pub fn is_held(&self, object: &str) -> bool {
        self.held.iter().any(|o| o == object)
    }

    pub fn held(&self) -> &[String] {
        &self.held
    }

    pub fn picked(&self) -> &[String] {
        &self.picked
    }

    /// Sequence number of the last applied event, `0` before any.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Events accepted this episode.
    pub fn applied(&self) -> u64 {
        self.applied
    }
}
