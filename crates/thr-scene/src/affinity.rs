//! Mapping from action types to the arm that performs them.

use std::collections::HashSet;

use thr_types::{ActionEvent, Side};

use crate::config::AffinityConfig;

/// Lookup table built from [`AffinityConfig`].
#[derive(Debug, Clone)]
pub struct ArmAffinity {
    left: HashSet<String>,
    right: HashSet<String>,
    home_left: String,
    home_right: String,
}

impl ArmAffinity {
    pub fn from_config(config: &AffinityConfig) -> Self {
        Self {
            left: config.left.iter().cloned().collect(),
            right: config.right.iter().cloned().collect(),
            home_left: config.home_left.clone(),
            home_right: config.home_right.clone(),
        }
    }

    /// Arm configured for `action_type`, if any.
    pub fn side_of(&self, action_type: &str) -> Option<Side> {
        if self.left.contains(action_type) {
            Some(Side::Left)
        } else if self.right.contains(action_type) {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Arm an event applies to.  The table wins over the side reported by
    /// the publisher; the reported side is only used for unlisted actions.
    pub fn resolve(&self, event: &ActionEvent) -> Option<Side> {
        self.side_of(event.action_type()).or(event.side)
    }

    /// The action type that returns `side` to its home pose.
    pub fn home_action(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.home_left,
            Side::Right => &self.home_right,
        }
    }
}

impl Default for ArmAffinity {
    fn default() -> Self {
        Self::from_config(&AffinityConfig::default())
    }
}
