//! Static scene configuration.
//!
//! Loaded once at startup and read-only afterwards.  Every field has a
//! default so a configuration file only needs to declare what differs.
//!
//! ```toml
//! rate_hz = 20.0
//! world_frame = "base"
//!
//! [tolerances]
//! position = 0.02
//! orientation = 0.05
//! dwell_secs = 3.0
//!
//! [[objects]]
//! name = "/toolbox/handle"
//!
//! [[objects.constraints]]
//! partner = "/toolbox/side_right"
//! pose = { translation = [0.0, -0.1, 0.0], rotation = [1.0, 0.0, 0.0, 0.0] }
//! tool_pose = { translation = [0.0, -0.1, 0.05], rotation = [1.0, 0.0, 0.0, 0.0] }
//!
//! [[objects]]
//! name = "/toolbox/side_right"
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thr_perception::Transform3D;

use crate::error::SceneError;

// ────────────────────────────────────────────────────────────────────────────
// Defaults
// ────────────────────────────────────────────────────────────────────────────

fn default_rate_hz() -> f64 {
    20.0
}
fn default_world_frame() -> String {
    "base".to_string()
}
fn default_tool_frame() -> String {
    "/tools/screwdriver".to_string()
}
fn default_workspace_frame() -> String {
    "/table".to_string()
}
fn default_human_frame() -> String {
    "/human/wrist".to_string()
}
fn default_monitor_frame() -> String {
    "right_gripper".to_string()
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Snapshot build rate.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,
    /// Frame all object poses are looked up in.
    #[serde(default = "default_world_frame")]
    pub world_frame: String,
    /// Frame of the screwing tool.
    #[serde(default = "default_tool_frame")]
    pub tool_frame: String,
    /// Reference frame of the human's workspace.
    #[serde(default = "default_workspace_frame")]
    pub workspace_frame: String,
    /// Tracked point on the human (withdrawal detection).
    #[serde(default = "default_human_frame")]
    pub human_frame: String,
    /// Frame the human point is measured from.
    #[serde(default = "default_monitor_frame")]
    pub monitor_frame: String,
    #[serde(default)]
    pub tolerances: Tolerances,
    #[serde(default)]
    pub affinity: AffinityConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Tracked objects, in the order predicates are evaluated.
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate_hz(),
            world_frame: default_world_frame(),
            tool_frame: default_tool_frame(),
            workspace_frame: default_workspace_frame(),
            human_frame: default_human_frame(),
            monitor_frame: default_monitor_frame(),
            tolerances: Tolerances::default(),
            affinity: AffinityConfig::default(),
            policy: PolicyConfig::default(),
            objects: Vec::new(),
        }
    }
}

/// Numeric thresholds, in metres, radians and seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Max cartesian offset between a slave and its expected pose.
    pub position: f64,
    /// Max angular offset between a slave and its expected pose.
    pub orientation: f64,
    /// Max cartesian offset between the tool and its docking pose.
    pub tool_position: f64,
    /// Time the tool must stay docked before a pair counts as screwed.
    pub dwell_secs: f64,
    /// An object closer than this to the workspace frame is in reach of the human.
    pub in_human_ws_distance: f64,
    /// The human point farther than this from the monitor frame has withdrawn.
    pub release_radius: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            position: 0.02,
            orientation: 0.05,
            tool_position: 0.03,
            dwell_secs: 3.0,
            in_human_ws_distance: 0.6,
            release_radius: 0.6,
        }
    }
}

impl Tolerances {
    pub fn dwell(&self) -> Duration {
        Duration::try_from_secs_f64(self.dwell_secs).unwrap_or(Duration::ZERO)
    }
}

/// Which arm performs which action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityConfig {
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub home_left: String,
    pub home_right: String,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            left: vec!["go_home_left".into(), "pick".into(), "give".into()],
            right: vec!["go_home_right".into(), "hold".into()],
            home_left: "go_home_left".into(),
            home_right: "go_home_right".into(),
        }
    }
}

/// Third tier of the per-object membership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipPolicy {
    /// `in_human_ws`, then `picked`, then `picked` again: `holded` is never
    /// emitted.
    #[default]
    Reference,
    /// `in_human_ws`, then `picked`, then `holded`.
    CheckHolded,
}

/// What happens to a first-touch stamp when the tool leaves its docking
/// pose before the dwell completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchTimerPolicy {
    /// The stamp is kept; dwell is measured from the very first touch.
    #[default]
    Latched,
    /// The stamp is dropped; dwell restarts at the next touch.
    ResetOnBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub membership: MembershipPolicy,
    pub touch_timer: TouchTimerPolicy,
}

/// A tracked object and the constraints it declares on its partners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub name: String,
    /// Indexed by attach point.
    #[serde(default)]
    pub constraints: Vec<AttachConstraint>,
}

/// Where `partner` must sit on the owning object, and where the tool docks
/// to screw it.  Both poses are expressed in the owning object's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachConstraint {
    pub partner: String,
    pub pose: Transform3D,
    pub tool_pose: Transform3D,
}

// ────────────────────────────────────────────────────────────────────────────
// Queries and validation
// ────────────────────────────────────────────────────────────────────────────

impl SceneConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, SceneError> {
        toml::from_str(raw).map_err(|e| SceneError::InvalidConfig(e.to_string()))
    }

    /// Period between two snapshot builds.
    pub fn tick_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.rate_hz).unwrap_or(Duration::from_millis(50))
    }

    pub fn object_names(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.name.as_str())
    }

    pub fn object(&self, name: &str) -> Option<&ObjectConfig> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// Constraint at attach point `atp` of `master`.
    pub fn constraint(&self, master: &str, atp: usize) -> Option<&AttachConstraint> {
        self.object(master).and_then(|o| o.constraints.get(atp))
    }

    /// Attach points of `master` whose partner is `slave`.
    pub fn attach_points<'a>(
        &'a self,
        master: &str,
        slave: &'a str,
    ) -> impl Iterator<Item = (usize, &'a AttachConstraint)> + 'a {
        self.object(master)
            .map(|o| o.constraints.as_slice())
            .unwrap_or_default()
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.partner == slave)
    }

    fn references(&self, owner: &str, other: &str) -> bool {
        self.attach_points(owner, other).next().is_some()
    }

    /// Orient an unordered pair as `(master, slave)`: the object whose
    /// constraints reference the other is master, `a` checked first.
    pub fn pair_direction<'a>(&self, a: &'a str, b: &'a str) -> Option<(&'a str, &'a str)> {
        if self.references(a, b) {
            Some((a, b))
        } else if self.references(b, a) {
            Some((b, a))
        } else {
            None
        }
    }

    /// Reject configurations the engine cannot evaluate meaningfully.
    pub fn validate(&self) -> Result<(), SceneError> {
        let invalid = |msg: String| Err(SceneError::InvalidConfig(msg));

        if !(self.rate_hz.is_finite() && self.rate_hz > 0.0) {
            return invalid(format!("rate_hz must be positive, got {}", self.rate_hz));
        }

        let t = &self.tolerances;
        for (name, value) in [
            ("position", t.position),
            ("orientation", t.orientation),
            ("tool_position", t.tool_position),
            ("in_human_ws_distance", t.in_human_ws_distance),
            ("release_radius", t.release_radius),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("tolerance {name} must be positive, got {value}"));
            }
        }
        if !(t.dwell_secs.is_finite() && t.dwell_secs >= 0.0) {
            return invalid(format!("dwell_secs must be non-negative, got {}", t.dwell_secs));
        }

        let mut names = HashSet::new();
        for object in &self.objects {
            if object.name.is_empty() {
                return invalid("object name must not be empty".to_string());
            }
            if !names.insert(object.name.as_str()) {
                return invalid(format!("object {} is declared twice", object.name));
            }
        }
        for object in &self.objects {
            for (atp, c) in object.constraints.iter().enumerate() {
                if c.partner == object.name {
                    return invalid(format!("{} constrains itself at attach point {atp}", object.name));
                }
                if !names.contains(c.partner.as_str()) {
                    return invalid(format!(
                        "{} attach point {atp} names untracked partner {}",
                        object.name, c.partner
                    ));
                }
            }
        }

        let a = &self.affinity;
        if let Some(both) = a.left.iter().find(|action| a.right.contains(action)) {
            return invalid(format!("action {both} is affine to both arms"));
        }
        if !a.left.contains(&a.home_left) {
            return invalid(format!("home action {} is not a left-arm action", a.home_left));
        }
        if !a.right.contains(&a.home_right) {
            return invalid(format!("home action {} is not a right-arm action", a.home_right));
        }
        Ok(())
    }
}
