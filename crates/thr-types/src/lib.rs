use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One of the robot's two arms.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Both sides, in the order predicates are emitted.
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The seven predicate kinds the decision layer reasons over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    InHumanWs,
    Picked,
    Holded,
    Positioned,
    Attached,
    Busy,
    AtHome,
}

impl PredicateKind {
    pub const ALL: [PredicateKind; 7] = [
        PredicateKind::InHumanWs,
        PredicateKind::Picked,
        PredicateKind::Holded,
        PredicateKind::Positioned,
        PredicateKind::Attached,
        PredicateKind::Busy,
        PredicateKind::AtHome,
    ];

    /// Wire name, as consumed by the decision layer.
    pub fn as_str(self) -> &'static str {
        match self {
            PredicateKind::InHumanWs => "in_human_ws",
            PredicateKind::Picked => "picked",
            PredicateKind::Holded => "holded",
            PredicateKind::Positioned => "positioned",
            PredicateKind::Attached => "attached",
            PredicateKind::Busy => "busy",
            PredicateKind::AtHome => "at_home",
        }
    }
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed fact about the scene.
///
/// Predicates are plain values: two predicates with the same kind and
/// parameters are the same fact.  The attach point of `Positioned` and
/// `Attached` is kept as a string because that is how the decision layer
/// matches it.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// The object lies within reach of the human.
    InHumanWs { object: String },
    /// The object was picked by the robot and not yet given.
    Picked { object: String },
    /// The object is currently being held by the robot for the human.
    Holded { object: String },
    /// `slave` sits at attach point `attach_point` of `master`.
    Positioned {
        master: String,
        slave: String,
        attach_point: String,
    },
    /// `slave` has been screwed onto `master` at `attach_point`.
    Attached {
        master: String,
        slave: String,
        attach_point: String,
    },
    /// The arm is executing an action.
    Busy { side: Side },
    /// The arm rests in its home pose.
    AtHome { side: Side },
}

impl Predicate {
    pub fn in_human_ws(object: impl Into<String>) -> Self {
        Predicate::InHumanWs {
            object: object.into(),
        }
    }

    pub fn picked(object: impl Into<String>) -> Self {
        Predicate::Picked {
            object: object.into(),
        }
    }

    pub fn holded(object: impl Into<String>) -> Self {
        Predicate::Holded {
            object: object.into(),
        }
    }

    pub fn positioned(master: impl Into<String>, slave: impl Into<String>, atp: usize) -> Self {
        Predicate::Positioned {
            master: master.into(),
            slave: slave.into(),
            attach_point: atp.to_string(),
        }
    }

    pub fn attached(master: impl Into<String>, slave: impl Into<String>, atp: usize) -> Self {
        Predicate::Attached {
            master: master.into(),
            slave: slave.into(),
            attach_point: atp.to_string(),
        }
    }

    pub fn busy(side: Side) -> Self {
        Predicate::Busy { side }
    }

    pub fn at_home(side: Side) -> Self {
        Predicate::AtHome { side }
    }

    pub fn kind(&self) -> PredicateKind {
        match self {
            Predicate::InHumanWs { .. } => PredicateKind::InHumanWs,
            Predicate::Picked { .. } => PredicateKind::Picked,
            Predicate::Holded { .. } => PredicateKind::Holded,
            Predicate::Positioned { .. } => PredicateKind::Positioned,
            Predicate::Attached { .. } => PredicateKind::Attached,
            Predicate::Busy { .. } => PredicateKind::Busy,
            Predicate::AtHome { .. } => PredicateKind::AtHome,
        }
    }

    /// The untyped parameter list, in declaration order.
    pub fn parameters(&self) -> Vec<String> {
        match self {
            Predicate::InHumanWs { object }
            | Predicate::Picked { object }
            | Predicate::Holded { object } => vec![object.clone()],
            Predicate::Positioned {
                master,
                slave,
                attach_point,
            }
            | Predicate::Attached {
                master,
                slave,
                attach_point,
            } => vec![master.clone(), slave.clone(), attach_point.clone()],
            Predicate::Busy { side } | Predicate::AtHome { side } => {
                vec![side.as_str().to_string()]
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.parameters().join(", "))
    }
}

/// The complete set of predicates true at one instant.
///
/// Snapshots are built wholesale and shared behind an `Arc`; nothing mutates
/// one after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SceneSnapshot {
    pub timestamp: DateTime<Utc>,
    pub predicates: BTreeSet<Predicate>,
}

impl SceneSnapshot {
    pub fn new(timestamp: DateTime<Utc>, predicates: BTreeSet<Predicate>) -> Self {
        Self {
            timestamp,
            predicates,
        }
    }

    /// A snapshot with no predicates.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, BTreeSet::new())
    }

    pub fn contains(&self, predicate: &Predicate) -> bool {
        self.predicates.contains(predicate)
    }

    /// All predicates of the given kind, in set order.
    pub fn of_kind(&self, kind: PredicateKind) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter().filter(move |p| p.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Lifecycle phase reported on the action history stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPhase {
    Starting,
    FinishedSuccess,
    FinishedFailure,
}

/// A symbolic robot action as dispatched by the decision server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotAction {
    pub id: u64,
    /// e.g. `"pick"`, `"hold"`, `"go_home_left"`
    #[serde(rename = "type")]
    pub action_type: String,
    pub parameters: Vec<String>,
}

/// One entry of the action history stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Publish order, stamped by the event bus.  Strictly increasing.
    #[serde(default)]
    pub sequence: u64,
    pub phase: EventPhase,
    pub action: RobotAction,
    /// Arm reported by the publisher, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
}

impl ActionEvent {
    pub fn new(phase: EventPhase, action_type: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            sequence: 0,
            phase,
            action: RobotAction {
                id: 0,
                action_type: action_type.into(),
                parameters,
            },
            side: None,
        }
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn action_type(&self) -> &str {
        &self.action.action_type
    }
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "thr-scene::manager"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    ActionHistory(ActionEvent),
    SceneState(SceneSnapshot),
}

/// Workspace-wide error type.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ThrError {
    #[error("Event Bus Channel Error: {0}")]
    Channel(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Scene State Error: {0}")]
    Scene(String),
}
