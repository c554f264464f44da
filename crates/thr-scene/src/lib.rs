//! `thr-scene` – The Scene Predicate Engine
//!
//! Turns noisy geometry and the robot's action history into a consistent,
//! periodically published set of symbolic predicates for the collaborative
//! toolbox assembly task.
//!
//! # Modules
//!
//! - [`config`] – Static scene configuration (objects, attach constraints,
//!   tolerances, arm affinity, policies).
//! - [`affinity`] – Which arm performs which action.
//! - [`history`] – Action-history bookkeeping (`busy`, `at_home`, held and
//!   picked objects).
//! - [`sticky`] – Append-only screwed/attached commitments and tool dwell
//!   timers.
//! - [`evaluator`] – Per-predicate geometric checks.
//! - [`builder`] – One full snapshot build pass.
//! - [`store`] – The published snapshot, readable without blocking a build.
//! - [`sink`] – Visualization sinks fed with every snapshot.
//! - [`manager`] – [`SceneStateManager`], the event listener and the
//!   periodic builder loop.

pub mod affinity;
pub mod builder;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod history;
pub mod manager;
pub mod sink;
pub mod state;
pub mod sticky;
pub mod store;

#[cfg(test)]
mod testing;

pub use affinity::ArmAffinity;
pub use config::{
    AffinityConfig, AttachConstraint, MembershipPolicy, ObjectConfig, PolicyConfig, SceneConfig,
    Tolerances, TouchTimerPolicy,
};
pub use error::SceneError;
pub use history::{ActionHistory, ArmState};
pub use manager::SceneStateManager;
pub use sink::{BusSink, LogSink, VisualizationSink};
pub use state::SceneState;
pub use sticky::{PairKey, StickyTracker};
pub use store::SnapshotStore;
