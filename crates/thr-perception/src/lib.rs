//! `thr-perception` – geometry layer of the assembly cell.
//!
//! Turns tracked frame poses into the transforms the scene engine grounds
//! its predicates on.
//!
//! # Modules
//!
//! - [`transform`] – [`TfEngine`][transform::TfEngine]: a graph of named
//!   reference frames with stamped rigid-body transforms, plus the pose
//!   metrics (cartesian and angular distance) used for tolerance checks.
//! - [`gateway`] – [`GeometryGateway`][gateway::GeometryGateway]: the lookup
//!   capability consumed by the engine, and
//!   [`TfGateway`][gateway::TfGateway], a shared staleness-bounded
//!   implementation over a `TfEngine`.

pub mod gateway;
pub mod transform;

pub use gateway::{GeometryGateway, LookupError, TfGateway};
pub use transform::{Quaternion, TfEngine, Transform3D, Vec3};
