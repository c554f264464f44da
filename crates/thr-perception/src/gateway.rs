//! Geometry Gateway – the frame lookup capability consumed by the scene
//! engine.
//!
//! The engine never walks a transform graph itself; it asks a
//! [`GeometryGateway`] for the pose of one frame in another at a given
//! instant and treats any [`LookupError`] as "unknown this cycle".
//!
//! [`TfGateway`] is the in-process implementation: a shared [`TfEngine`]
//! guarded by a read/write lock, fed by tracking callbacks, with an optional
//! maximum age past which a chain is reported as [`LookupError::Stale`].

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::trace;

use crate::transform::{TfEngine, Transform3D};

/// Why a frame lookup failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("frame {0} is not tracked")]
    UnknownFrame(String),

    #[error("no transform chain from {from} to {to}")]
    NoPath { from: String, to: String },

    #[error("transform from {from} to {to} is stale ({age:?} old)")]
    Stale {
        from: String,
        to: String,
        age: Duration,
    },
}

/// Frame lookup capability.
///
/// Implementations must not block for longer than their own bounded
/// timeout; failures are expected and non-fatal.
pub trait GeometryGateway: Send + Sync {
    /// Pose of `frame` expressed in `reference`, as known at `at`.
    fn lookup(&self, reference: &str, frame: &str, at: Instant) -> Result<Transform3D, LookupError>;
}

/// Shared, staleness-bounded gateway over a [`TfEngine`].
///
/// Cloning is cheap; all clones observe the same frame graph.
#[derive(Clone, Debug, Default)]
pub struct TfGateway {
    engine: Arc<RwLock<TfEngine>>,
    max_age: Option<Duration>,
}

impl TfGateway {
    /// Create an empty gateway.  When `max_age` is `Some`, lookups whose
    /// chain contains an edge older than `max_age` fail with
    /// [`LookupError::Stale`].
    pub fn new(max_age: Option<Duration>) -> Self {
        Self {
            engine: Arc::new(RwLock::new(TfEngine::new())),
            max_age,
        }
    }

    /// Record the current pose of `child` in `parent`.
    pub fn set_transform(&self, parent: &str, child: &str, transform: Transform3D) {
        self.write().set_transform(parent, child, transform);
    }

    /// Record a pose observed at `stamp`.
    pub fn set_transform_at(&self, parent: &str, child: &str, transform: Transform3D, stamp: Instant) {
        self.write().set_transform_at(parent, child, transform, stamp);
    }

    /// Forget the edge `parent → child`.
    pub fn remove_transform(&self, parent: &str, child: &str) -> bool {
        self.write().remove_transform(parent, child)
    }

    fn read(&self) -> RwLockReadGuard<'_, TfEngine> {
        self.engine
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TfEngine> {
        self.engine
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GeometryGateway for TfGateway {
    fn lookup(&self, reference: &str, frame: &str, at: Instant) -> Result<Transform3D, LookupError> {
        if reference == frame {
            return Ok(Transform3D::identity());
        }
        let engine = self.read();
        for name in [reference, frame] {
            if !engine.has_frame(name) {
                return Err(LookupError::UnknownFrame(name.to_string()));
            }
        }
        let stamped = engine
            .lookup_stamped(reference, frame)
            .ok_or_else(|| LookupError::NoPath {
                from: reference.to_string(),
                to: frame.to_string(),
            })?;

        if let (Some(max_age), Some(oldest)) = (self.max_age, stamped.oldest) {
            let age = at.saturating_duration_since(oldest);
            if age > max_age {
                trace!(from = reference, to = frame, ?age, "rejecting stale transform chain");
                return Err(LookupError::Stale {
                    from: reference.to_string(),
                    to: frame.to_string(),
                    age,
                });
            }
        }
        Ok(stamped.transform)
    }
}
