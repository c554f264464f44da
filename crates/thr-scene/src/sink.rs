//! Destinations for every built snapshot.
//!
//! Sinks are fire-and-forget: a failing sink is logged by the manager and
//! never delays or aborts a build.

use thr_middleware::EventBus;
use thr_types::{PredicateKind, SceneSnapshot, ThrError};
use tracing::debug;

use crate::error::SceneError;

pub trait VisualizationSink: Send + Sync {
    fn name(&self) -> &str;

    fn publish(&self, snapshot: &SceneSnapshot) -> Result<(), SceneError>;
}

/// Writes one `debug!` line per predicate kind.
#[derive(Debug, Default)]
pub struct LogSink;

impl VisualizationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn publish(&self, snapshot: &SceneSnapshot) -> Result<(), SceneError> {
        for kind in PredicateKind::ALL {
            let entries: Vec<String> = snapshot
                .of_kind(kind)
                .map(|p| p.parameters().join(" "))
                .collect();
            debug!(kind = %kind.as_str(), count = entries.len(), ?entries, "scene state");
        }
        Ok(())
    }
}

/// Publishes snapshots on the bus's `SceneState` topic.
#[derive(Debug, Clone)]
pub struct BusSink {
    bus: EventBus,
    source: String,
}

impl BusSink {
    pub fn new(bus: EventBus, source: impl Into<String>) -> Self {
        Self {
            bus,
            source: source.into(),
        }
    }
}

impl VisualizationSink for BusSink {
    fn name(&self) -> &str {
        "bus"
    }

    fn publish(&self, snapshot: &SceneSnapshot) -> Result<(), SceneError> {
        match self.bus.publish_snapshot(&self.source, snapshot.clone()) {
            // nobody watching
            Ok(_) | Err(ThrError::Channel(_)) => Ok(()),
            Err(err) => Err(SceneError::Sink {
                sink: self.name().to_string(),
                reason: err.to_string(),
            }),
        }
    }
}
