//! [`SceneStateManager`] wires the engine together.
//!
//! Two long-running tasks share one manager:
//!
//! - the event listener applies action-history events as they arrive on the
//!   [`EventBus`];
//! - the builder loop rebuilds and publishes the snapshot at `rate_hz`.
//!
//! Both take the same state lock for a full event application or a full
//! build pass, so a snapshot never mixes two bookkeeping states.  Query
//! callers only touch the [`SnapshotStore`] and never wait for a build.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use thr_middleware::{EventBus, Topic};
use thr_perception::GeometryGateway;
use thr_types::{ActionEvent, EventPayload, SceneSnapshot, Side};
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

use crate::affinity::ArmAffinity;
use crate::builder::build_snapshot;
use crate::config::SceneConfig;
use crate::error::SceneError;
use crate::sink::VisualizationSink;
use crate::state::SceneState;
use crate::sticky::PairKey;
use crate::store::SnapshotStore;

pub struct SceneStateManager {
    config: SceneConfig,
    affinity: ArmAffinity,
    gateway: Arc<dyn GeometryGateway>,
    state: Mutex<SceneState>,
    store: SnapshotStore,
    sinks: Vec<Box<dyn VisualizationSink>>,
}

impl SceneStateManager {
    /// Validate `config` and start an episode with empty sticky state and
    /// default bookkeeping.
    pub fn new(config: SceneConfig, gateway: Arc<dyn GeometryGateway>) -> Result<Self, SceneError> {
        config.validate()?;
        info!(
            objects = ?config.object_names().collect::<Vec<_>>(),
            rate_hz = config.rate_hz,
            "scene state manager ready"
        );
        Ok(Self {
            affinity: ArmAffinity::from_config(&config.affinity),
            config,
            gateway,
            state: Mutex::new(SceneState::new()),
            store: SnapshotStore::new(SceneSnapshot::empty(Utc::now())),
            sinks: Vec::new(),
        })
    }

    /// Register a sink.  Sinks are fixed once the manager is shared.
    pub fn add_sink(&mut self, sink: Box<dyn VisualizationSink>) {
        debug!(sink = sink.name(), "visualization sink registered");
        self.sinks.push(sink);
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Handle for query callers that do not hold the manager.
    pub fn store(&self) -> SnapshotStore {
        self.store.clone()
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<SceneSnapshot> {
        self.store.latest()
    }

    fn lock_state(&self) -> MutexGuard<'_, SceneState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one action-history event to the bookkeeping.
    #[instrument(level = "debug", skip_all, fields(sequence = event.sequence, action = %event.action.action_type))]
    pub fn handle_event(&self, event: &ActionEvent) -> Result<Side, SceneError> {
        self.lock_state().history.apply(event, &self.affinity)
    }

    pub fn tick(&self) -> Arc<SceneSnapshot> {
        self.tick_at(Instant::now())
    }

    /// Build and publish a snapshot as of `now`, then hand it to the sinks.
    pub fn tick_at(&self, now: Instant) -> Arc<SceneSnapshot> {
        let published = {
            let mut state = self.lock_state();
            let snapshot = build_snapshot(&self.config, self.gateway.as_ref(), &mut state, now, Utc::now());
            self.store.publish(snapshot)
        };
        for sink in &self.sinks {
            if let Err(err) = sink.publish(&published) {
                warn!(sink = sink.name(), %err, "visualization sink failed");
            }
        }
        published
    }

    /// Forget sticky commitments and bookkeeping.  The published snapshot
    /// is left alone until the next tick.
    pub fn reset_episode(&self) {
        self.lock_state().reset();
        info!("episode reset");
    }

    /// Sequence number of the last applied action event, `0` before any.
    pub fn last_sequence(&self) -> u64 {
        self.lock_state().history.last_sequence()
    }

    /// Action events accepted this episode.
    pub fn applied_events(&self) -> u64 {
        self.lock_state().history.applied()
    }

    /// Pairs committed as attached this episode.
    pub fn attached_pairs(&self) -> Vec<PairKey> {
        self.lock_state().sticky.attached_pairs().cloned().collect()
    }

    /// Apply action-history events from `bus` until `shutdown` flips or the
    /// bus closes.  The subscription exists before this returns.
    pub fn spawn_event_listener(
        self: &Arc<Self>,
        bus: &EventBus,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let mut rx = bus.subscribe_to(Topic::ActionHistory);
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    received = rx.recv() => match received {
                        Ok(event) => {
                            if let EventPayload::ActionHistory(action) = event.payload {
                                // rejected events are logged by the bookkeeper
                                let _ = manager.handle_event(&action);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            error!(skipped, "action history listener lagged, bookkeeping may be inconsistent");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("action history listener stopped");
        })
    }

    /// Periodic builder loop.  Ticks that fall behind are skipped rather
    /// than bunched up.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period = ?self.config.tick_period(), "snapshot builder started");

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
        info!("snapshot builder stopped");
    }

    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(shutdown))
    }
}
