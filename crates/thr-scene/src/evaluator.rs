//! Geometric and bookkeeping predicate checks.
//!
//! Geometry failures never escalate: a frame that cannot be looked up makes
//! the predicate false for this cycle and the next tick tries again.

use std::time::Instant;

use thr_perception::{GeometryGateway, LookupError, Transform3D};
use thr_types::Side;
use tracing::{debug, info, trace, warn};

use crate::config::{SceneConfig, TouchTimerPolicy};
use crate::history::ActionHistory;
use crate::sticky::{PairKey, StickyTracker};

/// Evaluates predicates against the geometry visible at one instant.
pub struct PredicateEvaluator<'a> {
    config: &'a SceneConfig,
    gateway: &'a dyn GeometryGateway,
    now: Instant,
}

impl<'a> PredicateEvaluator<'a> {
    pub fn new(config: &'a SceneConfig, gateway: &'a dyn GeometryGateway, now: Instant) -> Self {
        Self {
            config,
            gateway,
            now,
        }
    }

    fn lookup(&self, reference: &str, frame: &str) -> Result<Transform3D, LookupError> {
        self.gateway.lookup(reference, frame, self.now)
    }

    /// Pose of `frame` in the frame of `master`, both taken from the world
    /// frame so a stale direct transform between them is never used.
    fn relative_to_master(&self, master: &str, frame: &str) -> Result<Transform3D, LookupError> {
        let world = &self.config.world_frame;
        let master_pose = self.lookup(world, master)?;
        let frame_pose = self.lookup(world, frame)?;
        Ok(master_pose.relative_to_self(frame_pose))
    }

    /// `object` is within reach of the human.
    pub fn in_human_workspace(&self, object: &str) -> bool {
        match self.lookup(object, &self.config.workspace_frame) {
            Ok(pose) => pose.norm() < self.config.tolerances.in_human_ws_distance,
            Err(err) => {
                trace!(object, %err, "workspace lookup failed");
                false
            }
        }
    }

    /// The slave sits on the master's attach point within tolerance, or the
    /// pair is already attached.
    pub fn positioned(&self, sticky: &StickyTracker, key: &PairKey) -> bool {
        if sticky.is_attached(key) {
            return true;
        }
        let Some(constraint) = self
            .config
            .constraint(&key.master, key.attach_point)
            .filter(|c| c.partner == key.slave)
        else {
            trace!(?key, "no such attach point");
            return false;
        };

        let tol = &self.config.tolerances;
        match self.relative_to_master(&key.master, &key.slave) {
            Ok(relative) => {
                relative.cartesian_distance(constraint.pose) < tol.position
                    && relative.angular_distance(constraint.pose) < tol.orientation
            }
            Err(err) => {
                trace!(?key, %err, "pair lookup failed");
                false
            }
        }
    }

    /// Three tiers: already attached; screwed and the human has withdrawn;
    /// positioned with the tool docked long enough to become screwed.
    ///
    /// Only the second tier can turn the predicate true during this call.
    pub fn attached(&self, sticky: &mut StickyTracker, key: &PairKey) -> bool {
        if sticky.is_attached(key) {
            return true;
        }
        if sticky.is_screwed(key) {
            return self.promote_on_release(sticky, key);
        }
        if self.positioned(sticky, key) {
            self.track_tool(sticky, key);
        }
        false
    }

    fn promote_on_release(&self, sticky: &mut StickyTracker, key: &PairKey) -> bool {
        match self.lookup(&self.config.monitor_frame, &self.config.human_frame) {
            Ok(pose) if pose.norm() > self.config.tolerances.release_radius => {
                sticky.mark_attached(key.clone());
                info!(
                    master = %key.master,
                    slave = %key.slave,
                    attach_point = key.attach_point,
                    "human withdrew, pair attached"
                );
                true
            }
            Ok(_) => false,
            Err(err) => {
                warn!(?key, %err, "cannot locate the human, pair stays screwed");
                false
            }
        }
    }

    fn track_tool(&self, sticky: &mut StickyTracker, key: &PairKey) {
        let Some(constraint) = self.config.constraint(&key.master, key.attach_point) else {
            return;
        };
        let tool = match self.relative_to_master(&key.master, &self.config.tool_frame) {
            Ok(tool) => tool,
            Err(err) => {
                debug!(?key, %err, "tool lookup failed");
                return;
            }
        };

        if tool.cartesian_distance(constraint.tool_pose) < self.config.tolerances.tool_position {
            match sticky.first_touch(&key.master, &key.slave) {
                Some(since) => {
                    let docked = self.now.saturating_duration_since(since);
                    if docked >= self.config.tolerances.dwell() && sticky.mark_screwed(key.clone()) {
                        info!(
                            master = %key.master,
                            slave = %key.slave,
                            attach_point = key.attach_point,
                            docked_secs = docked.as_secs_f64(),
                            "pair screwed"
                        );
                    }
                }
                None => {
                    sticky.touch(&key.master, &key.slave, self.now);
                    debug!(master = %key.master, slave = %key.slave, "tool docked");
                }
            }
        } else if self.config.policy.touch_timer == TouchTimerPolicy::ResetOnBreak
            && sticky.release_touch(&key.master, &key.slave)
        {
            debug!(master = %key.master, slave = %key.slave, "tool undocked, dwell restarts");
        }
    }

    pub fn busy(&self, history: &ActionHistory, side: Side) -> bool {
        history.is_busy(side)
    }

    pub fn at_home(&self, history: &ActionHistory, side: Side) -> bool {
        history.is_at_home(side)
    }

    pub fn picked(&self, history: &ActionHistory, object: &str) -> bool {
        history.is_picked(object)
    }

    pub fn holded(&self, history: &ActionHistory, object: &str) -> bool {
        history.is_held(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HANDLE, SIDE_LEFT, SIDE_RIGHT, ScriptedGateway, assembled_toolbox, toolbox_config};
    use std::time::Duration;
    use thr_perception::Quaternion;

    fn right_pair() -> PairKey {
        PairKey::new(HANDLE, SIDE_RIGHT, 0)
    }

    fn dock_tool(gateway: &ScriptedGateway) {
        gateway.at("base", "/tools/screwdriver", 1.0, -0.1, 0.05);
    }

    #[test]
    fn in_human_workspace_by_distance_to_table() {
        let config = toolbox_config();
        let gateway = ScriptedGateway::new();
        gateway.at(HANDLE, "/table", 0.3, 0.0, 0.0);
        gateway.at(SIDE_RIGHT, "/table", 0.6, 0.0, 0.0);
        let eval = PredicateEvaluator::new(&config, &gateway, Instant::now());

        assert!(eval.in_human_workspace(HANDLE));
        // strict comparison
        assert!(!eval.in_human_workspace(SIDE_RIGHT));
        // unknown frame
        assert!(!eval.in_human_workspace(SIDE_LEFT));
    }

    #[test]
    fn positioned_within_tolerances() {
        let config = toolbox_config();
        let gateway = assembled_toolbox();
        let sticky = StickyTracker::new();
        let eval = PredicateEvaluator::new(&config, &gateway, Instant::now());

        assert!(eval.positioned(&sticky, &right_pair()));
        assert!(eval.positioned(&sticky, &PairKey::new(HANDLE, SIDE_LEFT, 1)));
        // attach point 0 belongs to the right side
        assert!(!eval.positioned(&sticky, &PairKey::new(HANDLE, SIDE_LEFT, 0)));
        assert!(!eval.positioned(&sticky, &PairKey::new(HANDLE, SIDE_LEFT, 7)));
    }

    #[test]
    fn positioned_rejects_offset_and_rotation() {
        let config = toolbox_config();
        let gateway = assembled_toolbox();
        let sticky = StickyTracker::new();

        gateway.at("base", SIDE_RIGHT, 1.0, -0.125, 0.0);
        let eval = PredicateEvaluator::new(&config, &gateway, Instant::now());
        assert!(!eval.positioned(&sticky, &right_pair()));

        gateway.at("base", SIDE_RIGHT, 1.0, -0.11, 0.0);
        assert!(eval.positioned(&sticky, &right_pair()));

        gateway.set(
            "base",
            SIDE_RIGHT,
            Transform3D::new(thr_perception::Vec3::new(1.0, -0.1, 0.0), Quaternion::from_yaw(0.1)),
        );
        assert!(!eval.positioned(&sticky, &right_pair()));
    }

    #[test]
    fn positioned_is_false_when_a_frame_is_missing() {
        let config = toolbox_config();
        let gateway = assembled_toolbox();
        gateway.remove("base", SIDE_RIGHT);
        let eval = PredicateEvaluator::new(&config, &gateway, Instant::now());
        assert!(!eval.positioned(&StickyTracker::new(), &right_pair()));
    }

    #[test]
    fn dwell_threshold_is_inclusive() {
        let config = toolbox_config();
        let gateway = assembled_toolbox();
        dock_tool(&gateway);
        let mut sticky = StickyTracker::new();
        let t0 = Instant::now();
        let dwell = config.tolerances.dwell();

        assert!(!PredicateEvaluator::new(&config, &gateway, t0).attached(&mut sticky, &right_pair()));
        assert_eq!(sticky.first_touch(HANDLE, SIDE_RIGHT), Some(t0));

        let almost = t0 + dwell - Duration::from_millis(1);
        PredicateEvaluator::new(&config, &gateway, almost).attached(&mut sticky, &right_pair());
        assert!(!sticky.is_screwed(&right_pair()));

        // screwed, but the human is still close
        assert!(!PredicateEvaluator::new(&config, &gateway, t0 + dwell).attached(&mut sticky, &right_pair()));
        assert!(sticky.is_screwed(&right_pair()));
        assert!(!sticky.is_attached(&right_pair()));
    }

    #[test]
    fn first_touch_never_screws_on_its_own() {
        let mut config = toolbox_config();
        config.tolerances.dwell_secs = 0.0;
        let gateway = assembled_toolbox();
        dock_tool(&gateway);
        let mut sticky = StickyTracker::new();
        let now = Instant::now();

        let eval = PredicateEvaluator::new(&config, &gateway, now);
        eval.attached(&mut sticky, &right_pair());
        assert!(!sticky.is_screwed(&right_pair()));
        eval.attached(&mut sticky, &right_pair());
        assert!(sticky.is_screwed(&right_pair()));
    }

    #[test]
    fn withdrawal_promotes_screwed_pair() {
        let config = toolbox_config();
        let gateway = assembled_toolbox();
        let mut sticky = StickyTracker::new();
        sticky.mark_screwed(right_pair());
        let eval = PredicateEvaluator::new(&config, &gateway, Instant::now());

        assert!(!eval.attached(&mut sticky, &right_pair()));

        gateway.remove("right_gripper", "/human/wrist");
        assert!(!eval.attached(&mut sticky, &right_pair()));

        gateway.at("right_gripper", "/human/wrist", 0.0, 0.7, 0.0);
        assert!(eval.attached(&mut sticky, &right_pair()));
        assert!(sticky.is_attached(&right_pair()));
    }

    #[test]
    fn attached_pair_survives_geometry_loss() {
        let config = toolbox_config();
        let gateway = ScriptedGateway::new();
        let mut sticky = StickyTracker::new();
        sticky.mark_screwed(right_pair());
        sticky.mark_attached(right_pair());
        let eval = PredicateEvaluator::new(&config, &gateway, Instant::now());

        assert!(eval.attached(&mut sticky, &right_pair()));
        assert!(eval.positioned(&sticky, &right_pair()));
    }

    #[test]
    fn latched_timer_survives_undocking() {
        let config = toolbox_config();
        let gateway = assembled_toolbox();
        let mut sticky = StickyTracker::new();
        let t0 = Instant::now();

        dock_tool(&gateway);
        PredicateEvaluator::new(&config, &gateway, t0).attached(&mut sticky, &right_pair());
        gateway.at("base", "/tools/screwdriver", 0.0, 0.0, 1.5);
        PredicateEvaluator::new(&config, &gateway, t0 + Duration::from_secs(1))
            .attached(&mut sticky, &right_pair());
        assert_eq!(sticky.first_touch(HANDLE, SIDE_RIGHT), Some(t0));

        dock_tool(&gateway);
        PredicateEvaluator::new(&config, &gateway, t0 + Duration::from_secs(3))
            .attached(&mut sticky, &right_pair());
        assert!(sticky.is_screwed(&right_pair()));
    }

    #[test]
    fn reset_on_break_restarts_dwell() {
        let mut config = toolbox_config();
        config.policy.touch_timer = TouchTimerPolicy::ResetOnBreak;
        let gateway = assembled_toolbox();
        let mut sticky = StickyTracker::new();
        let t0 = Instant::now();

        dock_tool(&gateway);
        PredicateEvaluator::new(&config, &gateway, t0).attached(&mut sticky, &right_pair());
        gateway.at("base", "/tools/screwdriver", 0.0, 0.0, 1.5);
        PredicateEvaluator::new(&config, &gateway, t0 + Duration::from_secs(1))
            .attached(&mut sticky, &right_pair());
        assert_eq!(sticky.first_touch(HANDLE, SIDE_RIGHT), None);

        let t2 = t0 + Duration::from_secs(2);
        dock_tool(&gateway);
        PredicateEvaluator::new(&config, &gateway, t2).attached(&mut sticky, &right_pair());
        PredicateEvaluator::new(&config, &gateway, t0 + Duration::from_secs(3))
            .attached(&mut sticky, &right_pair());
        assert!(!sticky.is_screwed(&right_pair()));

        PredicateEvaluator::new(&config, &gateway, t2 + Duration::from_secs(3))
            .attached(&mut sticky, &right_pair());
        assert!(sticky.is_screwed(&right_pair()));
    }

    #[test]
    fn tool_is_ignored_when_not_positioned() {
        let config = toolbox_config();
        let gateway = assembled_toolbox();
        dock_tool(&gateway);
        gateway.at("base", SIDE_RIGHT, 2.0, 0.0, 0.0);
        let mut sticky = StickyTracker::new();

        PredicateEvaluator::new(&config, &gateway, Instant::now()).attached(&mut sticky, &right_pair());
        assert_eq!(sticky.first_touch(HANDLE, SIDE_RIGHT), None);
    }

    #[test]
    fn bookkeeping_predicates_read_history() {
        let config = toolbox_config();
        let gateway = ScriptedGateway::new();
        let history = ActionHistory::new();
        let eval = PredicateEvaluator::new(&config, &gateway, Instant::now());

        assert!(!eval.busy(&history, Side::Left));
        assert!(eval.at_home(&history, Side::Right));
        assert!(!eval.picked(&history, HANDLE));
        assert!(!eval.holded(&history, HANDLE));
    }
}
