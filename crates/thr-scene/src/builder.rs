//! One full snapshot build pass.

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thr_perception::GeometryGateway;
use thr_types::{Predicate, SceneSnapshot, Side};
use tracing::{instrument, trace};

use crate::config::{MembershipPolicy, SceneConfig};
use crate::evaluator::PredicateEvaluator;
use crate::state::SceneState;
use crate::sticky::PairKey;

/// Evaluate every predicate from scratch.
///
/// The caller holds the state lock for the whole pass, so the snapshot
/// reflects one consistent view of sticky state and bookkeeping.
#[instrument(level = "trace", skip_all, fields(objects = config.objects.len()))]
pub fn build_snapshot(
    config: &SceneConfig,
    gateway: &dyn GeometryGateway,
    state: &mut SceneState,
    now: Instant,
    stamp: DateTime<Utc>,
) -> SceneSnapshot {
    let eval = PredicateEvaluator::new(config, gateway, now);
    let SceneState { sticky, history } = state;
    let mut predicates = BTreeSet::new();

    let third_tier = |object: &str| match config.policy.membership {
        MembershipPolicy::Reference => eval.picked(history, object),
        MembershipPolicy::CheckHolded => eval.holded(history, object),
    };
    for object in config.object_names() {
        if eval.in_human_workspace(object) {
            predicates.insert(Predicate::in_human_ws(object));
        } else if eval.picked(history, object) {
            predicates.insert(Predicate::picked(object));
        } else if third_tier(object) {
            predicates.insert(Predicate::holded(object));
        }
    }

    for (i, a) in config.objects.iter().enumerate() {
        for b in &config.objects[i + 1..] {
            let Some((master, slave)) = config.pair_direction(&a.name, &b.name) else {
                trace!(a = %a.name, b = %b.name, "objects are unrelated");
                continue;
            };
            for (atp, _) in config.attach_points(master, slave) {
                let key = PairKey::new(master, slave, atp);
                if eval.positioned(sticky, &key) {
                    predicates.insert(Predicate::positioned(master, slave, atp));
                }
                if eval.attached(sticky, &key) {
                    predicates.insert(Predicate::attached(master, slave, atp));
                }
            }
        }
    }

    for side in Side::ALL {
        if eval.busy(history, side) {
            predicates.insert(Predicate::busy(side));
        }
        if eval.at_home(history, side) {
            predicates.insert(Predicate::at_home(side));
        }
    }

    trace!(predicates = predicates.len(), "snapshot built");
    SceneSnapshot::new(stamp, predicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::ArmAffinity;
    use crate::testing::{HANDLE, SIDE_LEFT, SIDE_RIGHT, ScriptedGateway, assembled_toolbox, toolbox_config};
    use thr_types::{ActionEvent, EventPhase, PredicateKind};

    fn build(config: &SceneConfig, gateway: &ScriptedGateway, state: &mut SceneState) -> SceneSnapshot {
        build_snapshot(config, gateway, state, Instant::now(), Utc::now())
    }

    fn apply(state: &mut SceneState, sequence: u64, phase: EventPhase, action: &str, object: &str) {
        let event = ActionEvent::new(phase, action, vec![object.to_string()]).with_sequence(sequence);
        state.history.apply(&event, &ArmAffinity::default()).unwrap();
    }

    #[test]
    fn empty_scene_reports_arms_at_home() {
        let config = toolbox_config();
        let snapshot = build(&config, &ScriptedGateway::new(), &mut SceneState::new());
        let expected: BTreeSet<_> = [Predicate::at_home(Side::Left), Predicate::at_home(Side::Right)].into();
        assert_eq!(snapshot.predicates, expected);
    }

    #[test]
    fn assembled_pairs_are_positioned() {
        let config = toolbox_config();
        let snapshot = build(&config, &assembled_toolbox(), &mut SceneState::new());

        let positioned: Vec<_> = snapshot.of_kind(PredicateKind::Positioned).cloned().collect();
        assert_eq!(
            positioned,
            vec![
                Predicate::positioned(HANDLE, SIDE_LEFT, 1),
                Predicate::positioned(HANDLE, SIDE_RIGHT, 0),
            ]
        );
        assert_eq!(snapshot.of_kind(PredicateKind::Attached).count(), 0);
    }

    #[test]
    fn membership_has_priority_order() {
        let config = toolbox_config();
        let gateway = ScriptedGateway::new();
        gateway.at(HANDLE, "/table", 0.1, 0.0, 0.0);
        let mut state = SceneState::new();
        apply(&mut state, 1, EventPhase::FinishedSuccess, "pick", HANDLE);
        apply(&mut state, 2, EventPhase::Starting, "hold", HANDLE);

        let snapshot = build(&config, &gateway, &mut state);
        assert!(snapshot.contains(&Predicate::in_human_ws(HANDLE)));
        assert!(!snapshot.contains(&Predicate::picked(HANDLE)));
        assert!(!snapshot.contains(&Predicate::holded(HANDLE)));

        gateway.remove(HANDLE, "/table");
        let snapshot = build(&config, &gateway, &mut state);
        assert!(snapshot.contains(&Predicate::picked(HANDLE)));
        assert!(!snapshot.contains(&Predicate::holded(HANDLE)));
    }

    #[test]
    fn holded_depends_on_membership_policy() {
        let mut config = toolbox_config();
        let gateway = ScriptedGateway::new();
        let mut state = SceneState::new();
        apply(&mut state, 1, EventPhase::Starting, "hold", SIDE_LEFT);

        let snapshot = build(&config, &gateway, &mut state);
        assert_eq!(snapshot.of_kind(PredicateKind::Holded).count(), 0);

        config.policy.membership = MembershipPolicy::CheckHolded;
        let snapshot = build(&config, &gateway, &mut state);
        assert!(snapshot.contains(&Predicate::holded(SIDE_LEFT)));
    }

    #[test]
    fn busy_and_at_home_follow_bookkeeping() {
        let config = toolbox_config();
        let gateway = ScriptedGateway::new();
        let mut state = SceneState::new();
        apply(&mut state, 1, EventPhase::Starting, "hold", SIDE_LEFT);

        let snapshot = build(&config, &gateway, &mut state);
        assert!(snapshot.contains(&Predicate::busy(Side::Right)));
        assert!(!snapshot.contains(&Predicate::at_home(Side::Right)));
        assert!(!snapshot.contains(&Predicate::busy(Side::Left)));
        assert!(snapshot.contains(&Predicate::at_home(Side::Left)));
    }
}
