//! Test doubles shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use thr_perception::{GeometryGateway, LookupError, Transform3D};

use crate::config::{AttachConstraint, ObjectConfig, SceneConfig};

/// Gateway answering from a per-test table of `(reference, frame)` poses.
///
/// The reverse direction of every entry is answered with its inverse; any
/// other pair is `NoPath`.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    poses: Mutex<HashMap<(String, String), Transform3D>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, reference: &str, frame: &str, pose: Transform3D) {
        self.poses
            .lock()
            .unwrap()
            .insert((reference.to_string(), frame.to_string()), pose);
    }

    pub fn at(&self, reference: &str, frame: &str, x: f64, y: f64, z: f64) {
        self.set(reference, frame, Transform3D::from_translation(x, y, z));
    }

    pub fn remove(&self, reference: &str, frame: &str) {
        self.poses
            .lock()
            .unwrap()
            .remove(&(reference.to_string(), frame.to_string()));
    }
}

impl GeometryGateway for ScriptedGateway {
    fn lookup(&self, reference: &str, frame: &str, _at: Instant) -> Result<Transform3D, LookupError> {
        if reference == frame {
            return Ok(Transform3D::identity());
        }
        let poses = self.poses.lock().unwrap();
        if let Some(pose) = poses.get(&(reference.to_string(), frame.to_string())) {
            return Ok(*pose);
        }
        if let Some(pose) = poses.get(&(frame.to_string(), reference.to_string())) {
            return Ok(pose.inverse());
        }
        Err(LookupError::NoPath {
            from: reference.to_string(),
            to: frame.to_string(),
        })
    }
}

pub const HANDLE: &str = "/toolbox/handle";
pub const SIDE_RIGHT: &str = "/toolbox/side_right";
pub const SIDE_LEFT: &str = "/toolbox/side_left";

/// Handle with the right side at attach point 0 and the left side at
/// attach point 1; the two sides are unrelated.
pub fn toolbox_config() -> SceneConfig {
    let side = |partner: &str, y: f64| AttachConstraint {
        partner: partner.to_string(),
        pose: Transform3D::from_translation(0.0, y, 0.0),
        tool_pose: Transform3D::from_translation(0.0, y, 0.05),
    };
    SceneConfig {
        objects: vec![
            ObjectConfig {
                name: HANDLE.to_string(),
                constraints: vec![side(SIDE_RIGHT, -0.1), side(SIDE_LEFT, 0.1)],
            },
            ObjectConfig {
                name: SIDE_RIGHT.to_string(),
                constraints: Vec::new(),
            },
            ObjectConfig {
                name: SIDE_LEFT.to_string(),
                constraints: Vec::new(),
            },
        ],
        ..SceneConfig::default()
    }
}

/// Both sides sitting exactly on their constraint poses, the tool parked
/// away from the box and the human's wrist close to the monitored gripper.
pub fn assembled_toolbox() -> ScriptedGateway {
    let gateway = ScriptedGateway::new();
    gateway.at("base", HANDLE, 1.0, 0.0, 0.0);
    gateway.at("base", SIDE_RIGHT, 1.0, -0.1, 0.0);
    gateway.at("base", SIDE_LEFT, 1.0, 0.1, 0.0);
    gateway.at("base", "/tools/screwdriver", 0.0, 0.0, 1.5);
    gateway.at("right_gripper", "/human/wrist", 0.1, 0.0, 0.0);
    gateway
}
