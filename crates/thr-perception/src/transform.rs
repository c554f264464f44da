//! Transform Frame (TF) Engine.
//!
//! Maintains a graph of named reference frames and the 3-D rigid-body
//! transforms (translation + quaternion rotation) that relate them.  Every
//! edge is stamped with the instant it was last observed so that callers can
//! reject chains built from stale tracking data.
//!
//! Edges are stored parent → child but may be traversed in both directions:
//! walking child → parent composes the inverse of the stored edge, the way a
//! TF tree answers lookups between any two connected frames.
//!
//! # Example
//!
//! ```rust
//! use thr_perception::transform::{TfEngine, Transform3D, Vec3, Quaternion};
//!
//! let mut tf = TfEngine::new();
//!
//! // The table is 1 m in front of the robot base.
//! tf.set_transform("base", "/table",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//!
//! // A part lies 0.2 m to the left of the base.
//! tf.set_transform("base", "/part",
//!     Transform3D::new(Vec3::new(0.0, 0.2, 0.0), Quaternion::identity()));
//!
//! // Part expressed in the table frame.
//! let t = tf.lookup("/table", "/part").unwrap();
//! assert!((t.translation.x + 1.0).abs() < 1e-9);
//! assert!((t.translation.y - 0.2).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D translation vector (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }

    /// Euclidean length.
    pub fn norm(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1); use [`Quaternion::normalized`] otherwise.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle` radians around the Z axis.
    pub fn from_yaw(angle: f64) -> Self {
        let half = angle / 2.0;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.w * rhs.w + self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Scale to unit length.  A zero quaternion maps to the identity.
    pub fn normalized(self) -> Self {
        let n = self.dot(self).sqrt();
        if n <= f64::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Smallest rotation angle (radians, in `[0, π]`) taking `self` to `rhs`.
    ///
    /// `q` and `-q` encode the same rotation, hence the absolute value.
    pub fn angle_to(self, rhs: Self) -> f64 {
        let d = self.normalized().dot(rhs.normalized()).abs().min(1.0);
        2.0 * d.acos()
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

impl From<[f64; 4]> for Quaternion {
    fn from([w, x, y, z]: [f64; 4]) -> Self {
        Self::new(w, x, y, z)
    }
}

impl From<Quaternion> for [f64; 4] {
    fn from(q: Quaternion) -> Self {
        [q.w, q.x, q.y, q.z]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: the pose of frame B expressed in frame A.
///
/// To convert a point expressed in frame B into frame A, rotate it by
/// `rotation` then add `translation`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Pure translation.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self::new(Vec3::new(x, y, z), Quaternion::identity())
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// T_B_A from T_A_B.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        Self::new(inv_rot.rotate(self.translation).neg(), inv_rot)
    }

    /// Pose of `other` relative to `self`, both given in a common frame:
    /// `inverse(self) ∘ other`.
    pub fn relative_to_self(self, other: Self) -> Self {
        self.inverse().compose(other)
    }

    /// Distance of the origin of B from the origin of A.
    pub fn norm(self) -> f64 {
        self.translation.norm()
    }

    /// Cartesian distance between the two translations.
    pub fn cartesian_distance(self, other: Self) -> f64 {
        self.translation.sub(other.translation).norm()
    }

    /// Angular distance between the two orientations (radians).
    pub fn angular_distance(self, other: Self) -> f64 {
        self.rotation.angle_to(other.rotation)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfEngine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct StampedEdge {
    transform: Transform3D,
    stamp: Instant,
}

/// A transform resolved by [`TfEngine::lookup_stamped`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampedTransform {
    pub transform: Transform3D,
    /// Stamp of the oldest edge in the chain; `None` for a same-frame lookup.
    pub oldest: Option<Instant>,
}

/// A graph of named reference frames and the [`Transform3D`]s that relate
/// them.
///
/// [`TfEngine::lookup`] performs BFS to find the shortest chain from the
/// reference frame to the target frame and returns the composed transform.
#[derive(Debug, Default)]
pub struct TfEngine {
    /// `edges[parent][child]`
    edges: HashMap<String, HashMap<String, StampedEdge>>,
    /// `parents[child]` – reverse index used to walk edges upwards.
    parents: HashMap<String, HashSet<String>>,
}

impl TfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the pose of `child_frame` in `parent_frame`,
    /// stamped now.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.set_transform_at(parent_frame, child_frame, transform, Instant::now());
    }

    /// Register or update an edge with an explicit observation stamp.
    pub fn set_transform_at(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: Instant,
    ) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), StampedEdge { transform, stamp });
        self.parents
            .entry(child_frame.to_string())
            .or_default()
            .insert(parent_frame.to_string());
    }

    /// Drop the edge `parent_frame → child_frame` (e.g. tracking lost).
    /// Returns `true` if an edge was removed.
    pub fn remove_transform(&mut self, parent_frame: &str, child_frame: &str) -> bool {
        let removed = self
            .edges
            .get_mut(parent_frame)
            .and_then(|children| children.remove(child_frame))
            .is_some();
        if removed {
            if let Some(parents) = self.parents.get_mut(child_frame) {
                parents.remove(parent_frame);
            }
        }
        removed
    }

    /// `true` if `frame` appears on at least one edge.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.get(frame).is_some_and(|c| !c.is_empty())
            || self.parents.get(frame).is_some_and(|p| !p.is_empty())
    }

    /// Pose of `target_frame` expressed in `source_frame`, or `None` if the
    /// frames are not connected.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Option<Transform3D> {
        self.lookup_stamped(source_frame, target_frame)
            .map(|s| s.transform)
    }

    /// Like [`TfEngine::lookup`], also reporting the oldest edge stamp used.
    pub fn lookup_stamped(&self, source_frame: &str, target_frame: &str) -> Option<StampedTransform> {
        if source_frame == target_frame {
            return Some(StampedTransform {
                transform: Transform3D::identity(),
                oldest: None,
            });
        }

        // Each queue item carries the transform accumulated from
        // source_frame to the current node and the oldest stamp on the way.
        let mut queue: VecDeque<(String, Transform3D, Option<Instant>)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        queue.push_back((source_frame.to_string(), Transform3D::identity(), None));
        visited.insert(source_frame.to_string());

        while let Some((current, accumulated, oldest)) = queue.pop_front() {
            for (next, edge_tf, stamp) in self.neighbours(&current) {
                if visited.contains(&next) {
                    continue;
                }
                let composed = accumulated.compose(edge_tf);
                let oldest = Some(oldest.map_or(stamp, |o: Instant| o.min(stamp)));
                if next == target_frame {
                    return Some(StampedTransform {
                        transform: composed,
                        oldest,
                    });
                }
                visited.insert(next.clone());
                queue.push_back((next, composed, oldest));
            }
        }

        None
    }

    /// Frames adjacent to `frame`, with the transform taking `frame` to them.
    fn neighbours(&self, frame: &str) -> Vec<(String, Transform3D, Instant)> {
        let mut out = Vec::new();
        if let Some(children) = self.edges.get(frame) {
            for (child, edge) in children {
                out.push((child.clone(), edge.transform, edge.stamp));
            }
        }
        if let Some(parents) = self.parents.get(frame) {
            for parent in parents {
                if let Some(edge) = self.edges.get(parent).and_then(|c| c.get(frame)) {
                    out.push((parent.clone(), edge.transform.inverse(), edge.stamp));
                }
            }
        }
        out
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
