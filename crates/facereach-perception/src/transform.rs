//! Transform Frame (TF) Engine.
//!
//! Rigid-body primitives ([`Vec3`], [`Quaternion`], [`Transform3D`]) plus a
//! graph of named reference frames.  Given any two frame names the engine
//! composes the chain of transforms between them, walking edges in either
//! direction (reverse edges are inverted on the fly).
//!
//! Edges are either *static* (hand-calibrated mounts, never stale) or
//! *stamped*; a stamped edge older than the engine's `max_age` is treated as
//! unusable, and a lookup that can only be satisfied through stale edges
//! fails with [`ReachError::LookupFailed`].
//!
//! # Example
//!
//! ```rust
//! use facereach_perception::transform::{TfEngine, Transform3D, Vec3, Quaternion};
//!
//! let mut tf = TfEngine::new();
//! tf.set_static_transform("world", "camera_mount",
//!     Transform3D::new(Vec3::new(0.1, 0.03, 0.87), Quaternion::identity()));
//! tf.set_transform("camera_mount", "forehead",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup("world", "forehead").unwrap();
//! assert!((t.translation.x - 1.1).abs() < 1e-9);
//!
//! // Reverse lookups invert the chain.
//! let back = tf.lookup("forehead", "world").unwrap();
//! assert!((back.translation.x + 1.1).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use facereach_types::ReachError;

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (metres when used as a translation).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
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

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Euclidean length.
    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a zero / non-finite
    /// vector.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n.is_finite() && n > 0.0 {
            Some(self.scale(1.0 / n))
        } else {
            None
        }
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1); see [`Quaternion::normalized`].
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Build a rotation from roll/pitch/yaw (radians) about the fixed X, Y
    /// and Z axes, i.e. `R = Rz(yaw) · Ry(pitch) · Rx(roll)`.
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();
        Self::new(
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        )
    }

    /// Decompose into `(roll, pitch, yaw)` – the inverse of
    /// [`Quaternion::from_euler`].  Pitch is clamped to ±π/2 at the gimbal
    /// singularity.
    pub fn to_euler(self) -> (f64, f64, f64) {
        let q = self.normalized();
        let roll = (2.0 * (q.w * q.x + q.y * q.z)).atan2(1.0 - 2.0 * (q.x * q.x + q.y * q.y));
        let sinp = 2.0 * (q.w * q.y - q.z * q.x);
        let pitch = if sinp.abs() >= 1.0 {
            std::f64::consts::FRAC_PI_2.copysign(sinp)
        } else {
            sinp.asin()
        };
        let yaw = (2.0 * (q.w * q.z + q.x * q.y)).atan2(1.0 - 2.0 * (q.y * q.y + q.z * q.z));
        (roll, pitch, yaw)
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

    /// Rescale to unit length.  A zero quaternion becomes the identity.
    pub fn normalized(self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if n > 0.0 && n.is_finite() {
            Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
        } else {
            Self::identity()
        }
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// Angle (radians, in `[0, π]`) of the rotation taking `self` to `other`.
    pub fn angle_to(self, other: Self) -> f64 {
        let d = self.conjugate().mul(other).normalized();
        2.0 * d.w.abs().min(1.0).acos()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: rotation followed by translation.
///
/// Represents the pose of frame B relative to frame A: to convert a point
/// expressed in frame B into frame A, rotate it by `rotation` then add
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
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

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Pure translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quaternion::identity())
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    /// Associative, not commutative.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// The inverse transform: if `self` = T_A_B the result is T_B_A.
    pub fn inverse(self) -> Self {
        let inv_rot = self.rotation.conjugate();
        let inv_trans = inv_rot.rotate(self.translation).scale(-1.0);
        Self::new(inv_trans, inv_rot)
    }

    /// Map a point expressed in the child frame into the parent frame.
    pub fn transform_point(self, p: Vec3) -> Vec3 {
        self.translation.add(self.rotation.rotate(p))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfEngine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Edge {
    transform: Transform3D,
    /// `None` for static edges.
    stamp: Option<Instant>,
}

/// A graph of named reference frames and the [`Transform3D`]s that relate
/// them.
///
/// [`TfEngine::lookup`] performs BFS to find the shortest path from source
/// to target and returns the composed transform.
#[derive(Debug, Default)]
pub struct TfEngine {
    /// `edges[parent][child] = Edge`
    edges: HashMap<String, HashMap<String, Edge>>,
    max_age: Option<Duration>,
}

impl TfEngine {
    /// Create an empty engine whose stamped edges never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty engine that rejects stamped edges older than
    /// `max_age` at lookup time.
    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            edges: HashMap::new(),
            max_age: Some(max_age),
        }
    }

    /// Register or update a transform that never goes stale.
    pub fn set_static_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.insert(parent_frame, child_frame, Edge { transform, stamp: None });
    }

    /// Register or update a transform stamped with the current time.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.set_transform_at(parent_frame, child_frame, transform, Instant::now());
    }

    /// Register or update a transform with an explicit timestamp.
    pub fn set_transform_at(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: Instant,
    ) {
        self.insert(
            parent_frame,
            child_frame,
            Edge {
                transform,
                stamp: Some(stamp),
            },
        );
    }

    fn insert(&mut self, parent_frame: &str, child_frame: &str, edge: Edge) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), edge);
    }

    /// `true` if `frame` appears anywhere in the graph.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame) || self.edges.values().any(|c| c.contains_key(frame))
    }

    /// Compute the pose of `target_frame` expressed in `source_frame`
    /// (T_source_target).
    ///
    /// # Errors
    ///
    /// [`ReachError::LookupFailed`] when no path exists, or when every path
    /// crosses a stamped edge older than the configured `max_age`.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Result<Transform3D, ReachError> {
        if source_frame == target_frame {
            return Ok(Transform3D::identity());
        }

        let now = Instant::now();
        let mut saw_stale = false;

        let mut queue: VecDeque<(String, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        queue.push_back((source_frame.to_string(), Transform3D::identity()));
        visited.insert(source_frame.to_string());

        while let Some((current, accumulated)) = queue.pop_front() {
            for (next, edge_tf, stale) in self.neighbours(&current, now) {
                if stale {
                    saw_stale = true;
                    continue;
                }
                if visited.contains(&next) {
                    continue;
                }
                let composed = accumulated.compose(edge_tf);
                if next == target_frame {
                    return Ok(composed);
                }
                visited.insert(next.clone());
                queue.push_back((next, composed));
            }
        }

        let reason = if saw_stale {
            "transform older than max age".to_string()
        } else {
            "no path between frames".to_string()
        };
        Err(ReachError::LookupFailed {
            source_frame: source_frame.to_string(),
            target_frame: target_frame.to_string(),
            reason,
        })
    }

    /// Forward edges as stored plus reverse edges (inverted).
    fn neighbours(&self, frame: &str, now: Instant) -> Vec<(String, Transform3D, bool)> {
        let mut out = Vec::new();
        if let Some(children) = self.edges.get(frame) {
            for (child, edge) in children {
                out.push((child.clone(), edge.transform, self.is_stale(edge, now)));
            }
        }
        for (parent, children) in &self.edges {
            if let Some(edge) = children.get(frame) {
                out.push((parent.clone(), edge.transform.inverse(), self.is_stale(edge, now)));
            }
        }
        out
    }

    fn is_stale(&self, edge: &Edge, now: Instant) -> bool {
        match (self.max_age, edge.stamp) {
            (Some(max_age), Some(stamp)) => now.saturating_duration_since(stamp) > max_age,
            _ => false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
