//! Motion-planning backend and planning-scene interfaces.
//!
//! A [`PlanningBackend`] stands for one move group (one arm).  Cartesian
//! planning reports the fraction of the requested straight-line path it could
//! cover; deciding whether that is good enough belongs to the caller.

use facereach_perception::Transform3D;
use facereach_types::{JointVector, ReachError};
use serde::{Deserialize, Serialize};

/// Straight-line path request through `waypoints` (end-effector poses in the
/// planning frame).
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianPathRequest {
    pub waypoints: Vec<Transform3D>,
    /// Interpolation resolution along the path, metres.
    pub eef_step_m: f64,
    /// Joint-space jump limit; `0.0` disables the check.
    pub jump_threshold: f64,
}

/// A computed trajectory.  Opaque to everything but the backend that made it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trajectory {
    waypoints: Vec<Transform3D>,
}

impl Trajectory {
    pub fn new(waypoints: Vec<Transform3D>) -> Self {
        Self { waypoints }
    }

    pub fn waypoints(&self) -> &[Transform3D] {
        &self.waypoints
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// Output of [`PlanningBackend::compute_cartesian_path`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanResult {
    pub trajectory: Trajectory,
    /// Share of the requested path achieved, in `[0, 1]`.
    pub fraction: f64,
}

/// Cartesian and joint-space planning for one arm.
pub trait PlanningBackend: Send {
    /// Move-group name, e.g. `"left_arm"`.
    fn group_name(&self) -> &str;

    /// Current end-effector pose in the planning frame.
    ///
    /// # Errors
    ///
    /// [`ReachError::Planning`] when the state is not yet known.
    fn current_pose(&self) -> Result<Transform3D, ReachError>;

    /// # Errors
    ///
    /// [`ReachError::Planning`] when the planner cannot be queried at all.
    /// A path that is merely incomplete is reported through
    /// [`PlanResult::fraction`], not as an error.
    fn compute_cartesian_path(&mut self, request: &CartesianPathRequest) -> Result<PlanResult, ReachError>;

    /// Execute `trajectory` and block until it finishes.
    ///
    /// # Errors
    ///
    /// [`ReachError::Planning`] if the controller rejects or aborts it.
    fn execute(&mut self, trajectory: &Trajectory) -> Result<(), ReachError>;

    /// Plan to a joint-space target and execute it, waiting for completion.
    /// Returns whether the motion succeeded.
    ///
    /// # Errors
    ///
    /// [`ReachError::Planning`] when the planner cannot be queried.
    fn go_to_joint_target(&mut self, target: &JointVector) -> Result<bool, ReachError>;

    /// Halt any residual motion.
    fn stop(&mut self);

    fn clear_pose_targets(&mut self);
}

/// A static cylinder added to the planning scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionObject {
    pub name: String,
    /// Frame the pose is expressed in.
    pub frame: String,
    /// Centre of the cylinder, metres.
    pub position: [f64; 3],
    pub height_m: f64,
    pub radius_m: f64,
}

impl Default for CollisionObject {
    /// The column around the robot's head and sensor mount.
    fn default() -> Self {
        Self {
            name: "head_column".to_string(),
            frame: "base".to_string(),
            position: [0.1, 0.03, 0.6],
            height_m: 1.0,
            radius_m: 0.15,
        }
    }
}

/// The collision world shared by every move group.
pub trait PlanningScene: Send {
    /// Request that `object` be added.  Registration is asynchronous: the
    /// object shows up in [`PlanningScene::known_object_names`] once the
    /// scene has accepted it.
    ///
    /// # Errors
    ///
    /// [`ReachError::Planning`] if the request cannot be sent.
    fn add_cylinder(&mut self, object: &CollisionObject) -> Result<(), ReachError>;

    fn known_object_names(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use facereach_perception::Vec3;

    #[test]
    fn trajectory_exposes_waypoints() {
        let t = Trajectory::new(vec![Transform3D::from_translation(Vec3::new(1.0, 0.0, 0.0))]);
        assert!(!t.is_empty());
        assert_eq!(t.waypoints().len(), 1);
        assert!(Trajectory::default().is_empty());
    }

    #[test]
    fn default_collision_object_is_head_column() {
        let obj = CollisionObject::default();
        assert_eq!(obj.name, "head_column");
        assert!(obj.radius_m > 0.0 && obj.height_m > 0.0);
    }
}
