//! In-process simulated robot for headless runs and tests.
//!
//! Every stub writes what it was asked to do into a shared [`SimLog`], so a
//! test can assert on the exact order of commands across the enabler, both
//! arms, both planning groups and the scene.
//!
//! # Example
//!
//! ```rust
//! use facereach_hal::arm::{ArmDriver, RobotEnabler};
//! use facereach_hal::sim::{SimArm, SimEnabler, SimLog};
//! use facereach_types::ArmSide;
//!
//! let log = SimLog::new();
//! let mut enabler = SimEnabler::new(log.clone());
//! let mut arm = SimArm::new(ArmSide::Right, log.clone());
//!
//! enabler.enable().expect("sim enable must succeed");
//! arm.move_to_neutral().expect("sim arm must move");
//! assert_eq!(log.entries(), vec!["enable", "right:neutral"]);
//! ```

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use facereach_perception::{Quaternion, Transform3D, Vec3};
use facereach_types::{ArmSide, DetectionBox, JointVector, ReachError};
use tracing::debug;

use crate::arm::{ArmDriver, RobotEnabler};
use crate::camera::{ColorFrame, FaceDetector};
use crate::planning::{CartesianPathRequest, CollisionObject, PlanResult, PlanningBackend, PlanningScene, Trajectory};

/// Joint angles the simulated limbs report after `move_to_neutral`.
pub const SIM_NEUTRAL_JOINTS: JointVector = [0.0, -0.55, 0.0, 0.75, 0.0, 1.26, 0.0];

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Command log
// ────────────────────────────────────────────────────────────────────────────

/// Ordered, cloneable record of commands received by the simulated bench.
#[derive(Debug, Clone, Default)]
pub struct SimLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl SimLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.entries).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    /// Index of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        lock(&self.entries).iter().position(|e| e == entry)
    }

    /// Number of entries equal to `entry`.
    pub fn count(&self, entry: &str) -> usize {
        lock(&self.entries).iter().filter(|e| *e == entry).count()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Enabler and arms
// ────────────────────────────────────────────────────────────────────────────

/// Simulated robot enable.  Succeeds unless built with
/// [`SimEnabler::refusing`].
pub struct SimEnabler {
    enabled: bool,
    refusal: Option<String>,
    log: SimLog,
}

impl SimEnabler {
    pub fn new(log: SimLog) -> Self {
        Self {
            enabled: false,
            refusal: None,
            log,
        }
    }

    /// An enabler whose every `enable` call fails with `reason`.
    pub fn refusing(log: SimLog, reason: impl Into<String>) -> Self {
        Self {
            refusal: Some(reason.into()),
            ..Self::new(log)
        }
    }
}

impl RobotEnabler for SimEnabler {
    fn enable(&mut self) -> Result<(), ReachError> {
        self.log.record("enable");
        if let Some(reason) = &self.refusal {
            return Err(ReachError::HardwareFault {
                component: "robot_enable".to_string(),
                details: reason.clone(),
            });
        }
        self.enabled = true;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Simulated limb: joint commands take effect instantly.
pub struct SimArm {
    side: ArmSide,
    joints: JointVector,
    log: SimLog,
}

impl SimArm {
    pub fn new(side: ArmSide, log: SimLog) -> Self {
        Self {
            side,
            joints: [0.0; 7],
            log,
        }
    }
}

impl ArmDriver for SimArm {
    fn side(&self) -> ArmSide {
        self.side
    }

    fn move_to_neutral(&mut self) -> Result<(), ReachError> {
        self.log.record(format!("{}:neutral", self.side));
        self.joints = SIM_NEUTRAL_JOINTS;
        Ok(())
    }

    fn move_to_joint_positions(&mut self, target: &JointVector) -> Result<(), ReachError> {
        if target.iter().any(|q| !q.is_finite()) {
            return Err(ReachError::HardwareFault {
                component: format!("{}_arm", self.side),
                details: "non-finite joint target".to_string(),
            });
        }
        self.log.record(format!("{}:joints", self.side));
        self.joints = *target;
        Ok(())
    }

    fn joint_angles(&self) -> JointVector {
        self.joints
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Planner
// ────────────────────────────────────────────────────────────────────────────

/// Starting end-effector pose of a simulated arm: in front of the torso,
/// gripper pointing down.
pub fn sim_home_pose(side: ArmSide) -> Transform3D {
    let y = match side {
        ArmSide::Left => 0.18,
        ArmSide::Right => -0.18,
    };
    Transform3D::new(Vec3::new(0.58, y, 0.11), Quaternion::from_euler(PI, 0.0, 0.0))
}

/// Simulated move group.
///
/// Cartesian fractions are taken from a scripted queue and fall back to a
/// fixed default once it runs dry.  The returned trajectory ends the matching
/// share of the way to the last requested waypoint, and executing it moves
/// the simulated end effector there.
pub struct SimPlanner {
    group: String,
    pose: Transform3D,
    fractions: VecDeque<f64>,
    default_fraction: f64,
    execute_delay: Duration,
    log: SimLog,
}

impl SimPlanner {
    pub fn new(side: ArmSide, log: SimLog) -> Self {
        Self {
            group: format!("{side}_arm"),
            pose: sim_home_pose(side),
            fractions: VecDeque::new(),
            default_fraction: 1.0,
            execute_delay: Duration::ZERO,
            log,
        }
    }

    /// Fractions returned by successive `compute_cartesian_path` calls.
    pub fn with_fractions(mut self, fractions: impl IntoIterator<Item = f64>) -> Self {
        self.fractions = fractions.into_iter().collect();
        self
    }

    pub fn with_default_fraction(mut self, fraction: f64) -> Self {
        self.default_fraction = fraction;
        self
    }

    /// Make every `execute` block for `delay`.
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = delay;
        self
    }
}

impl PlanningBackend for SimPlanner {
    fn group_name(&self) -> &str {
        &self.group
    }

    fn current_pose(&self) -> Result<Transform3D, ReachError> {
        Ok(self.pose)
    }

    fn compute_cartesian_path(&mut self, request: &CartesianPathRequest) -> Result<PlanResult, ReachError> {
        self.log.record(format!("{}:plan", self.group));
        let goal = request
            .waypoints
            .last()
            .ok_or_else(|| ReachError::Planning("cartesian request without waypoints".to_string()))?;
        let fraction = self
            .fractions
            .pop_front()
            .unwrap_or(self.default_fraction)
            .clamp(0.0, 1.0);

        debug!(group = %self.group, fraction, "sim cartesian plan");

        let start = self.pose.translation;
        let reached = start.add(goal.translation.sub(start).scale(fraction));
        Ok(PlanResult {
            trajectory: Trajectory::new(vec![self.pose, Transform3D::new(reached, goal.rotation)]),
            fraction,
        })
    }

    fn execute(&mut self, trajectory: &Trajectory) -> Result<(), ReachError> {
        self.log.record(format!("{}:execute:start", self.group));
        if !self.execute_delay.is_zero() {
            std::thread::sleep(self.execute_delay);
        }
        if let Some(end) = trajectory.waypoints().last() {
            self.pose = *end;
        }
        self.log.record(format!("{}:execute:end", self.group));
        Ok(())
    }

    fn go_to_joint_target(&mut self, target: &JointVector) -> Result<bool, ReachError> {
        self.log.record(format!("{}:joint_target", self.group));
        Ok(target.iter().all(|q| q.is_finite()))
    }

    fn stop(&mut self) {
        self.log.record(format!("{}:stop", self.group));
    }

    fn clear_pose_targets(&mut self) {
        self.log.record(format!("{}:clear", self.group));
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Planning scene
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SceneState {
    known: Vec<String>,
    /// Objects still waiting for confirmation, with the polls left.
    pending: Vec<(String, u32)>,
}

/// Simulated planning scene.  An added object becomes visible after a
/// configurable number of `known_object_names` polls, or never.
pub struct SimScene {
    state: Mutex<SceneState>,
    confirm_after_polls: Option<u32>,
    log: SimLog,
}

impl SimScene {
    /// A scene that confirms additions on the first poll.
    pub fn new(log: SimLog) -> Self {
        Self::confirming_after(log, 1)
    }

    pub fn confirming_after(log: SimLog, polls: u32) -> Self {
        Self {
            state: Mutex::new(SceneState::default()),
            confirm_after_polls: Some(polls.max(1)),
            log,
        }
    }

    /// A scene that accepts requests but never reports the objects.
    pub fn never_confirming(log: SimLog) -> Self {
        Self {
            state: Mutex::new(SceneState::default()),
            confirm_after_polls: None,
            log,
        }
    }
}

impl PlanningScene for SimScene {
    fn add_cylinder(&mut self, object: &CollisionObject) -> Result<(), ReachError> {
        if !(object.radius_m > 0.0 && object.height_m > 0.0) {
            return Err(ReachError::Planning(format!(
                "cylinder '{}' has non-positive dimensions",
                object.name
            )));
        }
        self.log.record(format!("scene:add:{}", object.name));
        debug!(object = %object.name, frame = %object.frame, "sim scene add");
        if let Some(polls) = self.confirm_after_polls {
            lock(&self.state).pending.push((object.name.clone(), polls));
        }
        Ok(())
    }

    fn known_object_names(&self) -> Vec<String> {
        let mut state = lock(&self.state);
        let SceneState { known, pending } = &mut *state;
        pending.retain_mut(|(name, polls)| {
            *polls -= 1;
            if *polls == 0 {
                known.push(name.clone());
                false
            } else {
                true
            }
        });
        known.clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Face detector
// ────────────────────────────────────────────────────────────────────────────

/// Detector that replays scripted results, then repeats a fixed answer.
pub struct SimFaceDetector {
    script: VecDeque<Result<Vec<DetectionBox>, ReachError>>,
    steady: Vec<DetectionBox>,
}

impl SimFaceDetector {
    /// Reports the same single face on every frame.
    pub fn stationary(face: DetectionBox) -> Self {
        Self {
            script: VecDeque::new(),
            steady: vec![face],
        }
    }

    /// Replays `frames` in order, then reports no faces.
    pub fn scripted(frames: impl IntoIterator<Item = Vec<DetectionBox>>) -> Self {
        Self {
            script: frames.into_iter().map(Ok).collect(),
            steady: Vec::new(),
        }
    }

    /// Queue a detector failure ahead of the remaining script.
    pub fn fail_next(mut self, message: impl Into<String>) -> Self {
        self.script.push_front(Err(ReachError::Detector(message.into())));
        self
    }
}

impl FaceDetector for SimFaceDetector {
    fn detect(&mut self, _frame: &ColorFrame) -> Result<Vec<DetectionBox>, ReachError> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Ok(self.steady.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusing_enabler_reports_hardware_fault() {
        let log = SimLog::new();
        let mut enabler = SimEnabler::refusing(log.clone(), "e-stop engaged");
        assert!(matches!(enabler.enable(), Err(ReachError::HardwareFault { .. })));
        assert!(!enabler.is_enabled());
        assert_eq!(log.count("enable"), 1);
    }

    #[test]
    fn sim_arm_records_joint_targets() {
        let log = SimLog::new();
        let mut arm = SimArm::new(ArmSide::Left, log.clone());
        let target = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7];
        arm.move_to_joint_positions(&target).unwrap();
        assert_eq!(arm.joint_angles(), target);
        arm.move_to_neutral().unwrap();
        assert_eq!(arm.joint_angles(), SIM_NEUTRAL_JOINTS);
        assert_eq!(log.entries(), vec!["left:joints", "left:neutral"]);
    }

    #[test]
    fn sim_arm_rejects_non_finite_targets() {
        let mut arm = SimArm::new(ArmSide::Right, SimLog::new());
        let mut target = [0.0; 7];
        target[3] = f64::NAN;
        assert!(arm.move_to_joint_positions(&target).is_err());
    }

    #[test]
    fn sim_planner_replays_fractions_then_default() {
        let mut planner = SimPlanner::new(ArmSide::Left, SimLog::new())
            .with_fractions([0.5, 0.95])
            .with_default_fraction(0.7);
        let req = CartesianPathRequest {
            waypoints: vec![Transform3D::from_translation(Vec3::new(1.0, 0.0, 0.0))],
            eef_step_m: 0.01,
            jump_threshold: 0.0,
        };
        let fractions: Vec<f64> = (0..3)
            .map(|_| planner.compute_cartesian_path(&req).unwrap().fraction)
            .collect();
        assert_eq!(fractions, vec![0.5, 0.95, 0.7]);
    }

    #[test]
    fn sim_planner_execute_moves_end_effector() {
        let mut planner = SimPlanner::new(ArmSide::Right, SimLog::new());
        let goal = Transform3D::from_translation(Vec3::new(0.7, -0.2, 0.3));
        let plan = planner
            .compute_cartesian_path(&CartesianPathRequest {
                waypoints: vec![goal],
                eef_step_m: 0.01,
                jump_threshold: 0.0,
            })
            .unwrap();
        planner.execute(&plan.trajectory).unwrap();
        let pose = planner.current_pose().unwrap();
        assert!((pose.translation.x - 0.7).abs() < 1e-9);
        assert!((pose.translation.z - 0.3).abs() < 1e-9);
    }

    #[test]
    fn sim_planner_rejects_empty_request() {
        let mut planner = SimPlanner::new(ArmSide::Left, SimLog::new());
        let req = CartesianPathRequest {
            waypoints: vec![],
            eef_step_m: 0.01,
            jump_threshold: 0.0,
        };
        assert!(matches!(
            planner.compute_cartesian_path(&req),
            Err(ReachError::Planning(_))
        ));
    }

    #[test]
    fn scene_confirms_after_configured_polls() {
        let mut scene = SimScene::confirming_after(SimLog::new(), 3);
        scene.add_cylinder(&CollisionObject::default()).unwrap();
        assert!(scene.known_object_names().is_empty());
        assert!(scene.known_object_names().is_empty());
        assert_eq!(scene.known_object_names(), vec!["head_column".to_string()]);
        assert_eq!(scene.known_object_names().len(), 1);
    }

    #[test]
    fn never_confirming_scene_stays_empty() {
        let mut scene = SimScene::never_confirming(SimLog::new());
        scene.add_cylinder(&CollisionObject::default()).unwrap();
        for _ in 0..10 {
            assert!(scene.known_object_names().is_empty());
        }
    }

    #[test]
    fn degenerate_cylinder_is_rejected() {
        let mut scene = SimScene::new(SimLog::new());
        let obj = CollisionObject {
            radius_m: 0.0,
            ..CollisionObject::default()
        };
        assert!(scene.add_cylinder(&obj).is_err());
    }

    #[test]
    fn scripted_detector_replays_then_goes_quiet() {
        let face = DetectionBox::new(10, 10, 40, 40);
        let mut det = SimFaceDetector::scripted([vec![face], vec![]]).fail_next("model not loaded");
        let frame = ColorFrame::filled(2, 2, 0);
        assert!(matches!(det.detect(&frame), Err(ReachError::Detector(_))));
        assert_eq!(det.detect(&frame).unwrap(), vec![face]);
        assert!(det.detect(&frame).unwrap().is_empty());
        assert!(det.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn stationary_detector_repeats_face() {
        let face = DetectionBox::new(0, 0, 30, 30);
        let mut det = SimFaceDetector::stationary(face);
        let frame = ColorFrame::filled(2, 2, 0);
        for _ in 0..5 {
            assert_eq!(det.detect(&frame).unwrap(), vec![face]);
        }
    }
}
