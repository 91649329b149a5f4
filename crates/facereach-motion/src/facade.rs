//! [`MotionServiceFacade`] – request/response motion surface for both arms.
//!
//! Startup runs in a fixed order:
//!
//! 1. take ownership of both planning groups,
//! 2. enable the robot (failure aborts startup),
//! 3. [`reset`](MotionServiceFacade::reset) to neutral,
//! 4. register the collision cylinder and poll the scene until it is
//!    confirmed or `scene_timeout_ms` passes.  A timeout is logged and the
//!    facade starts anyway with [`scene_ready`](MotionServiceFacade::scene_ready)
//!    unset.
//!
//! Pose requests name their reference frame.  The planning frame and every
//! alias in `frame_aliases` (by default the perception world frame) resolve
//! through the facade's frame graph; any other frame fails with
//! [`ReachError::LookupFailed`] before the planner is touched.
//!
//! Each arm sits behind its own mutex: two requests for the same arm run one
//! after the other, requests for different arms do not wait on each other.
//! All calls block the calling thread until the motion finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use facereach_hal::sim::{SimArm, SimEnabler, SimLog, SimPlanner, SimScene};
use facereach_hal::{ArmDriver, CollisionObject, PlanningBackend, PlanningScene, RobotEnabler};
use facereach_perception::localizer::WORLD_FRAME;
use facereach_perception::{Quaternion, TfEngine, Transform3D, Vec3};
use facereach_types::{ArmSide, GoToPose, JointVector, Pose, ReachError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::planner::{ApproachOffset, CartesianFallbackPlanner, PlanOutcome, PlannerConfig};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Joint target used by [`MotionServiceFacade::go_to_joint_preset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointPreset {
    pub side: ArmSide,
    pub joints: JointVector,
}

impl Default for JointPreset {
    fn default() -> Self {
        Self {
            side: ArmSide::Left,
            joints: [-0.3, -0.7, 0.0, 1.3, 0.0, 0.9, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    /// A go-to-pose succeeds when the executed fraction is strictly above
    /// this value.
    pub success_fraction: f64,
    /// Frame the planning backends work in.
    pub planning_frame: String,
    /// Frames that coincide with `planning_frame`.
    pub frame_aliases: Vec<String>,
    pub scene_timeout_ms: u64,
    pub scene_poll_ms: u64,
    pub joint_preset: JointPreset,
    pub collision_object: CollisionObject,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            success_fraction: 0.5,
            planning_frame: "base".to_string(),
            frame_aliases: vec![WORLD_FRAME.to_string()],
            scene_timeout_ms: 4000,
            scene_poll_ms: 100,
            joint_preset: JointPreset::default(),
            collision_object: CollisionObject::default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Hardware bundle
// ────────────────────────────────────────────────────────────────────────────

/// Direct driver and planning group of one arm.
pub struct ArmHardware {
    pub driver: Box<dyn ArmDriver>,
    pub backend: Box<dyn PlanningBackend>,
}

/// Everything the facade drives.
pub struct MotionHardware {
    pub enabler: Box<dyn RobotEnabler>,
    pub left: ArmHardware,
    pub right: ArmHardware,
    pub scene: Box<dyn PlanningScene>,
}

impl MotionHardware {
    /// Fully simulated robot recording into `log`.
    pub fn simulated(log: &SimLog) -> Self {
        let arm = |side| ArmHardware {
            driver: Box::new(SimArm::new(side, log.clone())),
            backend: Box::new(SimPlanner::new(side, log.clone())),
        };
        Self {
            enabler: Box::new(SimEnabler::new(log.clone())),
            left: arm(ArmSide::Left),
            right: arm(ArmSide::Right),
            scene: Box::new(SimScene::new(log.clone())),
        }
    }
}

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Facade
// ────────────────────────────────────────────────────────────────────────────

pub struct MotionServiceFacade {
    config: FacadeConfig,
    frames: TfEngine,
    planner: CartesianFallbackPlanner,
    left: Mutex<ArmHardware>,
    right: Mutex<ArmHardware>,
    enabler: Mutex<Box<dyn RobotEnabler>>,
    scene: Mutex<Box<dyn PlanningScene>>,
    scene_ready: AtomicBool,
}

impl MotionServiceFacade {
    /// Bring the motion service up in startup order.
    ///
    /// # Errors
    ///
    /// Returns the enabler's error if the robot cannot be enabled, and any
    /// driver error raised by the neutral reset.
    pub fn start(
        config: FacadeConfig,
        planner_config: PlannerConfig,
        hardware: MotionHardware,
    ) -> Result<Self, ReachError> {
        let MotionHardware {
            enabler,
            left,
            right,
            scene,
        } = hardware;
        info!(
            left = left.backend.group_name(),
            right = right.backend.group_name(),
            "planning groups ready"
        );

        let mut frames = TfEngine::new();
        for alias in &config.frame_aliases {
            frames.set_static_transform(&config.planning_frame, alias, Transform3D::identity());
        }

        let facade = Self {
            config,
            frames,
            planner: CartesianFallbackPlanner::new(planner_config),
            left: Mutex::new(left),
            right: Mutex::new(right),
            enabler: Mutex::new(enabler),
            scene: Mutex::new(scene),
            scene_ready: AtomicBool::new(false),
        };

        if let Err(e) = lock(&facade.enabler).enable() {
            error!(error = %e, "robot enable failed");
            return Err(e);
        }
        info!("robot enabled");

        facade.reset()?;
        facade.register_collision_object();
        Ok(facade)
    }

    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    pub fn planner_config(&self) -> &PlannerConfig {
        self.planner.config()
    }

    /// Whether the collision cylinder was confirmed by the scene at startup.
    pub fn scene_ready(&self) -> bool {
        self.scene_ready.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.enabler).is_enabled()
    }

    fn arm(&self, side: ArmSide) -> MutexGuard<'_, ArmHardware> {
        match side {
            ArmSide::Left => lock(&self.left),
            ArmSide::Right => lock(&self.right),
        }
    }

    fn register_collision_object(&self) {
        let object = &self.config.collision_object;
        let mut scene = lock(&self.scene);
        if let Err(e) = scene.add_cylinder(object) {
            warn!(object = %object.name, error = %e, "collision object rejected");
            return;
        }

        let timeout = Duration::from_millis(self.config.scene_timeout_ms);
        let poll = Duration::from_millis(self.config.scene_poll_ms.max(1));
        let deadline = Instant::now() + timeout;
        loop {
            if scene.known_object_names().iter().any(|n| *n == object.name) {
                self.scene_ready.store(true, Ordering::Release);
                info!(object = %object.name, "collision object registered");
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    object = %object.name,
                    timeout_ms = self.config.scene_timeout_ms,
                    "planning scene did not confirm collision object"
                );
                return;
            }
            thread::sleep(poll.min(deadline - now));
        }
    }

    /// Drive the right arm to neutral through its direct driver.
    ///
    /// # Errors
    ///
    /// Driver errors.
    #[instrument(skip(self))]
    pub fn reset(&self) -> Result<(), ReachError> {
        self.arm(ArmSide::Right).driver.move_to_neutral()?;
        info!("right arm at neutral");
        Ok(())
    }

    /// Current end-effector pose of `side`, orientation as roll/pitch/yaw.
    ///
    /// # Errors
    ///
    /// [`ReachError::Planning`] if the backend has no state yet.
    pub fn get_pose(&self, side: ArmSide) -> Result<Pose, ReachError> {
        let t = self.arm(side).backend.current_pose()?;
        let (roll, pitch, yaw) = t.rotation.to_euler();
        Ok(Pose {
            x: t.translation.x,
            y: t.translation.y,
            z: t.translation.z,
            roll,
            pitch,
            yaw,
        })
    }

    pub fn get_joint_angles(&self, side: ArmSide) -> JointVector {
        self.arm(side).driver.joint_angles()
    }

    /// Plan to the configured joint preset and wait for completion.
    ///
    /// # Errors
    ///
    /// Backend errors.
    #[instrument(skip(self), fields(side = %self.config.joint_preset.side))]
    pub fn go_to_joint_preset(&self) -> Result<bool, ReachError> {
        let preset = &self.config.joint_preset;
        let mut arm = self.arm(preset.side);
        let reached = arm.backend.go_to_joint_target(&preset.joints)?;
        arm.backend.stop();
        if !reached {
            warn!("joint preset not reached");
        }
        Ok(reached)
    }

    /// Move `side`'s end effector to `request`.  `true` when more than
    /// `success_fraction` of the path was executed.
    pub fn go_to_pose(&self, side: ArmSide, request: &GoToPose) -> bool {
        self.go_to_pose_with_offset(side, request, ApproachOffset::none())
    }

    pub fn go_to_pose_with_offset(&self, side: ArmSide, request: &GoToPose, offset: ApproachOffset) -> bool {
        match self.plan_to_pose(side, request, offset) {
            Ok(outcome) => self.succeeded(&outcome),
            Err(e) => {
                warn!(%side, error = %e, "go_to_pose failed");
                false
            }
        }
    }

    /// As [`go_to_pose_with_offset`](Self::go_to_pose_with_offset), but
    /// returning the planner's outcome.
    ///
    /// # Errors
    ///
    /// [`ReachError::Planning`] for a non-finite request,
    /// [`ReachError::LookupFailed`] for a frame the facade cannot resolve,
    /// otherwise planner and driver errors.
    #[instrument(skip(self, request), fields(frame = %request.frame, x = request.x, y = request.y, z = request.z))]
    pub fn plan_to_pose(
        &self,
        side: ArmSide,
        request: &GoToPose,
        offset: ApproachOffset,
    ) -> Result<PlanOutcome, ReachError> {
        let values = [request.x, request.y, request.z, request.roll, request.pitch, request.yaw];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ReachError::Planning(format!("non-finite pose request {values:?}")));
        }
        let in_request_frame = Transform3D::new(
            Vec3::new(request.x, request.y, request.z),
            Quaternion::from_euler(request.roll, request.pitch, request.yaw),
        );
        let to_planning = self.frames.lookup(&self.config.planning_frame, &request.frame)?;
        let target = offset.apply(to_planning.compose(in_request_frame));

        let mut guard = self.arm(side);
        let ArmHardware { driver, backend } = &mut *guard;
        let outcome = self
            .planner
            .plan_and_execute(backend.as_mut(), driver.as_mut(), target)?;
        info!(
            fraction = outcome.fraction,
            stage = ?outcome.stage,
            success = self.succeeded(&outcome),
            "pose request finished"
        );
        Ok(outcome)
    }

    pub fn succeeded(&self, outcome: &PlanOutcome) -> bool {
        outcome.fraction > self.config.success_fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facereach_hal::sim::SIM_NEUTRAL_JOINTS;
    use std::sync::Arc;

    fn fast_config() -> FacadeConfig {
        FacadeConfig {
            scene_timeout_ms: 200,
            scene_poll_ms: 5,
            ..FacadeConfig::default()
        }
    }

    fn start(hardware: MotionHardware) -> MotionServiceFacade {
        MotionServiceFacade::start(fast_config(), PlannerConfig::default(), hardware).unwrap()
    }

    fn with_left_planner(log: &SimLog, planner: SimPlanner) -> MotionHardware {
        let mut hw = MotionHardware::simulated(log);
        hw.left.backend = Box::new(planner);
        hw
    }

    #[test]
    fn startup_order_is_enable_reset_scene() {
        let log = SimLog::new();
        let facade = start(MotionHardware::simulated(&log));

        let enable = log.position("enable").unwrap();
        let neutral = log.position("right:neutral").unwrap();
        let scene = log.position("scene:add:head_column").unwrap();
        assert!(enable < neutral && neutral < scene);
        assert!(facade.scene_ready());
        assert!(facade.is_enabled());
    }

    #[test]
    fn enable_failure_is_fatal_and_nothing_moves() {
        let log = SimLog::new();
        let mut hw = MotionHardware::simulated(&log);
        hw.enabler = Box::new(SimEnabler::refusing(log.clone(), "e-stop engaged"));

        let result = MotionServiceFacade::start(fast_config(), PlannerConfig::default(), hw);
        assert!(matches!(result, Err(ReachError::HardwareFault { .. })));
        assert_eq!(log.entries(), vec!["enable"]);
    }

    #[test]
    fn scene_timeout_is_bounded_and_non_fatal() {
        let log = SimLog::new();
        let mut hw = MotionHardware::simulated(&log);
        hw.scene = Box::new(SimScene::never_confirming(log.clone()));

        let started = Instant::now();
        let facade = MotionServiceFacade::start(
            FacadeConfig {
                scene_timeout_ms: 50,
                scene_poll_ms: 10,
                ..FacadeConfig::default()
            },
            PlannerConfig::default(),
            hw,
        )
        .unwrap();
        assert!(!facade.scene_ready());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn scene_confirmed_after_several_polls() {
        let log = SimLog::new();
        let mut hw = MotionHardware::simulated(&log);
        hw.scene = Box::new(SimScene::confirming_after(log.clone(), 4));
        let facade = start(hw);
        assert!(facade.scene_ready());
    }

    #[test]
    fn reset_moves_only_the_right_arm() {
        let log = SimLog::new();
        let facade = start(MotionHardware::simulated(&log));
        assert_eq!(facade.get_joint_angles(ArmSide::Right), SIM_NEUTRAL_JOINTS);
        assert_eq!(facade.get_joint_angles(ArmSide::Left), [0.0; 7]);
        assert_eq!(log.count("left:neutral"), 0);
    }

    #[test]
    fn get_pose_is_idempotent() {
        let log = SimLog::new();
        let facade = start(MotionHardware::simulated(&log));
        let a = facade.get_pose(ArmSide::Left).unwrap();
        let b = facade.get_pose(ArmSide::Left).unwrap();
        assert_eq!(a, b);
        let before = log.entries().len();
        facade.get_pose(ArmSide::Right).unwrap();
        assert_eq!(log.entries().len(), before);
    }

    #[test]
    fn get_pose_reports_euler_orientation() {
        let log = SimLog::new();
        let facade = start(MotionHardware::simulated(&log));
        let request = GoToPose {
            frame: "base".into(),
            x: 0.6,
            y: 0.2,
            z: 0.3,
            roll: 0.1,
            pitch: 0.2,
            yaw: 0.3,
        };
        assert!(facade.go_to_pose(ArmSide::Left, &request));
        let pose = facade.get_pose(ArmSide::Left).unwrap();
        assert!((pose.roll - 0.1).abs() < 1e-9);
        assert!((pose.pitch - 0.2).abs() < 1e-9);
        assert!((pose.yaw - 0.3).abs() < 1e-9);
        assert!((pose.z - 0.3).abs() < 1e-9);
    }

    #[test]
    fn success_requires_fraction_above_half() {
        let cases = [([0.3, 0.6], true), ([0.3, 0.5], false), ([0.3, 0.4], false)];
        for (fractions, expected) in cases {
            let log = SimLog::new();
            let planner = SimPlanner::new(ArmSide::Left, log.clone()).with_fractions(fractions);
            let facade = start(with_left_planner(&log, planner));
            let req = GoToPose::position("base", 0.6, 0.2, 0.3);
            assert_eq!(facade.go_to_pose(ArmSide::Left, &req), expected, "{fractions:?}");
            assert_eq!(log.count("left:joints"), 1);
        }
    }

    #[test]
    fn offset_is_applied_to_request() {
        let log = SimLog::new();
        let facade = start(MotionHardware::simulated(&log));
        let req = GoToPose::position("base", 0.6, 0.2, 0.5);
        assert!(facade.go_to_pose_with_offset(ArmSide::Right, &req, ApproachOffset::new(-0.1)));
        let pose = facade.get_pose(ArmSide::Right).unwrap();
        assert!((pose.z - 0.4).abs() < 1e-9);
    }

    #[test]
    fn non_finite_request_fails_without_planning() {
        let log = SimLog::new();
        let facade = start(MotionHardware::simulated(&log));
        let req = GoToPose::position("base", f64::NAN, 0.0, 0.0);
        assert!(!facade.go_to_pose(ArmSide::Left, &req));
        assert_eq!(log.count("left_arm:plan"), 0);
    }

    #[test]
    fn unknown_frame_fails_without_planning() {
        let log = SimLog::new();
        let facade = start(MotionHardware::simulated(&log));
        let req = GoToPose::position("no_such_frame", 0.6, 0.2, 0.3);

        assert!(matches!(
            facade.plan_to_pose(ArmSide::Left, &req, ApproachOffset::none()),
            Err(ReachError::LookupFailed { .. })
        ));
        assert!(!facade.go_to_pose(ArmSide::Left, &req));
        assert_eq!(log.count("left_arm:plan"), 0);
        assert_eq!(log.count("left_arm:execute:start"), 0);
    }

    #[test]
    fn world_frame_requests_resolve_to_planning_frame() {
        let log = SimLog::new();
        let facade = start(MotionHardware::simulated(&log));
        assert!(facade.go_to_pose(ArmSide::Left, &GoToPose::position(WORLD_FRAME, 0.6, 0.2, 0.3)));
        let pose = facade.get_pose(ArmSide::Left).unwrap();
        assert!((pose.x - 0.6).abs() < 1e-9);
        assert!((pose.y - 0.2).abs() < 1e-9);
        assert!((pose.z - 0.3).abs() < 1e-9);
    }

    #[test]
    fn aliases_are_configurable() {
        let log = SimLog::new();
        let config = FacadeConfig {
            frame_aliases: Vec::new(),
            ..fast_config()
        };
        let facade =
            MotionServiceFacade::start(config, PlannerConfig::default(), MotionHardware::simulated(&log)).unwrap();
        assert!(!facade.go_to_pose(ArmSide::Right, &GoToPose::position(WORLD_FRAME, 0.6, -0.2, 0.3)));
        assert!(facade.go_to_pose(ArmSide::Right, &GoToPose::position("base", 0.6, -0.2, 0.3)));
    }

    #[test]
    fn joint_preset_goes_through_planner() {
        let log = SimLog::new();
        let facade = start(MotionHardware::simulated(&log));
        assert!(facade.go_to_joint_preset().unwrap());
        assert_eq!(log.count("left_arm:joint_target"), 1);
        assert_eq!(log.count("left:joints"), 0);
    }

    #[test]
    fn same_arm_requests_do_not_interleave() {
        let log = SimLog::new();
        let planner = SimPlanner::new(ArmSide::Left, log.clone()).with_execute_delay(Duration::from_millis(20));
        let facade = Arc::new(start(with_left_planner(&log, planner)));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let f = Arc::clone(&facade);
                thread::spawn(move || {
                    let req = GoToPose::position("base", 0.5 + 0.05 * f64::from(i), 0.2, 0.3);
                    f.go_to_pose(ArmSide::Left, &req)
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }

        let executes: Vec<String> = log
            .entries()
            .into_iter()
            .filter(|e| e.starts_with("left_arm:execute"))
            .collect();
        assert_eq!(executes.len(), 6);
        for pair in executes.chunks(2) {
            assert_eq!(pair[0], "left_arm:execute:start");
            assert_eq!(pair[1], "left_arm:execute:end");
        }
    }

    #[test]
    fn arms_are_served_independently() {
        let log = SimLog::new();
        let facade = Arc::new(start(MotionHardware::simulated(&log)));
        let handles: Vec<_> = ArmSide::ALL
            .into_iter()
            .map(|side| {
                let f = Arc::clone(&facade);
                thread::spawn(move || f.go_to_pose(side, &GoToPose::position("base", 0.6, 0.0, 0.3)))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(log.count("left_arm:execute:end"), 1);
        assert_eq!(log.count("right_arm:execute:end"), 1);
    }
}
