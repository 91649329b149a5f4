//! [`CartesianFallbackPlanner`] – direct cartesian plan with a single
//! preset-repositioning retry.
//!
//! ```text
//!   DIRECT ──fraction ≥ acceptance──▶ execute ──▶ done (Direct)
//!     │
//!     └─fraction < acceptance──▶ FALLBACK: drive arm to preset (no planner)
//!                                 ▶ re-plan ▶ execute ▶ done (Fallback)
//! ```
//!
//! The second plan is executed whatever its fraction.  Either way the
//! backend is stopped and its pose targets cleared before returning.

use facereach_hal::{ArmDriver, CartesianPathRequest, PlanningBackend};
use facereach_perception::{Transform3D, Vec3};
use facereach_types::{ArmSide, JointVector, ReachError};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Left-arm repositioning preset.
pub const LEFT_FALLBACK_JOINTS: JointVector = [-0.08, -1.0, -1.19, 1.94, 0.67, 1.03, -0.50];
/// Right-arm repositioning preset (mirror of the left).
pub const RIGHT_FALLBACK_JOINTS: JointVector = [0.08, -1.0, 1.19, 1.94, -0.67, 1.03, 0.50];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Minimum direct-plan fraction executed without falling back.
    pub acceptance_fraction: f64,
    pub eef_step_m: f64,
    pub jump_threshold: f64,
    pub left_fallback: JointVector,
    pub right_fallback: JointVector,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            acceptance_fraction: 0.90,
            eef_step_m: 0.01,
            jump_threshold: 0.0,
            left_fallback: LEFT_FALLBACK_JOINTS,
            right_fallback: RIGHT_FALLBACK_JOINTS,
        }
    }
}

impl PlannerConfig {
    pub fn fallback_for(&self, side: ArmSide) -> &JointVector {
        match side {
            ArmSide::Left => &self.left_fallback,
            ArmSide::Right => &self.right_fallback,
        }
    }
}

/// Vertical offset applied to a target before planning, chosen per call
/// site (e.g. to stop short below a detected forehead).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ApproachOffset {
    pub dz_m: f64,
}

impl ApproachOffset {
    pub fn new(dz_m: f64) -> Self {
        Self { dz_m }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// `target` shifted by the offset along the planning frame's z axis.
    pub fn apply(self, target: Transform3D) -> Transform3D {
        Transform3D::new(
            target.translation.add(Vec3::new(0.0, 0.0, self.dz_m)),
            target.rotation,
        )
    }
}

/// Which stage produced the executed trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStage {
    Direct,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanOutcome {
    /// Fraction of the executed plan.
    pub fraction: f64,
    pub stage: PlanStage,
}

pub struct CartesianFallbackPlanner {
    config: PlannerConfig,
}

impl CartesianFallbackPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan and execute a straight-line move of `arm`'s end effector to
    /// `target`, falling back once to the arm's preset if the direct plan
    /// covers less than the acceptance fraction.
    ///
    /// # Errors
    ///
    /// Propagates backend and driver errors.  A low fraction is not an
    /// error; it is reported in [`PlanOutcome::fraction`].
    #[instrument(skip_all, fields(group = %backend.group_name(), side = %arm.side()))]
    pub fn plan_and_execute(
        &self,
        backend: &mut dyn PlanningBackend,
        arm: &mut dyn ArmDriver,
        target: Transform3D,
    ) -> Result<PlanOutcome, ReachError> {
        let outcome = self.run(backend, arm, target);
        backend.stop();
        backend.clear_pose_targets();
        outcome
    }

    fn run(
        &self,
        backend: &mut dyn PlanningBackend,
        arm: &mut dyn ArmDriver,
        target: Transform3D,
    ) -> Result<PlanOutcome, ReachError> {
        let request = CartesianPathRequest {
            waypoints: vec![target],
            eef_step_m: self.config.eef_step_m,
            jump_threshold: self.config.jump_threshold,
        };

        let direct = backend.compute_cartesian_path(&request)?;
        if direct.fraction >= self.config.acceptance_fraction {
            info!(fraction = direct.fraction, "direct cartesian plan accepted");
            backend.execute(&direct.trajectory)?;
            return Ok(PlanOutcome {
                fraction: direct.fraction,
                stage: PlanStage::Direct,
            });
        }

        let side = arm.side();
        warn!(
            fraction = direct.fraction,
            acceptance = self.config.acceptance_fraction,
            "direct plan below acceptance, repositioning to {side} fallback preset"
        );
        arm.move_to_joint_positions(self.config.fallback_for(side))?;

        let retry = backend.compute_cartesian_path(&request)?;
        info!(fraction = retry.fraction, "executing fallback plan");
        backend.execute(&retry.trajectory)?;
        Ok(PlanOutcome {
            fraction: retry.fraction,
            stage: PlanStage::Fallback,
        })
    }
}
