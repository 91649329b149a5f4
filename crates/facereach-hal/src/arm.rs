//! Direct-drive arm interface and robot enable switch.
//!
//! These bypass the motion planner entirely: joint targets go straight to the
//! limb's position controllers.  The motion layer uses them for the neutral
//! reset and for the fallback preset move.

use facereach_types::{ArmSide, JointVector, ReachError};

/// One 7-DoF limb driven in joint space.
pub trait ArmDriver: Send {
    fn side(&self) -> ArmSide;

    /// Drive to the hardware's own neutral configuration and block until it
    /// is reached.
    ///
    /// # Errors
    ///
    /// [`ReachError::HardwareFault`] if the limb cannot be commanded.
    fn move_to_neutral(&mut self) -> Result<(), ReachError>;

    /// Drive every joint to `target` (radians, [`JOINT_SUFFIXES`] order) and
    /// block until it is reached.
    ///
    /// [`JOINT_SUFFIXES`]: facereach_types::JOINT_SUFFIXES
    ///
    /// # Errors
    ///
    /// [`ReachError::HardwareFault`] if the limb cannot be commanded.
    fn move_to_joint_positions(&mut self, target: &JointVector) -> Result<(), ReachError>;

    /// Most recently measured joint angles.
    fn joint_angles(&self) -> JointVector;
}

/// Robot-wide motor enable.
pub trait RobotEnabler: Send {
    /// # Errors
    ///
    /// [`ReachError::HardwareFault`] when the robot refuses to enable
    /// (e-stop engaged, comms down, …).
    fn enable(&mut self) -> Result<(), ReachError>;

    fn is_enabled(&self) -> bool;
}
