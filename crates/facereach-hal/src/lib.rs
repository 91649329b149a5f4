//! `facereach-hal` – the robot and its collaborators, seen as traits.
//!
//! Everything the control loop does not implement itself is reached through
//! a trait here, so real drivers and the in-process simulation are
//! interchangeable.
//!
//! # Modules
//!
//! - [`arm`] – [`ArmDriver`][arm::ArmDriver] (direct joint-space drive of one
//!   limb) and [`RobotEnabler`][arm::RobotEnabler].
//! - [`camera`] – [`ColorFrame`][camera::ColorFrame] /
//!   [`DepthFrame`][camera::DepthFrame] with decode validation, and the
//!   black-box [`FaceDetector`][camera::FaceDetector].
//! - [`planning`] – [`PlanningBackend`][planning::PlanningBackend] (cartesian
//!   path service for one move group) and
//!   [`PlanningScene`][planning::PlanningScene].
//! - [`sim`] – recording stand-ins for all of the above.

pub mod arm;
pub mod camera;
pub mod planning;
pub mod sim;

pub use arm::{ArmDriver, RobotEnabler};
pub use camera::{ColorFrame, DepthFrame, FaceDetector};
pub use planning::{CartesianPathRequest, CollisionObject, PlanResult, PlanningBackend, PlanningScene, Trajectory};
