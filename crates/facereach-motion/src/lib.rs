//! `facereach-motion` – getting an arm to a cartesian goal.
//!
//! - [`planner`] – [`CartesianFallbackPlanner`]: plan a straight-line path,
//!   and when too little of it is feasible, reposition the arm to a
//!   side-specific preset and try exactly once more.
//! - [`facade`] – [`MotionServiceFacade`]: the request/response surface
//!   (reset, pose queries, go-to-pose per arm) that owns startup order and
//!   per-arm serialisation.

pub mod facade;
pub mod planner;

pub use facade::{ArmHardware, FacadeConfig, JointPreset, MotionHardware, MotionServiceFacade};
pub use planner::{ApproachOffset, CartesianFallbackPlanner, PlanOutcome, PlanStage, PlannerConfig};
