use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Which of the robot's two arms a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArmSide {
    Left,
    Right,
}

impl ArmSide {
    /// Both sides, left first.
    pub const ALL: [ArmSide; 2] = [ArmSide::Left, ArmSide::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            ArmSide::Left => "left",
            ArmSide::Right => "right",
        }
    }
}

impl fmt::Display for ArmSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArmSide {
    type Err = ReachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(ArmSide::Left),
            "right" | "r" => Ok(ArmSide::Right),
            other => Err(ReachError::Config(format!("unknown arm side '{other}'"))),
        }
    }
}

/// Joint-angle vector for one 7-DoF arm, ordered shoulder → wrist
/// (see [`JOINT_SUFFIXES`]).
pub type JointVector = [f64; 7];

/// Per-arm joint name suffixes, in [`JointVector`] order.  Full joint names
/// are `"{side}_{suffix}"`, e.g. `"left_e1"`.
pub const JOINT_SUFFIXES: [&str; 7] = ["s0", "s1", "e0", "e1", "w0", "w1", "w2"];

/// An image-plane coordinate in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

impl Pixel {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned face bounding box reported by the 2-D detector, in pixels.
/// `(x, y)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl DetectionBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box area in square pixels.  Degenerate (negative) extents count as 0.
    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }
}

/// End-effector pose as exchanged over the motion service: position in
/// metres, orientation as roll/pitch/yaw in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// `GoToPose` service request for one arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GoToPose {
    /// Reference frame the target is expressed in (e.g. `"base"`).
    pub frame: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub roll: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
}

impl GoToPose {
    /// Position-only request in `frame` with a neutral orientation.
    pub fn position(frame: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            frame: frame.into(),
            x,
            y,
            z,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
        }
    }
}

/// World-frame target position derived from a locked forehead.  Orientation
/// is deliberately unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GoalPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GoalPose {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "facereach-runtime::face_pipeline"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Whether a face was present in the latest color frame.
    FaceDetected(bool),
    /// A localized, range-gated forehead position in the world frame.
    GoalPose(GoalPose),
    /// Free-text control-loop state.  Advisory only.
    ControlState(String),
    /// Outcome of one `go_to_pose` request.
    MotionResult {
        side: ArmSide,
        success: bool,
        fraction: f64,
    },
    Fault {
        component: String,
        message: String,
    },
}

/// Global error type spanning sensor decoding, frame lookups, planning and
/// hardware failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReachError {
    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Face detector failed: {0}")]
    Detector(String),

    #[error("Transform lookup {source_frame} -> {target_frame} failed: {reason}")]
    LookupFailed {
        source_frame: String,
        target_frame: String,
        reason: String,
    },

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Event bus error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_side_parses_case_insensitively() {
        assert_eq!("Left".parse::<ArmSide>().unwrap(), ArmSide::Left);
        assert_eq!(" r ".parse::<ArmSide>().unwrap(), ArmSide::Right);
        assert!(matches!(
            "middle".parse::<ArmSide>(),
            Err(ReachError::Config(_))
        ));
    }

    #[test]
    fn arm_side_serializes_lowercase() {
        let json = serde_json::to_string(&ArmSide::Right).unwrap();
        assert_eq!(json, "\"right\"");
    }

    #[test]
    fn detection_box_area_ignores_negative_extents() {
        assert_eq!(DetectionBox::new(0, 0, 10, 20).area(), 200);
        assert_eq!(DetectionBox::new(0, 0, -10, 20).area(), 0);
    }

    #[test]
    fn go_to_pose_orientation_defaults_to_zero() {
        let req: GoToPose =
            serde_json::from_str(r#"{"frame":"base","x":0.5,"y":0.1,"z":0.2}"#).unwrap();
        assert_eq!(req, GoToPose::position("base", 0.5, 0.1, 0.2));
    }

    #[test]
    fn motion_result_event_roundtrip() {
        let event = Event::new(
            "facereach-runtime::reach_loop",
            EventPayload::MotionResult {
                side: ArmSide::Left,
                success: true,
                fraction: 0.95,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        match back.payload {
            EventPayload::MotionResult {
                side,
                success,
                fraction,
            } => {
                assert_eq!(side, ArmSide::Left);
                assert!(success);
                assert!((fraction - 0.95).abs() < f64::EPSILON);
            }
            _ => panic!("unexpected variant"),
        }
    }

    #[test]
    fn reach_error_display() {
        let err = ReachError::LookupFailed {
            source_frame: "world".to_string(),
            target_frame: "forehead".to_string(),
            reason: "no path".to_string(),
        };
        assert!(err.to_string().contains("world -> forehead"));

        let err2 = ReachError::HardwareFault {
            component: "robot_enable".to_string(),
            details: "e-stop engaged".to_string(),
        };
        assert!(err2.to_string().contains("robot_enable"));
    }
}
