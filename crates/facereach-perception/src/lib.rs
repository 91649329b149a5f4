//! `facereach-perception` – from noisy face boxes to a world-frame goal.
//!
//! # Modules
//!
//! - [`transform`] – rigid-body math ([`Transform3D`][transform::Transform3D]
//!   compose / inverse) and [`TfEngine`][transform::TfEngine], a graph of
//!   named reference frames with result-typed lookups.
//! - [`face_lock`] – [`FaceLockTracker`][face_lock::FaceLockTracker]: sliding
//!   window over detector motion that decides when a face is stationary and
//!   where its forehead is in the image.
//! - [`localizer`] – [`ForeheadLocalizer`][localizer::ForeheadLocalizer]:
//!   back-projects the forehead pixel with depth and camera intrinsics into a
//!   range-gated world-frame [`GoalPose`][facereach_types::GoalPose].
//! - [`frame_cache`] – [`SharedFrameCache`][frame_cache::SharedFrameCache]:
//!   versioned, timestamped latest-value cache shared by the frame handlers.

pub mod face_lock;
pub mod frame_cache;
pub mod localizer;
pub mod transform;

pub use face_lock::{FaceLockTracker, LockConfig, LockStatus, TrackedFaceId};
pub use frame_cache::{CacheSnapshot, SharedFrameCache, Stamped};
pub use localizer::{CameraIntrinsics, ForeheadLocalizer, Localization, LocalizerConfig};
pub use transform::{Quaternion, TfEngine, Transform3D, Vec3};
