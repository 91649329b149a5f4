//! [`ForeheadLocalizer`] – turns a locked forehead pixel into a world goal.
//!
//! Steps per frame:
//!
//! 1. Back-project the pixel through the pinhole [`CameraIntrinsics`] into a
//!    unit ray `(i, j, k)` in the camera's optical frame.
//! 2. Publish the camera→forehead transform into the frame graph.  Its
//!    translation is `depth · (k, −i, −j)`: the optical frame looks down +Z
//!    with +X right and +Y down, the mount frame looks down +X with +Y left
//!    and +Z up.
//! 3. Look up world→forehead through the world→camera-mount extrinsic.  The
//!    extrinsic is static by default; with `mount_max_age_ms` set it must be
//!    refreshed through [`ForeheadLocalizer::update_mount`] and a stale one
//!    fails the lookup.
//! 4. Reject anything at or beyond `max_range_m` from the camera.

use std::time::{Duration, Instant};

use facereach_types::{GoalPose, Pixel, ReachError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transform::{TfEngine, Transform3D, Vec3};

pub const WORLD_FRAME: &str = "world";
pub const CAMERA_MOUNT_FRAME: &str = "camera_mount";
pub const FOREHEAD_FRAME: &str = "forehead";

/// Pinhole camera model from the calibration message.
///
/// Pixels handed to [`CameraIntrinsics::back_project`] are assumed to come
/// from the rectified image, so `distortion` is carried for completeness
/// but not applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub distortion: Vec<f64>,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: Vec::new(),
        }
    }

    /// Focal lengths must be positive and every parameter finite.
    pub fn is_valid(&self) -> bool {
        self.fx > 0.0
            && self.fy > 0.0
            && [self.fx, self.fy, self.cx, self.cy].iter().all(|v| v.is_finite())
    }

    /// Unit ray through `pixel` in the optical frame.
    ///
    /// # Errors
    ///
    /// [`ReachError::Decode`] when the intrinsics are degenerate.
    pub fn back_project(&self, pixel: Pixel) -> Result<Vec3, ReachError> {
        if !self.is_valid() {
            return Err(ReachError::Decode(format!(
                "camera intrinsics unusable (fx={}, fy={})",
                self.fx, self.fy
            )));
        }
        Vec3::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy, 1.0)
            .normalized()
            .ok_or_else(|| ReachError::Decode(format!("pixel {pixel:?} does not back-project")))
    }
}

/// Tunables for [`ForeheadLocalizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    /// Translation of the camera mount in the world frame (metres).
    pub mount_translation: [f64; 3],
    /// Goals at or beyond this distance from the camera are rejected.
    pub max_range_m: f64,
    /// Treat depth `<= 0` (the sensor's invalid-pixel value) and non-finite
    /// depth as "no data".  When `false` such readings are localized as-is.
    pub reject_invalid_depth: bool,
    /// When set, the mount extrinsic is a live transform that expires this
    /// long after its last [`ForeheadLocalizer::update_mount`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_max_age_ms: Option<u64>,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            mount_translation: [0.1, 0.03, 0.87],
            max_range_m: 4.0,
            reject_invalid_depth: true,
            mount_max_age_ms: None,
        }
    }
}

/// Outcome of one localization attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Localization {
    Goal(GoalPose),
    /// The forehead is `distance_m` from the camera, at or past the gate.
    OutOfRange { distance_m: f64 },
    InvalidDepth,
}

/// Back-projects forehead pixels into range-gated world-frame goals.
#[derive(Debug)]
pub struct ForeheadLocalizer {
    config: LocalizerConfig,
    tf: TfEngine,
}

impl ForeheadLocalizer {
    pub fn new(config: LocalizerConfig) -> Self {
        let [x, y, z] = config.mount_translation;
        let tf = match config.mount_max_age_ms {
            Some(ms) => TfEngine::with_max_age(Duration::from_millis(ms)),
            None => TfEngine::new(),
        };
        let mut localizer = Self { config, tf };
        localizer.update_mount(Transform3D::from_translation(Vec3::new(x, y, z)));
        localizer
    }

    /// Replace the world→camera-mount extrinsic, stamped now.
    pub fn update_mount(&mut self, mount: Transform3D) {
        self.update_mount_at(mount, Instant::now());
    }

    /// Replace the world→camera-mount extrinsic with an explicit stamp.
    /// Without `mount_max_age_ms` the extrinsic stays static.
    pub fn update_mount_at(&mut self, mount: Transform3D, at: Instant) {
        if self.config.mount_max_age_ms.is_some() {
            self.tf.set_transform_at(WORLD_FRAME, CAMERA_MOUNT_FRAME, mount, at);
        } else {
            self.tf.set_static_transform(WORLD_FRAME, CAMERA_MOUNT_FRAME, mount);
        }
    }

    pub fn config(&self) -> &LocalizerConfig {
        &self.config
    }

    /// Read-only access to the frame graph (world, camera_mount, forehead).
    pub fn frames(&self) -> &TfEngine {
        &self.tf
    }

    /// Localize, discarding the reason when no goal is produced.
    pub fn localize(
        &mut self,
        anchor: Pixel,
        depth_m: f64,
        intrinsics: &CameraIntrinsics,
    ) -> Option<GoalPose> {
        match self.try_localize(anchor, depth_m, intrinsics) {
            Ok(Localization::Goal(goal)) => Some(goal),
            Ok(other) => {
                debug!(?other, "no goal this frame");
                None
            }
            Err(e) => {
                debug!(error = %e, "localization failed");
                None
            }
        }
    }

    /// Localize `anchor` at `depth_m` metres.
    ///
    /// # Errors
    ///
    /// [`ReachError::Decode`] for unusable intrinsics and
    /// [`ReachError::LookupFailed`] if the frame chain cannot be resolved.
    pub fn try_localize(
        &mut self,
        anchor: Pixel,
        depth_m: f64,
        intrinsics: &CameraIntrinsics,
    ) -> Result<Localization, ReachError> {
        if self.config.reject_invalid_depth && !(depth_m.is_finite() && depth_m > 0.0) {
            return Ok(Localization::InvalidDepth);
        }

        let ray = intrinsics.back_project(anchor)?;
        let offset = camera_to_forehead(ray, depth_m);
        self.tf.set_transform(
            CAMERA_MOUNT_FRAME,
            FOREHEAD_FRAME,
            Transform3D::from_translation(offset),
        );

        let distance_m = offset.norm();
        if distance_m.is_nan() || distance_m >= self.config.max_range_m {
            return Ok(Localization::OutOfRange { distance_m });
        }

        let world = self.tf.lookup(WORLD_FRAME, FOREHEAD_FRAME)?;
        let t = world.translation;
        Ok(Localization::Goal(GoalPose::new(t.x, t.y, t.z)))
    }
}

/// Camera-mount-frame offset of a point `depth_m` along the optical `ray`.
pub fn camera_to_forehead(ray: Vec3, depth_m: f64) -> Vec3 {
    Vec3::new(ray.z, -ray.x, -ray.y).scale(depth_m)
}
