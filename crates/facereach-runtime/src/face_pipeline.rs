//! [`FacePipeline`] – color, depth and calibration handlers for one RGB-D
//! camera.
//!
//! Each stream has its own handler taking the frame by value.  State that
//! crosses streams (forehead pixel, forehead depth, intrinsics) goes through
//! a [`SharedFrameCache`] rather than living in the handlers.
//!
//! ```text
//! color ──▶ detect ──▶ FaceLockTracker ──locked──▶ cache.anchor
//!                 │                          └──▶ localize(cache.depth, cache.intrinsics) ──▶ GoalPoses
//!                 └──▶ FaceDetected
//! depth ──▶ sample at cache.anchor ──▶ cache.depth
//! camera info ──▶ cache.intrinsics
//! mount extrinsic ──▶ localizer frame graph
//! ```
//!
//! Malformed frames and detector failures are logged and skipped without
//! touching any state.

use std::time::Duration;

use facereach_hal::{ColorFrame, DepthFrame, FaceDetector};
use facereach_middleware::{EventBus, Topic};
use facereach_perception::{
    CameraIntrinsics, FaceLockTracker, ForeheadLocalizer, Localization, LocalizerConfig, LockConfig, LockStatus,
    SharedFrameCache, Transform3D,
};
use facereach_types::{Event, EventPayload, GoalPose};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const SOURCE: &str = "facereach-runtime::face_pipeline";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub lock: LockConfig,
    pub localizer: LocalizerConfig,
    /// When set, a depth sample older than this at color-frame time yields
    /// no goal.  Unset means the most recent depth is always used.
    pub max_depth_skew_ms: Option<u64>,
}

pub struct FacePipeline<D: FaceDetector> {
    detector: D,
    tracker: FaceLockTracker,
    localizer: ForeheadLocalizer,
    cache: SharedFrameCache,
    bus: EventBus,
    max_depth_skew: Option<Duration>,
    last_status: LockStatus,
}

impl<D: FaceDetector> FacePipeline<D> {
    pub fn new(detector: D, config: PipelineConfig, bus: EventBus) -> Self {
        Self {
            detector,
            tracker: FaceLockTracker::new(config.lock),
            localizer: ForeheadLocalizer::new(config.localizer),
            cache: SharedFrameCache::new(),
            bus,
            max_depth_skew: config.max_depth_skew_ms.map(Duration::from_millis),
            last_status: LockStatus::default(),
        }
    }

    pub fn cache(&self) -> &SharedFrameCache {
        &self.cache
    }

    /// Lock status after the most recent valid color frame.
    pub fn lock_status(&self) -> &LockStatus {
        &self.last_status
    }

    pub fn tracker(&self) -> &FaceLockTracker {
        &self.tracker
    }

    /// Handle one color frame.  Returns the goal published for it, if any.
    pub fn on_color_frame(&mut self, frame: ColorFrame) -> Option<GoalPose> {
        if let Err(e) = frame.validate() {
            warn!(error = %e, "color frame skipped");
            return None;
        }
        let boxes = match self.detector.detect(&frame) {
            Ok(boxes) => boxes,
            Err(e) => {
                warn!(error = %e, "color frame skipped");
                return None;
            }
        };

        self.bus.publish_lossy(
            Topic::FaceDetected,
            Event::new(SOURCE, EventPayload::FaceDetected(!boxes.is_empty())),
        );

        let status = self.tracker.update_frame(&boxes);
        self.last_status = status;
        let anchor = status.anchor?;
        self.cache.set_anchor(anchor);

        let goal = self.localize_latest()?;
        info!(x = goal.x, y = goal.y, z = goal.z, "forehead goal");
        self.bus
            .publish_lossy(Topic::GoalPoses, Event::new(SOURCE, EventPayload::GoalPose(goal)));
        Some(goal)
    }

    fn localize_latest(&mut self) -> Option<GoalPose> {
        let snapshot = self.cache.snapshot();
        let (Some(anchor), Some(depth), Some(intrinsics)) =
            (snapshot.anchor, snapshot.depth_m, snapshot.intrinsics)
        else {
            debug!("localization waiting for depth or calibration");
            return None;
        };

        if let Some(skew) = self.max_depth_skew
            && depth.age() > skew
        {
            debug!(age_ms = depth.age().as_millis() as u64, "depth sample too old");
            return None;
        }

        match self
            .localizer
            .try_localize(anchor.value, depth.value, &intrinsics.value)
        {
            Ok(Localization::Goal(goal)) => Some(goal),
            Ok(Localization::OutOfRange { distance_m }) => {
                debug!(distance_m, "forehead beyond range gate");
                None
            }
            Ok(Localization::InvalidDepth) => {
                debug!(depth_m = depth.value, "no valid depth at forehead");
                None
            }
            Err(e) => {
                warn!(error = %e, "goal skipped");
                None
            }
        }
    }

    /// Handle one depth frame: sample it under the latest forehead pixel.
    /// Returns the stored depth in metres.
    pub fn on_depth_frame(&mut self, frame: DepthFrame) -> Option<f64> {
        if let Err(e) = frame.validate() {
            warn!(error = %e, "depth frame skipped");
            return None;
        }
        let anchor = self.cache.anchor()?;
        let Some(depth_m) = frame.depth_m_at(anchor.value) else {
            debug!(x = anchor.value.x, y = anchor.value.y, "forehead outside depth image");
            return None;
        };
        self.cache.set_depth(depth_m);
        Some(depth_m)
    }

    pub fn on_camera_info(&mut self, intrinsics: CameraIntrinsics) {
        if !intrinsics.is_valid() {
            warn!(fx = intrinsics.fx, fy = intrinsics.fy, "camera info skipped");
            return;
        }
        if !self.cache.has_intrinsics() {
            info!(fx = intrinsics.fx, fy = intrinsics.fy, cx = intrinsics.cx, cy = intrinsics.cy, "calibration received");
        }
        self.cache.set_intrinsics(intrinsics);
    }

    /// New world→camera-mount extrinsic, e.g. from a moving head.  Required
    /// periodically when the localizer's `mount_max_age_ms` is set.
    pub fn on_mount_transform(&mut self, mount: Transform3D) {
        debug!(x = mount.translation.x, y = mount.translation.y, z = mount.translation.z, "mount extrinsic");
        self.localizer.update_mount(mount);
    }

    /// Advisory: logged and republished, never gates the pipeline.
    pub fn on_control_state(&mut self, state: impl Into<String>) {
        let state = state.into();
        info!(%state, "control state");
        self.bus
            .publish_lossy(Topic::ControlState, Event::new(SOURCE, EventPayload::ControlState(state)));
    }
}
