//! [`FaceLockTracker`] – decides when the tracked face is standing still.
//!
//! The detector's boxes jitter from frame to frame even when a person is
//! motionless.  The tracker keeps a bounded window of per-frame positional
//! deltas of the box's top-left corner and reports a *lock* once the window
//! is full and the mean delta on both axes is below a pixel threshold.
//!
//! Because the decision is made on a rolling mean, a single jitter frame does
//! not release the lock on its own; a large jump releases it until the
//! outlier ages out of the window.
//!
//! # Example
//!
//! ```rust
//! use facereach_perception::face_lock::{FaceLockTracker, LockConfig};
//! use facereach_types::DetectionBox;
//!
//! let mut tracker = FaceLockTracker::new(LockConfig::default());
//! let face = DetectionBox::new(300, 200, 60, 90);
//!
//! // First sighting only establishes the reference point.
//! assert!(!tracker.update(Some(face)).locked);
//! for _ in 0..14 {
//!     assert!(!tracker.update(Some(face)).locked);
//! }
//! let status = tracker.update(Some(face));
//! assert!(status.locked);
//! let anchor = status.anchor.unwrap();
//! assert_eq!((anchor.x, anchor.y), (330.0, 230.0));
//! ```

use std::collections::VecDeque;

use facereach_types::{DetectionBox, Pixel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Tunables for [`FaceLockTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Mean per-frame motion (pixels, per axis) below which the face counts
    /// as stationary.
    pub threshold_px: f64,
    /// Number of deltas averaged.  A lock requires a full window.
    pub window_size: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            threshold_px: 2.0,
            window_size: 15,
        }
    }
}

/// Identity of the face currently being tracked.
///
/// There is no re-identification: a new id is minted whenever a face
/// reappears after at least one frame without detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackedFaceId(pub u64);

/// Result of one [`FaceLockTracker::update`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LockStatus {
    pub locked: bool,
    /// Forehead pixel; present only while locked.
    pub anchor: Option<Pixel>,
    /// Face the status refers to; `None` when no face was seen this frame.
    pub face: Option<TrackedFaceId>,
}

impl LockStatus {
    fn lost() -> Self {
        Self {
            locked: false,
            anchor: None,
            face: None,
        }
    }
}

/// Sliding-window stationarity detector for a single face.
#[derive(Debug)]
pub struct FaceLockTracker {
    config: LockConfig,
    /// Top-left corner of the previous box; the motion-delta reference.
    last_anchor: Option<Pixel>,
    deltas: VecDeque<(f64, f64)>,
    tracked: Option<TrackedFaceId>,
    next_id: u64,
    was_locked: bool,
}

impl FaceLockTracker {
    pub fn new(config: LockConfig) -> Self {
        let window = config.window_size.max(1);
        Self {
            config: LockConfig {
                window_size: window,
                ..config
            },
            last_anchor: None,
            deltas: VecDeque::with_capacity(window + 1),
            tracked: None,
            next_id: 1,
            was_locked: false,
        }
    }

    pub fn config(&self) -> LockConfig {
        self.config
    }

    /// Feed every box the detector produced for one frame.
    ///
    /// Only one face is tracked.  The largest box wins; on equal areas the
    /// first box in detector order wins, so the choice is reproducible for
    /// any detector.
    pub fn update_frame(&mut self, boxes: &[DetectionBox]) -> LockStatus {
        self.update(select_face(boxes))
    }

    /// Advance the tracker by one frame.
    ///
    /// `None` means no face this frame: the status is "not locked" and the
    /// delta history is left untouched, so a single dropped detection does
    /// not discard the accumulated window.
    pub fn update(&mut self, detection: Option<DetectionBox>) -> LockStatus {
        let Some(face) = detection else {
            if self.tracked.take().is_some() {
                debug!("face lost");
            }
            self.note_lock_change(false);
            return LockStatus::lost();
        };

        let face_id = match self.tracked {
            Some(id) => id,
            None => {
                let id = TrackedFaceId(self.next_id);
                self.next_id += 1;
                self.tracked = Some(id);
                debug!(face = id.0, "tracking new face");
                id
            }
        };

        let corner = Pixel::new(f64::from(face.x), f64::from(face.y));
        if let Some(last) = self.last_anchor {
            self.deltas
                .push_back(((corner.x - last.x).abs(), (corner.y - last.y).abs()));
            while self.deltas.len() > self.config.window_size {
                self.deltas.pop_front();
            }
        }
        self.last_anchor = Some(corner);

        let locked = self.is_window_full()
            && self
                .mean_delta()
                .is_some_and(|(mx, my)| mx < self.config.threshold_px && my < self.config.threshold_px);
        self.note_lock_change(locked);

        LockStatus {
            locked,
            anchor: locked.then(|| forehead_anchor(&face)),
            face: Some(face_id),
        }
    }

    /// Mean `(dx, dy)` over the window, or `None` while it is empty.
    pub fn mean_delta(&self) -> Option<(f64, f64)> {
        if self.deltas.is_empty() {
            return None;
        }
        let n = self.deltas.len() as f64;
        let (sx, sy) = self
            .deltas
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (dx, dy)| (ax + dx, ay + dy));
        Some((sx / n, sy / n))
    }

    pub fn history_len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_window_full(&self) -> bool {
        self.deltas.len() >= self.config.window_size
    }

    pub fn tracked_face(&self) -> Option<TrackedFaceId> {
        self.tracked
    }

    /// Forget all motion history and the tracked face.
    pub fn reset(&mut self) {
        self.deltas.clear();
        self.last_anchor = None;
        self.tracked = None;
        self.note_lock_change(false);
    }

    fn note_lock_change(&mut self, locked: bool) {
        if locked != self.was_locked {
            match self.mean_delta() {
                Some((mx, my)) => info!(locked, mean_dx = mx, mean_dy = my, "face lock changed"),
                None => info!(locked, "face lock changed"),
            }
            self.was_locked = locked;
        }
    }
}

/// Deterministic face selection: largest area, first on ties.
pub fn select_face(boxes: &[DetectionBox]) -> Option<DetectionBox> {
    boxes.iter().copied().fold(None, |best, candidate| match best {
        Some(b) if b.area() >= candidate.area() => Some(b),
        _ => Some(candidate),
    })
}

/// Forehead estimate inside a face box: horizontally centred, one third of
/// the way down (above the eyes, below the hairline).
pub fn forehead_anchor(face: &DetectionBox) -> Pixel {
    Pixel::new(
        f64::from(face.x) + f64::from(face.width) / 2.0,
        f64::from(face.y) + f64::from(face.height) / 3.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_at(x: i32, y: i32) -> DetectionBox {
        DetectionBox::new(x, y, 60, 90)
    }

    fn tracker() -> FaceLockTracker {
        FaceLockTracker::new(LockConfig::default())
    }

    #[test]
    fn first_frame_is_not_locked_and_records_no_delta() {
        let mut t = tracker();
        let status = t.update(Some(face_at(100, 100)));
        assert!(!status.locked);
        assert!(status.anchor.is_none());
        assert_eq!(t.history_len(), 0);
        assert!(t.mean_delta().is_none());
    }

    #[test]
    fn locks_on_fifteenth_qualifying_frame() {
        let mut t = tracker();
        t.update(Some(face_at(100, 100)));
        // Alternate one-pixel jitter: every delta is below the threshold.
        for i in 1..=14 {
            let status = t.update(Some(face_at(100 + (i % 2), 100)));
            assert!(!status.locked, "locked too early at qualifying frame {i}");
        }
        for _ in 0..30 {
            let status = t.update(Some(face_at(100, 100)));
            assert!(status.locked);
        }
    }

    #[test]
    fn jitter_frame_does_not_instantly_unlock() {
        let mut t = tracker();
        for _ in 0..16 {
            t.update(Some(face_at(100, 100)));
        }
        assert!(t.update(Some(face_at(100, 100))).locked);

        // One 5 px twitch and back: mean delta = 10/15 < 2 px.
        assert!(t.update(Some(face_at(105, 100))).locked);
        assert!(t.update(Some(face_at(100, 100))).locked);
    }

    #[test]
    fn large_jump_unlocks_until_it_ages_out() {
        let mut t = tracker();
        for _ in 0..16 {
            t.update(Some(face_at(100, 100)));
        }
        // A 100 px move dominates the window mean.
        assert!(!t.update(Some(face_at(200, 100))).locked);
        for _ in 0..14 {
            assert!(!t.update(Some(face_at(200, 100))).locked);
        }
        // The outlier has now been evicted.
        assert!(t.update(Some(face_at(200, 100))).locked);
    }

    #[test]
    fn history_never_exceeds_window() {
        let mut t = tracker();
        for i in 0..100 {
            t.update(Some(face_at(i, i)));
            assert!(t.history_len() <= 15);
        }
        assert_eq!(t.history_len(), 15);
    }

    #[test]
    fn missing_face_reports_unlocked_but_keeps_history() {
        let mut t = tracker();
        for _ in 0..20 {
            t.update(Some(face_at(100, 100)));
        }
        let before = t.history_len();
        let status = t.update(None);
        assert!(!status.locked);
        assert!(status.face.is_none());
        assert_eq!(t.history_len(), before);

        // Reappearing at the same place locks again immediately.
        assert!(t.update(Some(face_at(100, 100))).locked);
    }

    #[test]
    fn reappearing_face_gets_new_id() {
        let mut t = tracker();
        let first = t.update(Some(face_at(0, 0))).face.unwrap();
        assert_eq!(t.update(Some(face_at(0, 0))).face, Some(first));
        t.update(None);
        let second = t.update(Some(face_at(0, 0))).face.unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn anchor_is_forehead_of_box() {
        let anchor = forehead_anchor(&DetectionBox::new(10, 20, 31, 90));
        assert!((anchor.x - 25.5).abs() < 1e-12);
        assert!((anchor.y - 50.0).abs() < 1e-12);
    }

    #[test]
    fn select_face_prefers_largest_then_first() {
        let small = DetectionBox::new(0, 0, 10, 10);
        let big_a = DetectionBox::new(50, 50, 40, 40);
        let big_b = DetectionBox::new(90, 90, 40, 40);
        assert_eq!(select_face(&[small, big_a, big_b]), Some(big_a));
        assert_eq!(select_face(&[big_b, small, big_a]), Some(big_b));
        assert_eq!(select_face(&[]), None);
    }

    #[test]
    fn update_frame_with_no_boxes_is_face_lost() {
        let mut t = tracker();
        t.update(Some(face_at(0, 0)));
        let status = t.update_frame(&[]);
        assert!(!status.locked);
        assert!(t.tracked_face().is_none());
    }

    #[test]
    fn zero_window_is_clamped_to_one() {
        let mut t = FaceLockTracker::new(LockConfig {
            threshold_px: 2.0,
            window_size: 0,
        });
        t.update(Some(face_at(0, 0)));
        assert!(t.update(Some(face_at(1, 1))).locked);
        assert_eq!(t.config().window_size, 1);
    }

    #[test]
    fn reset_clears_state() {
        let mut t = tracker();
        for _ in 0..20 {
            t.update(Some(face_at(0, 0)));
        }
        t.reset();
        assert_eq!(t.history_len(), 0);
        assert!(t.tracked_face().is_none());
        assert!(!t.update(Some(face_at(0, 0))).locked);
    }

    #[test]
    fn lock_config_deserializes_with_defaults() {
        let cfg: LockConfig = serde_json::from_str(r#"{"threshold_px": 3.5}"#).unwrap();
        assert_eq!(cfg.window_size, 15);
        assert!((cfg.threshold_px - 3.5).abs() < f64::EPSILON);
    }
}
