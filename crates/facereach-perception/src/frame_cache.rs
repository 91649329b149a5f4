//! Latest-value cache shared between the color, depth and calibration
//! handlers.
//!
//! Each slot is written by exactly one handler and carries its own version
//! counter and receive time, so readers can tell how fresh every input is
//! without any handler reaching into another's state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use facereach_types::Pixel;

use crate::localizer::CameraIntrinsics;

/// A cached value with its write counter and arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub value: T,
    /// Starts at 1 and increments on every write to the slot.
    pub version: u64,
    pub received_at: Instant,
}

impl<T> Stamped<T> {
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

fn write_slot<T>(slot: &mut Option<Stamped<T>>, value: T, at: Instant) -> u64 {
    let version = slot.as_ref().map_or(1, |s| s.version + 1);
    *slot = Some(Stamped {
        value,
        version,
        received_at: at,
    });
    version
}

#[derive(Debug, Default)]
struct FrameCache {
    anchor: Option<Stamped<Pixel>>,
    depth_m: Option<Stamped<f64>>,
    intrinsics: Option<Stamped<CameraIntrinsics>>,
}

/// Consistent copy of every slot, taken under one lock.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub anchor: Option<Stamped<Pixel>>,
    pub depth_m: Option<Stamped<f64>>,
    pub intrinsics: Option<Stamped<CameraIntrinsics>>,
}

/// Cloneable handle to the shared cache.
#[derive(Debug, Clone, Default)]
pub struct SharedFrameCache {
    inner: Arc<Mutex<FrameCache>>,
}

impl SharedFrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking writer cannot leave a slot half-written, so poisoning is
    // ignored.
    fn lock(&self) -> MutexGuard<'_, FrameCache> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the latest locked forehead pixel; returns the slot version.
    pub fn set_anchor(&self, anchor: Pixel) -> u64 {
        write_slot(&mut self.lock().anchor, anchor, Instant::now())
    }

    /// Store the latest forehead depth in metres; returns the slot version.
    pub fn set_depth(&self, depth_m: f64) -> u64 {
        self.set_depth_at(depth_m, Instant::now())
    }

    pub fn set_depth_at(&self, depth_m: f64, at: Instant) -> u64 {
        write_slot(&mut self.lock().depth_m, depth_m, at)
    }

    pub fn set_intrinsics(&self, intrinsics: CameraIntrinsics) -> u64 {
        write_slot(&mut self.lock().intrinsics, intrinsics, Instant::now())
    }

    pub fn anchor(&self) -> Option<Stamped<Pixel>> {
        self.lock().anchor.clone()
    }

    pub fn depth_m(&self) -> Option<Stamped<f64>> {
        self.lock().depth_m.clone()
    }

    pub fn intrinsics(&self) -> Option<Stamped<CameraIntrinsics>> {
        self.lock().intrinsics.clone()
    }

    pub fn has_intrinsics(&self) -> bool {
        self.lock().intrinsics.is_some()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let cache = self.lock();
        CacheSnapshot {
            anchor: cache.anchor.clone(),
            depth_m: cache.depth_m.clone(),
            intrinsics: cache.intrinsics.clone(),
        }
    }
}
