//! `facereach-runtime` – wiring perception to motion.
//!
//! # Modules
//!
//! - [`face_pipeline`] – [`FacePipeline`][face_pipeline::FacePipeline]:
//!   per-stream frame handlers (color, depth, calibration, control state)
//!   that run the face lock and forehead localizer and publish results on
//!   the [`EventBus`][facereach_middleware::EventBus].
//! - [`reach_loop`] – [`ReachLoop`][reach_loop::ReachLoop]: consumes goal
//!   poses from the bus and drives one arm toward them through the
//!   [`MotionServiceFacade`][facereach_motion::MotionServiceFacade], one
//!   reach at a time.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP span export.

pub mod face_pipeline;
pub mod reach_loop;
pub mod telemetry;

pub use face_pipeline::{FacePipeline, PipelineConfig};
pub use reach_loop::{ReachConfig, ReachLoop, ReachStats};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
