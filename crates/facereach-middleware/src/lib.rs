//! `facereach-middleware` – event routing.
//!
//! Carries perception outputs (face presence, goal poses), advisory control
//! state and motion outcomes between the pipeline stages without caring
//! about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
