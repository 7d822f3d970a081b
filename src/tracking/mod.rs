//! Tracking module
//!
//! - Per-tick scheduling against the perception capability
//! - Observation building and FPS accounting
//! - The MediaPipe tracker helper (subprocess + JSON over UDP)

pub mod fps;
pub mod mediapipe;
pub mod observation;
pub mod scheduler;
pub mod subprocess;

pub use observation::{FaceObservation, HandObservation, RawObservations};
pub use scheduler::{LivenessToken, TickOutcome, TrackingScheduler};
