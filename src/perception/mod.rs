//! Perception capability
//!
//! Face/hand inference is an external collaborator. This module defines the
//! per-tick contract the scheduler consumes and the shared handle that owns
//! one backend instance across sessions.

pub mod handle;

use async_trait::async_trait;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::camera::Frame;
use crate::error::PerceptionError;

pub use handle::{PerceptionHandle, PerceptionLease};

/// Number of points in a canonical face mesh
pub const FACE_LANDMARK_COUNT: usize = 468;
/// Number of points in a hand skeleton
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Strictly increasing video timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

/// Face bounding box with detection score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub origin_x: f32,
    pub origin_y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

/// Dense face landmarks, optionally with expression coefficients
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blendshapes: Option<HashMap<String, f32>>,
}

/// Left/right classification of a detected hand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handedness {
    /// "Left" or "Right"
    pub label: String,
    pub score: f32,
}

/// Hand skeleton landmarks
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub points: Vec<Vec3>,
    #[serde(default)]
    pub handedness: Option<Handedness>,
}

/// One inference backend (face detector, face landmarker, hand landmarker).
///
/// Must accept repeated video-rate calls with increasing timestamps. Each
/// method returns zero or one result for the single tracked subject.
#[async_trait]
pub trait PerceptionBackend: Send {
    /// Backend identifier
    fn name(&self) -> &'static str;

    /// One-time model loading
    async fn init(&mut self) -> Result<(), PerceptionError> {
        Ok(())
    }

    async fn detect_faces(
        &mut self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Option<FaceDetection>, PerceptionError>;

    async fn detect_face_landmarks(
        &mut self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Option<FaceLandmarks>, PerceptionError>;

    async fn detect_hands(
        &mut self,
        frame: &Frame,
        timestamp: Timestamp,
    ) -> Result<Option<HandLandmarks>, PerceptionError>;

    /// Release model resources
    async fn close(&mut self) {}
}
