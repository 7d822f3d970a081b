//! Per-tick observations derived from raw perception output

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::perception::{FaceDetection, FaceLandmarks, HandLandmarks, HAND_LANDMARK_COUNT};

const THUMB_TIP: usize = 4;
const INDEX_TIP: usize = 8;

/// Raw perception results for one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawObservations {
    pub detection: Option<FaceDetection>,
    pub landmarks: Option<FaceLandmarks>,
    pub hand: Option<HandLandmarks>,
}

/// Tracked face for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    /// Box centre in normalized image coordinates
    pub center: Vec2,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<Vec3>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blendshapes: Option<HashMap<String, f32>>,
}

impl FaceObservation {
    /// Build from a detection box, attaching landmarks when the landmarker found the face too
    pub fn new(detection: &FaceDetection, landmarks: Option<&FaceLandmarks>) -> Self {
        Self {
            center: Vec2::new(
                detection.origin_x + detection.width / 2.0,
                detection.origin_y + detection.height / 2.0,
            ),
            width: detection.width,
            height: detection.height,
            confidence: detection.score.clamp(0.0, 1.0),
            landmarks: landmarks.map(|l| l.points.clone()),
            blendshapes: landmarks.and_then(|l| l.blendshapes.clone()),
        }
    }
}

/// Tracked hand for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    /// Mean of all landmark positions (x, y)
    pub centroid: Vec2,
    pub landmarks: Vec<Vec3>,
    /// 2D distance between thumb tip and index fingertip
    pub pinch_distance: f32,
    pub is_left_hand: bool,
    pub confidence: f32,
}

impl HandObservation {
    /// Build from a hand skeleton. Returns None unless all 21 points are present.
    pub fn from_landmarks(hand: &HandLandmarks) -> Option<Self> {
        if hand.points.len() != HAND_LANDMARK_COUNT {
            tracing::debug!(
                "Ignoring hand with {} landmarks (expected {})",
                hand.points.len(),
                HAND_LANDMARK_COUNT
            );
            return None;
        }

        let sum: Vec2 = hand.points.iter().map(|p| p.truncate()).sum();
        let centroid = sum / hand.points.len() as f32;
        let pinch_distance = hand.points[THUMB_TIP]
            .truncate()
            .distance(hand.points[INDEX_TIP].truncate());

        let (is_left_hand, confidence) = match &hand.handedness {
            Some(h) => (h.label == "Left", h.score.clamp(0.0, 1.0)),
            None => (false, 0.0),
        };

        Some(Self {
            centroid,
            landmarks: hand.points.clone(),
            pinch_distance,
            is_left_hand,
            confidence,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::perception::Handedness;

    /// Flat 21-point hand centred at (cx, cy) with the given thumb/index gap
    pub(crate) fn hand_at(cx: f32, cy: f32, pinch: f32) -> HandLandmarks {
        let mut points = vec![Vec3::new(cx, cy, 0.0); HAND_LANDMARK_COUNT];
        points[THUMB_TIP] = Vec3::new(cx - pinch / 2.0, cy, 0.0);
        points[INDEX_TIP] = Vec3::new(cx + pinch / 2.0, cy, 0.0);
        HandLandmarks {
            points,
            handedness: Some(Handedness {
                label: "Right".to_string(),
                score: 0.9,
            }),
        }
    }

    #[test]
    fn test_face_center() {
        let detection = FaceDetection {
            origin_x: 0.2,
            origin_y: 0.1,
            width: 0.4,
            height: 0.6,
            score: 0.95,
        };
        let face = FaceObservation::new(&detection, None);
        assert!((face.center.x - 0.4).abs() < 1e-6);
        assert!((face.center.y - 0.4).abs() < 1e-6);
        assert_eq!(face.confidence, 0.95);
        assert!(face.landmarks.is_none());
    }

    #[test]
    fn test_face_carries_landmarks() {
        let detection = FaceDetection {
            origin_x: 0.0,
            origin_y: 0.0,
            width: 1.0,
            height: 1.0,
            score: 1.5,
        };
        let mut blendshapes = HashMap::new();
        blendshapes.insert("jawOpen".to_string(), 0.4);
        let landmarks = FaceLandmarks {
            points: vec![Vec3::ZERO; 468],
            blendshapes: Some(blendshapes),
        };

        let face = FaceObservation::new(&detection, Some(&landmarks));
        assert_eq!(face.confidence, 1.0);
        assert_eq!(face.landmarks.as_ref().map(Vec::len), Some(468));
        assert_eq!(face.blendshapes.unwrap().get("jawOpen"), Some(&0.4));
    }

    #[test]
    fn test_hand_centroid_and_pinch() {
        let hand = HandObservation::from_landmarks(&hand_at(0.5, 0.25, 0.1)).unwrap();
        assert!((hand.centroid.x - 0.5).abs() < 1e-6);
        assert!((hand.centroid.y - 0.25).abs() < 1e-6);
        assert!((hand.pinch_distance - 0.1).abs() < 1e-6);
        assert!(!hand.is_left_hand);
        assert_eq!(hand.confidence, 0.9);
    }

    #[test]
    fn test_pinch_ignores_depth() {
        let mut raw = hand_at(0.5, 0.5, 0.0);
        raw.points[INDEX_TIP].z = 3.0;
        let hand = HandObservation::from_landmarks(&raw).unwrap();
        assert_eq!(hand.pinch_distance, 0.0);
    }

    #[test]
    fn test_handedness() {
        let mut raw = hand_at(0.5, 0.5, 0.1);
        raw.handedness = Some(Handedness {
            label: "Left".to_string(),
            score: 0.7,
        });
        assert!(HandObservation::from_landmarks(&raw).unwrap().is_left_hand);

        raw.handedness = None;
        let hand = HandObservation::from_landmarks(&raw).unwrap();
        assert!(!hand.is_left_hand);
        assert_eq!(hand.confidence, 0.0);
    }

    #[test]
    fn test_partial_hand_rejected() {
        let mut raw = hand_at(0.5, 0.5, 0.1);
        raw.points.truncate(10);
        assert!(HandObservation::from_landmarks(&raw).is_none());
    }
}
