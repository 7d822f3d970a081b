//! Rule-based mood classification from face landmarks

pub mod features;
pub mod rules;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::MoodThresholds;
pub use features::FaceFeatures;
pub use rules::{MoodRule, MOOD_RULES};

/// Mood label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Sad,
    Surprised,
    Angry,
    Focused,
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mood::Neutral => "neutral",
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Surprised => "surprised",
            Mood::Angry => "angry",
            Mood::Focused => "focused",
        };
        write!(f, "{}", s)
    }
}

/// Classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodState {
    pub mood: Mood,
    /// 0.0 to 1.0
    pub confidence: f32,
    pub description: String,
}

impl MoodState {
    /// Placeholder shown before a usable face has been seen
    pub fn analyzing() -> Self {
        Self {
            mood: Mood::Neutral,
            confidence: 0.0,
            description: "Analyzing...".to_string(),
        }
    }
}

impl Default for MoodState {
    fn default() -> Self {
        Self::analyzing()
    }
}

/// Stateless classifier over one landmark set
#[derive(Debug, Clone, Default)]
pub struct MoodClassifier {
    thresholds: MoodThresholds,
}

impl MoodClassifier {
    pub fn new(thresholds: MoodThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &MoodThresholds {
        &self.thresholds
    }

    /// Classify a face mesh. Unusable input yields the analyzing placeholder.
    pub fn classify(&self, points: &[Vec3]) -> MoodState {
        match FaceFeatures::extract(points) {
            Ok(features) if features.is_finite() => self.classify_features(&features),
            Ok(features) => {
                tracing::debug!("Degenerate face geometry: {:?}", features);
                MoodState::analyzing()
            }
            Err(e) => {
                tracing::debug!("Skipping mood classification: {}", e);
                MoodState::analyzing()
            }
        }
    }

    /// Run the rule cascade over extracted features
    pub fn classify_features(&self, features: &FaceFeatures) -> MoodState {
        let t = &self.thresholds;
        // The last rule always matches
        let rule = MOOD_RULES
            .iter()
            .find(|rule| (rule.matches)(features, t))
            .unwrap_or(&MOOD_RULES[MOOD_RULES.len() - 1]);

        let confidence = (rule.confidence)(features, t)
            .clamp(0.0, 1.0)
            .max(t.confidence_floor);

        MoodState {
            mood: rule.mood,
            confidence,
            description: (rule.describe)(confidence, t).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::features::tests::FaceShape;
    use super::*;

    fn classify(shape: FaceShape) -> MoodState {
        MoodClassifier::default().classify(&shape.mesh())
    }

    #[test]
    fn test_wrong_landmark_count_falls_back() {
        let classifier = MoodClassifier::default();
        for len in [0, 21, 467, 469, 478] {
            let state = classifier.classify(&vec![Vec3::splat(0.5); len]);
            assert_eq!(state, MoodState::analyzing());
        }
    }

    #[test]
    fn test_degenerate_mesh_falls_back() {
        let state = classify(FaceShape {
            mouth_width: 0.0,
            ..Default::default()
        });
        assert_eq!(state, MoodState::analyzing());
    }

    #[test]
    fn test_happy() {
        let state = classify(FaceShape {
            eye_open: 0.025,
            mouth_open: 0.02,
            mouth_width: 0.1,
            smile: 0.012,
            brow: -0.01,
        });
        assert_eq!(state.mood, Mood::Happy);
        assert_eq!(state.confidence, 1.0);
        assert_eq!(state.description, "Very Happy!");
    }

    #[test]
    fn test_surprised() {
        let state = classify(FaceShape {
            eye_open: 0.035,
            mouth_open: 0.09,
            mouth_width: 0.1,
            smile: 0.0,
            brow: -0.03,
        });
        assert_eq!(state.mood, Mood::Surprised);
        assert!((state.confidence - 0.4525).abs() < 1e-3);
        assert_eq!(state.description, "Surprised!");
    }

    #[test]
    fn test_sad() {
        let state = classify(FaceShape {
            eye_open: 0.02,
            mouth_open: 0.02,
            mouth_width: 0.1,
            smile: -0.008,
            brow: -0.01,
        });
        assert_eq!(state.mood, Mood::Sad);
        assert!((state.confidence - 0.64).abs() < 1e-3);
        assert_eq!(state.description, "Feeling down");
    }

    #[test]
    fn test_angry() {
        let state = classify(FaceShape {
            eye_open: 0.028,
            mouth_open: 0.02,
            mouth_width: 0.1,
            smile: 0.0,
            brow: 0.008,
        });
        assert_eq!(state.mood, Mood::Angry);
        assert!((state.confidence - 0.8).abs() < 1e-3);
    }

    #[test]
    fn test_focused() {
        let state = classify(FaceShape {
            eye_open: 0.02,
            mouth_open: 0.03,
            mouth_width: 0.1,
            smile: 0.001,
            brow: -0.01,
        });
        assert_eq!(state.mood, Mood::Focused);
        assert_eq!(state.confidence, 0.8);
        assert_eq!(state.description, "Concentrated");
    }

    #[test]
    fn test_neutral() {
        let state = classify(FaceShape::default());
        assert_eq!(state.mood, Mood::Neutral);
        assert_eq!(state.confidence, 0.7);
        assert_eq!(state.description, "Neutral");
    }

    #[test]
    fn test_low_confidence_is_floored() {
        let state = classify(FaceShape {
            eye_open: 0.031,
            mouth_open: 0.081,
            mouth_width: 0.1,
            smile: 0.0,
            brow: -0.5,
        });
        assert_eq!(state.mood, Mood::Surprised);
        assert_eq!(state.confidence, 0.3);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let thresholds = MoodThresholds {
            happy_max_mouth_ratio: 1.0,
            ..Default::default()
        };
        let classifier = MoodClassifier::new(thresholds.clone());
        let features = FaceFeatures {
            eye_openness: 0.035,
            mouth_aspect_ratio: 0.9,
            smile_intensity: 0.02,
            brow_height: -0.03,
        };

        let surprised = MOOD_RULES.iter().find(|r| r.mood == Mood::Surprised).unwrap();
        assert!((surprised.matches)(&features, &thresholds));
        assert_eq!(classifier.classify_features(&features).mood, Mood::Happy);
    }

    #[test]
    fn test_confidence_bounds() {
        let classifier = MoodClassifier::default();
        for eye in [0.0, 0.01, 0.021, 0.024, 0.03, 0.05, 0.2] {
            for mar in [0.0, 0.3, 0.45, 0.7, 0.85, 3.0] {
                for smile in [-0.1, -0.006, 0.0, 0.003, 0.011, 0.5] {
                    for brow in [-1.0, -0.03, 0.0, 0.006, 0.5] {
                        let state = classifier.classify_features(&FaceFeatures {
                            eye_openness: eye,
                            mouth_aspect_ratio: mar,
                            smile_intensity: smile,
                            brow_height: brow,
                        });
                        assert!(
                            (0.3..=1.0).contains(&state.confidence),
                            "{:?} -> {}",
                            state.mood,
                            state.confidence
                        );
                    }
                }
            }
        }
    }
}
