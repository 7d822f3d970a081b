//! Ordered mood rule table
//!
//! Rules are evaluated top to bottom and the first match wins. The last rule
//! always matches.

use super::features::FaceFeatures;
use super::Mood;
use crate::config::MoodThresholds;

/// One entry of the cascade
pub struct MoodRule {
    pub mood: Mood,
    pub matches: fn(&FaceFeatures, &MoodThresholds) -> bool,
    /// Raw confidence, clamped and floored by the caller
    pub confidence: fn(&FaceFeatures, &MoodThresholds) -> f32,
    pub describe: fn(f32, &MoodThresholds) -> &'static str,
}

/// Rule cascade in priority order
pub static MOOD_RULES: [MoodRule; 6] = [
    MoodRule {
        mood: Mood::Happy,
        matches: happy_matches,
        confidence: happy_confidence,
        describe: happy_describe,
    },
    MoodRule {
        mood: Mood::Surprised,
        matches: surprised_matches,
        confidence: surprised_confidence,
        describe: |_, _| "Surprised!",
    },
    MoodRule {
        mood: Mood::Sad,
        matches: sad_matches,
        confidence: sad_confidence,
        describe: |_, _| "Feeling down",
    },
    MoodRule {
        mood: Mood::Angry,
        matches: angry_matches,
        confidence: angry_confidence,
        describe: |_, _| "Angry",
    },
    MoodRule {
        mood: Mood::Focused,
        matches: focused_matches,
        confidence: |_, t| t.focused_confidence,
        describe: |_, _| "Concentrated",
    },
    MoodRule {
        mood: Mood::Neutral,
        matches: |_, _| true,
        confidence: |_, t| t.neutral_confidence,
        describe: |_, _| "Neutral",
    },
];

fn happy_matches(f: &FaceFeatures, t: &MoodThresholds) -> bool {
    f.smile_intensity > t.happy_min_smile && f.mouth_aspect_ratio < t.happy_max_mouth_ratio
}

fn happy_confidence(f: &FaceFeatures, t: &MoodThresholds) -> f32 {
    f.smile_intensity * t.happy_confidence_scale
}

fn happy_describe(confidence: f32, t: &MoodThresholds) -> &'static str {
    if confidence > t.happy_strong_confidence {
        "Very Happy!"
    } else {
        "Smiling"
    }
}

fn surprised_matches(f: &FaceFeatures, t: &MoodThresholds) -> bool {
    f.eye_openness > t.surprised_min_eye_open
        && f.mouth_aspect_ratio > t.surprised_min_mouth_ratio
        && f.brow_height < t.surprised_max_brow_height
}

fn surprised_confidence(f: &FaceFeatures, t: &MoodThresholds) -> f32 {
    (f.eye_openness + f.mouth_aspect_ratio - f.brow_height.abs()) * t.surprised_confidence_scale
}

fn sad_matches(f: &FaceFeatures, t: &MoodThresholds) -> bool {
    f.smile_intensity < t.sad_max_smile && f.eye_openness < t.sad_max_eye_open
}

fn sad_confidence(f: &FaceFeatures, t: &MoodThresholds) -> f32 {
    f.smile_intensity.abs() * t.sad_confidence_scale
}

fn angry_matches(f: &FaceFeatures, t: &MoodThresholds) -> bool {
    f.brow_height > t.angry_min_brow_height && f.mouth_aspect_ratio < t.angry_max_mouth_ratio
}

fn angry_confidence(f: &FaceFeatures, t: &MoodThresholds) -> f32 {
    f.brow_height * t.angry_confidence_scale
}

fn focused_matches(f: &FaceFeatures, t: &MoodThresholds) -> bool {
    f.eye_openness < t.focused_max_eye_open
        && f.smile_intensity.abs() < t.focused_max_abs_smile
        && f.mouth_aspect_ratio < t.focused_max_mouth_ratio
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(eye: f32, mar: f32, smile: f32, brow: f32) -> FaceFeatures {
        FaceFeatures {
            eye_openness: eye,
            mouth_aspect_ratio: mar,
            smile_intensity: smile,
            brow_height: brow,
        }
    }

    fn rule(mood: Mood) -> &'static MoodRule {
        MOOD_RULES.iter().find(|r| r.mood == mood).unwrap()
    }

    #[test]
    fn test_rule_order() {
        let order: Vec<Mood> = MOOD_RULES.iter().map(|r| r.mood).collect();
        assert_eq!(
            order,
            vec![
                Mood::Happy,
                Mood::Surprised,
                Mood::Sad,
                Mood::Angry,
                Mood::Focused,
                Mood::Neutral
            ]
        );
    }

    #[test]
    fn test_rules_in_isolation() {
        let t = MoodThresholds::default();

        assert!((rule(Mood::Happy).matches)(&features(0.028, 0.3, 0.02, 0.0), &t));
        assert!(!(rule(Mood::Happy).matches)(&features(0.028, 0.7, 0.02, 0.0), &t));

        assert!((rule(Mood::Surprised).matches)(&features(0.035, 0.9, 0.0, -0.03), &t));
        assert!(!(rule(Mood::Surprised).matches)(&features(0.035, 0.9, 0.0, -0.01), &t));

        assert!((rule(Mood::Sad).matches)(&features(0.02, 0.2, -0.008, 0.0), &t));
        assert!((rule(Mood::Angry).matches)(&features(0.028, 0.2, 0.0, 0.008), &t));
        assert!((rule(Mood::Focused).matches)(&features(0.02, 0.3, 0.001, 0.0), &t));
        assert!((rule(Mood::Neutral).matches)(&features(f32::MAX, 0.0, 0.0, 0.0), &t));
    }

    #[test]
    fn test_rule_confidences() {
        let t = MoodThresholds::default();

        let sad = (rule(Mood::Sad).confidence)(&features(0.02, 0.2, -0.008, 0.0), &t);
        assert!((sad - 0.64).abs() < 1e-5);

        let angry = (rule(Mood::Angry).confidence)(&features(0.028, 0.2, 0.0, 0.008), &t);
        assert!((angry - 0.8).abs() < 1e-5);

        assert_eq!((rule(Mood::Happy).describe)(0.9, &t), "Very Happy!");
        assert_eq!((rule(Mood::Happy).describe)(0.5, &t), "Smiling");
    }
}
