//! Geometric face features derived from the canonical face mesh

use glam::Vec3;

use crate::error::UnsupportedInputError;
use crate::perception::FACE_LANDMARK_COUNT;

// Face mesh indices
const LEFT_EYE_TOP: usize = 159;
const LEFT_EYE_BOTTOM: usize = 145;
const RIGHT_EYE_TOP: usize = 386;
const RIGHT_EYE_BOTTOM: usize = 374;
const MOUTH_LEFT: usize = 61;
const MOUTH_RIGHT: usize = 291;
const MOUTH_TOP: usize = 13;
const MOUTH_BOTTOM: usize = 14;
const LEFT_BROW_INNER: usize = 70;
const RIGHT_BROW_INNER: usize = 300;

/// Features the mood rules look at, in normalized image units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceFeatures {
    /// Mean vertical eyelid separation of both eyes
    pub eye_openness: f32,
    /// Mouth vertical opening divided by mouth width
    pub mouth_aspect_ratio: f32,
    /// Mean lift of the mouth corners above the mouth centre (positive = raised)
    pub smile_intensity: f32,
    /// Mean inner-brow offset from the eye top (more negative = raised higher)
    pub brow_height: f32,
}

impl FaceFeatures {
    /// Extract features from a full face mesh
    pub fn extract(points: &[Vec3]) -> Result<Self, UnsupportedInputError> {
        if points.len() != FACE_LANDMARK_COUNT {
            return Err(UnsupportedInputError {
                expected: FACE_LANDMARK_COUNT,
                actual: points.len(),
            });
        }

        let left_eye = (points[LEFT_EYE_TOP].y - points[LEFT_EYE_BOTTOM].y).abs();
        let right_eye = (points[RIGHT_EYE_TOP].y - points[RIGHT_EYE_BOTTOM].y).abs();

        let mouth_open = (points[MOUTH_TOP].y - points[MOUTH_BOTTOM].y).abs();
        let mouth_width = (points[MOUTH_LEFT].x - points[MOUTH_RIGHT].x).abs();

        // Image y grows downwards, so a lifted corner has a smaller y
        let mouth_center_y = (points[MOUTH_TOP].y + points[MOUTH_BOTTOM].y) / 2.0;
        let left_lift = mouth_center_y - points[MOUTH_LEFT].y;
        let right_lift = mouth_center_y - points[MOUTH_RIGHT].y;

        let left_brow = points[LEFT_BROW_INNER].y - points[LEFT_EYE_TOP].y;
        let right_brow = points[RIGHT_BROW_INNER].y - points[RIGHT_EYE_TOP].y;

        Ok(Self {
            eye_openness: (left_eye + right_eye) / 2.0,
            mouth_aspect_ratio: mouth_open / mouth_width,
            smile_intensity: (left_lift + right_lift) / 2.0,
            brow_height: (left_brow + right_brow) / 2.0,
        })
    }

    /// False for collapsed meshes (e.g. zero mouth width)
    pub fn is_finite(&self) -> bool {
        self.eye_openness.is_finite()
            && self.mouth_aspect_ratio.is_finite()
            && self.smile_intensity.is_finite()
            && self.brow_height.is_finite()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Synthetic face mesh with the rule-relevant points placed explicitly
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct FaceShape {
        pub eye_open: f32,
        pub mouth_open: f32,
        pub mouth_width: f32,
        pub smile: f32,
        pub brow: f32,
    }

    impl Default for FaceShape {
        fn default() -> Self {
            Self {
                eye_open: 0.028,
                mouth_open: 0.03,
                mouth_width: 0.1,
                smile: 0.0,
                brow: -0.01,
            }
        }
    }

    impl FaceShape {
        pub fn mesh(&self) -> Vec<Vec3> {
            const EYE_TOP_Y: f32 = 0.40;
            const MOUTH_Y: f32 = 0.70;

            let mut points = vec![Vec3::new(0.5, 0.5, 0.0); FACE_LANDMARK_COUNT];

            for (top, bottom) in [(LEFT_EYE_TOP, LEFT_EYE_BOTTOM), (RIGHT_EYE_TOP, RIGHT_EYE_BOTTOM)] {
                points[top].y = EYE_TOP_Y;
                points[bottom].y = EYE_TOP_Y + self.eye_open;
            }

            points[MOUTH_TOP].y = MOUTH_Y - self.mouth_open / 2.0;
            points[MOUTH_BOTTOM].y = MOUTH_Y + self.mouth_open / 2.0;
            points[MOUTH_LEFT] = Vec3::new(0.5 - self.mouth_width / 2.0, MOUTH_Y - self.smile, 0.0);
            points[MOUTH_RIGHT] = Vec3::new(0.5 + self.mouth_width / 2.0, MOUTH_Y - self.smile, 0.0);

            points[LEFT_BROW_INNER].y = EYE_TOP_Y + self.brow;
            points[RIGHT_BROW_INNER].y = EYE_TOP_Y + self.brow;

            points
        }
    }

    #[test]
    fn test_extract_features() {
        let shape = FaceShape {
            eye_open: 0.03,
            mouth_open: 0.05,
            mouth_width: 0.1,
            smile: 0.012,
            brow: -0.02,
        };
        let f = FaceFeatures::extract(&shape.mesh()).unwrap();

        assert!((f.eye_openness - 0.03).abs() < 1e-5);
        assert!((f.mouth_aspect_ratio - 0.5).abs() < 1e-4);
        assert!((f.smile_intensity - 0.012).abs() < 1e-5);
        assert!((f.brow_height + 0.02).abs() < 1e-5);
        assert!(f.is_finite());
    }

    #[test]
    fn test_extract_rejects_wrong_count() {
        let err = FaceFeatures::extract(&[Vec3::ZERO; 21]).unwrap_err();
        assert_eq!(err.expected, 468);
        assert_eq!(err.actual, 21);
    }

    #[test]
    fn test_zero_mouth_width_not_finite() {
        let shape = FaceShape {
            mouth_width: 0.0,
            ..Default::default()
        };
        let f = FaceFeatures::extract(&shape.mesh()).unwrap();
        assert!(!f.is_finite());
    }
}
