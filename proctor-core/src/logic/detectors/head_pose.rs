//! Head Pose Detector
//!
//! Frame -> primary face -> yaw/pitch/roll -> discrete gaze direction.
//! Pure with respect to the frame; thresholds come from `HeadPoseBands`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::constants::MAX_ANGLE_DEG;
use crate::logic::config::{AlertPolicy, HeadPoseBands};
use crate::logic::error::ProctorResult;
use crate::logic::model::{FaceLocator, FaceRegion, InferenceError, PoseAngles, PoseEstimator};
use crate::logic::signal::ImageFrame;
use super::verdict::{SignalKind, Verdict};

pub const NO_FACE_LABEL: &str = "No face detected";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GazeDirection {
    Center,
    Left,
    Right,
    Up,
    Down,
}

impl GazeDirection {
    pub fn label(&self) -> &'static str {
        match self {
            GazeDirection::Center => "Looking Center",
            GazeDirection::Left => "Looking Left",
            GazeDirection::Right => "Looking Right",
            GazeDirection::Up => "Looking Up",
            GazeDirection::Down => "Looking Down",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeadPoseVerdict {
    NoFace,
    Pose {
        direction: GazeDirection,
        angles: PoseAngles,
        faces_found: usize,
    },
}

impl HeadPoseVerdict {
    pub fn direction(&self) -> Option<GazeDirection> {
        match self {
            HeadPoseVerdict::NoFace => None,
            HeadPoseVerdict::Pose { direction, .. } => Some(*direction),
        }
    }

    pub fn angles(&self) -> Option<PoseAngles> {
        match self {
            HeadPoseVerdict::NoFace => None,
            HeadPoseVerdict::Pose { angles, .. } => Some(*angles),
        }
    }
}

impl Verdict for HeadPoseVerdict {
    fn signal_kind(&self) -> SignalKind {
        SignalKind::Head
    }

    fn status(&self) -> &'static str {
        match self {
            HeadPoseVerdict::NoFace => "no_face",
            HeadPoseVerdict::Pose { direction: GazeDirection::Center, .. } => "centered",
            HeadPoseVerdict::Pose { .. } => "looking_away",
        }
    }

    fn is_alert(&self, policy: &AlertPolicy) -> bool {
        match self {
            HeadPoseVerdict::NoFace => policy.alert_on_missing_face,
            HeadPoseVerdict::Pose { direction, .. } => *direction != GazeDirection::Center,
        }
    }

    fn label(&self) -> String {
        match self.direction() {
            Some(direction) => direction.label().to_string(),
            None => NO_FACE_LABEL.to_string(),
        }
    }

    fn details(&self) -> serde_json::Value {
        let angles = self.angles();
        let faces_found = match self {
            HeadPoseVerdict::NoFace => 0,
            HeadPoseVerdict::Pose { faces_found, .. } => *faces_found,
        };
        json!({
            "direction": self.label(),
            "yaw": angles.map(|a| a.yaw),
            "pitch": angles.map(|a| a.pitch),
            "roll": angles.map(|a| a.roll),
            "faces_found": faces_found,
        })
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Map angles to a direction. Outside the center box, the axis that exceeds
/// its band by more wins; an exact tie goes to yaw.
pub fn classify_direction(angles: &PoseAngles, bands: &HeadPoseBands) -> GazeDirection {
    let yaw_excess = angles.yaw.abs() - bands.yaw_band_deg;
    let pitch_excess = angles.pitch.abs() - bands.pitch_band_deg;

    if yaw_excess <= 0.0 && pitch_excess <= 0.0 {
        return GazeDirection::Center;
    }

    if yaw_excess >= pitch_excess {
        if angles.yaw < 0.0 {
            GazeDirection::Left
        } else {
            GazeDirection::Right
        }
    } else if angles.pitch > 0.0 {
        GazeDirection::Up
    } else {
        GazeDirection::Down
    }
}

/// Largest face wins, confidence breaks ties
fn primary_face(faces: &[FaceRegion]) -> Option<&FaceRegion> {
    faces.iter().max_by(|a, b| {
        a.bbox
            .area()
            .cmp(&b.bbox.area())
            .then(a.confidence.total_cmp(&b.confidence))
    })
}

fn clamp_angles(angles: PoseAngles) -> PoseAngles {
    let clamp = |v: f32| v.clamp(-MAX_ANGLE_DEG, MAX_ANGLE_DEG);
    PoseAngles {
        yaw: clamp(angles.yaw),
        pitch: clamp(angles.pitch),
        roll: clamp(angles.roll),
    }
}

// ============================================================================
// DETECTOR
// ============================================================================

pub struct HeadPoseDetector {
    locator: Arc<dyn FaceLocator>,
    estimator: Arc<dyn PoseEstimator>,
    bands: HeadPoseBands,
}

impl HeadPoseDetector {
    pub fn new(locator: Arc<dyn FaceLocator>, estimator: Arc<dyn PoseEstimator>, bands: HeadPoseBands) -> Self {
        Self { locator, estimator, bands }
    }

    pub fn detect(&self, frame: &ImageFrame) -> ProctorResult<HeadPoseVerdict> {
        let faces = self.locator.locate(frame)?;
        let Some(face) = primary_face(&faces) else {
            log::debug!("Head pose: no face in {}x{} frame", frame.width(), frame.height());
            return Ok(HeadPoseVerdict::NoFace);
        };

        let angles = match self.estimator.estimate(frame, face) {
            Ok(angles) => clamp_angles(angles),
            Err(InferenceError::Featureless) => {
                log::debug!("Head pose: face region has no skin or features");
                return Ok(HeadPoseVerdict::NoFace);
            }
            Err(e) => return Err(e.into()),
        };
        let direction = classify_direction(&angles, &self.bands);
        log::debug!(
            "Head pose: yaw={:.1} pitch={:.1} roll={:.1} -> {}",
            angles.yaw,
            angles.pitch,
            angles.roll,
            direction.label()
        );

        Ok(HeadPoseVerdict::Pose {
            direction,
            angles,
            faces_found: faces.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::fallback::{GeometricPoseEstimator, SkinToneLocator};
    use crate::logic::model::fixtures::{blank_frame, face_frame, FaceSpec, BACKGROUND, SKIN};
    use crate::logic::model::BoundingBox;

    fn angles(yaw: f32, pitch: f32) -> PoseAngles {
        PoseAngles { yaw, pitch, roll: 0.0 }
    }

    fn detector() -> HeadPoseDetector {
        HeadPoseDetector::new(
            Arc::new(SkinToneLocator::default()),
            Arc::new(GeometricPoseEstimator::default()),
            HeadPoseBands::default(),
        )
    }

    #[test]
    fn test_center_band_inclusive() {
        let bands = HeadPoseBands { yaw_band_deg: 15.0, pitch_band_deg: 12.0 };
        assert_eq!(classify_direction(&angles(0.0, 0.0), &bands), GazeDirection::Center);
        assert_eq!(classify_direction(&angles(15.0, -12.0), &bands), GazeDirection::Center);
    }

    #[test]
    fn test_direction_signs() {
        let bands = HeadPoseBands::default();
        assert_eq!(classify_direction(&angles(-30.0, 0.0), &bands), GazeDirection::Left);
        assert_eq!(classify_direction(&angles(30.0, 0.0), &bands), GazeDirection::Right);
        assert_eq!(classify_direction(&angles(0.0, 25.0), &bands), GazeDirection::Up);
        assert_eq!(classify_direction(&angles(0.0, -25.0), &bands), GazeDirection::Down);
    }

    #[test]
    fn test_larger_excess_wins_and_tie_prefers_yaw() {
        let bands = HeadPoseBands { yaw_band_deg: 10.0, pitch_band_deg: 10.0 };
        // yaw excess 5, pitch excess 20
        assert_eq!(classify_direction(&angles(15.0, -30.0), &bands), GazeDirection::Down);
        // equal excess
        assert_eq!(classify_direction(&angles(-20.0, 20.0), &bands), GazeDirection::Left);
    }

    #[test]
    fn test_blank_frame_is_no_face() {
        let verdict = detector().detect(&blank_frame(160, 120, BACKGROUND)).unwrap();
        assert_eq!(verdict, HeadPoseVerdict::NoFace);
        assert_eq!(verdict.status(), "no_face");
        assert_eq!(verdict.label(), NO_FACE_LABEL);
        assert!(verdict.details()["yaw"].is_null());
        assert!(verdict.is_alert(&AlertPolicy::default()));
        assert!(!verdict.is_alert(&AlertPolicy { alert_on_missing_face: false }));

        for color in [SKIN, [200, 120, 80], [180, 100, 60]] {
            let verdict = detector().detect(&blank_frame(640, 480, color)).unwrap();
            assert_eq!(verdict, HeadPoseVerdict::NoFace, "{:?} frame", color);
        }
    }

    #[test]
    fn test_featureless_skin_blob_is_no_face() {
        let frame = face_frame(320, 240, &[FaceSpec::centered(160, 120).featureless()]);
        assert_eq!(detector().detect(&frame).unwrap(), HeadPoseVerdict::NoFace);
    }

    #[test]
    fn test_frontal_face_is_centered() {
        let frame = face_frame(320, 240, &[FaceSpec::centered(160, 120)]);
        let verdict = detector().detect(&frame).unwrap();
        assert_eq!(verdict.direction(), Some(GazeDirection::Center));
        assert_eq!(verdict.status(), "centered");
        assert!(!verdict.is_alert(&AlertPolicy::default()));
    }

    #[test]
    fn test_turned_face_is_looking_left() {
        let frame = face_frame(320, 240, &[FaceSpec::centered(160, 120).eyes_at(0.25, 0.45, 0.45)]);
        let verdict = detector().detect(&frame).unwrap();
        assert_eq!(verdict.direction(), Some(GazeDirection::Left));
        assert_eq!(verdict.label(), "Looking Left");
        assert!(verdict.is_alert(&AlertPolicy::default()));
    }

    struct FixedFaces(Vec<FaceRegion>);

    impl FaceLocator for FixedFaces {
        fn name(&self) -> &str {
            "fixed"
        }
        fn locate(&self, _frame: &ImageFrame) -> Result<Vec<FaceRegion>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    /// Reports yaw equal to the face box x, so the chosen face is visible
    struct YawFromX;

    impl PoseEstimator for YawFromX {
        fn name(&self) -> &str {
            "yaw-from-x"
        }
        fn estimate(&self, _frame: &ImageFrame, face: &FaceRegion) -> Result<PoseAngles, InferenceError> {
            Ok(PoseAngles { yaw: face.bbox.x as f32, pitch: 0.0, roll: 0.0 })
        }
    }

    struct Broken;

    impl PoseEstimator for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn estimate(&self, _frame: &ImageFrame, _face: &FaceRegion) -> Result<PoseAngles, InferenceError> {
            Err(InferenceError::Failed("session failed".to_string()))
        }
    }

    fn region(x: u32, size: u32, confidence: f32) -> FaceRegion {
        FaceRegion {
            bbox: BoundingBox { x, y: 0, width: size, height: size },
            confidence,
        }
    }

    #[test]
    fn test_primary_face_is_largest_then_most_confident() {
        let faces = vec![region(1, 10, 0.99), region(40, 30, 0.5), region(70, 30, 0.9)];
        let detector = HeadPoseDetector::new(
            Arc::new(FixedFaces(faces)),
            Arc::new(YawFromX),
            HeadPoseBands::default(),
        );
        let verdict = detector.detect(&blank_frame(8, 8, BACKGROUND)).unwrap();
        // yaw 70 -> the 0.9-confidence box at x=70
        assert_eq!(verdict.angles().unwrap().yaw, 70.0);
        assert!(matches!(verdict, HeadPoseVerdict::Pose { faces_found: 3, .. }));
    }

    #[test]
    fn test_angles_clamped() {
        let detector = HeadPoseDetector::new(
            Arc::new(FixedFaces(vec![region(200, 10, 0.9)])),
            Arc::new(YawFromX),
            HeadPoseBands::default(),
        );
        let verdict = detector.detect(&blank_frame(8, 8, BACKGROUND)).unwrap();
        assert_eq!(verdict.angles().unwrap().yaw, MAX_ANGLE_DEG);
    }

    #[test]
    fn test_provider_failure_is_decode_error() {
        let detector = HeadPoseDetector::new(
            Arc::new(FixedFaces(vec![region(0, 10, 0.9)])),
            Arc::new(Broken),
            HeadPoseBands::default(),
        );
        let err = detector.detect(&blank_frame(8, 8, BACKGROUND)).unwrap_err();
        assert_eq!(err.kind(), "decode_error");
    }

    #[test]
    fn test_region_without_skin_is_no_face() {
        // Locator claims a face on a white frame; the estimator finds no skin in it
        let detector = HeadPoseDetector::new(
            Arc::new(FixedFaces(vec![region(0, 40, 0.9)])),
            Arc::new(GeometricPoseEstimator::default()),
            HeadPoseBands::default(),
        );
        let verdict = detector.detect(&blank_frame(64, 64, BACKGROUND)).unwrap();
        assert_eq!(verdict, HeadPoseVerdict::NoFace);
    }
}
