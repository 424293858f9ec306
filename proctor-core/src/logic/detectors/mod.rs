//! Detectors Module - Per-Signal Analysis
//!
//! Each detector turns one normalized input into a verdict. Detectors hold
//! no per-request state and are shared behind `Arc`.
//! - `verdict`: `Verdict` trait, `DetectionVerdict`, `SignalKind`
//! - `head_pose`: gaze direction from yaw/pitch bands
//! - `face_identity`: registration + verification against stored references
//! - `objects`: forbidden objects and extra persons
//! - `audio`: volume / frequency-variation anomalies

pub mod verdict;
pub mod head_pose;
pub mod face_identity;
pub mod objects;
pub mod audio;

// Re-export common types
pub use audio::{AudioAnomalyDetector, AudioCheck, AudioStatus, AudioVerdict};
pub use face_identity::{FaceExtraction, FaceIdentityVerifier, FaceStatus, FaceVerdict};
pub use head_pose::{classify_direction, GazeDirection, HeadPoseDetector, HeadPoseVerdict, NO_FACE_LABEL};
pub use objects::{ForbiddenObjectDetector, ObjectStatus, ObjectVerdict};
pub use verdict::{DetectionVerdict, SignalKind, Verdict};
