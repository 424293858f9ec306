//! Model Module - Vision Capability Providers
//!
//! Inference is split from the detectors so a model can be swapped without
//! touching verdict logic.
//! - `providers`: provider traits, shared types, `ProviderSet`
//! - `inference`: ONNX session wrapper + preprocessing
//! - `onnx`: ONNX-backed providers
//! - `fallback`: heuristics used when no model is configured

pub mod providers;
pub mod inference;
pub mod onnx;
pub mod fallback;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

// Re-export common types
pub use inference::{InferenceError, OnnxModel};
pub use providers::{
    BoundingBox, Detection, FaceEmbedder, FaceEmbedding, FaceLocator, FaceRegion, ObjectLocator,
    PoseAngles, PoseEstimator, ProviderSet,
};
