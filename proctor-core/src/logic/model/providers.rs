//! Capability Providers
//!
//! Contracts the detectors need from a vision model. A provider is either an
//! ONNX model (`onnx.rs`) or a deterministic heuristic (`fallback.rs`); the
//! detectors never know which one they hold.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::logic::config::ModelPaths;
use crate::logic::signal::ImageFrame;
use super::fallback::{FaceCountObjectLocator, GeometricPoseEstimator, IntensityGridEmbedder, SkinToneLocator};
use super::inference::{InferenceError, OnnxModel};
use super::onnx::{OnnxFaceEmbedder, OnnxFaceLocator, OnnxObjectLocator, OnnxPoseEstimator};

// ============================================================================
// SHARED TYPES
// ============================================================================

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Build from float corners, clamped to the frame. `None` if empty.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32, frame_w: u32, frame_h: u32) -> Option<Self> {
        let clamp_x = |v: f32| v.max(0.0).min(frame_w as f32);
        let clamp_y = |v: f32| v.max(0.0).min(frame_h as f32);
        let (x1, x2) = (clamp_x(x1.min(x2)), clamp_x(x1.max(x2)));
        let (y1, y2) = (clamp_y(y1.min(y2)), clamp_y(y1.max(y2)));

        let x = x1.floor() as u32;
        let y = y1.floor() as u32;
        let width = (x2.ceil() as u32).saturating_sub(x);
        let height = (y2.ceil() as u32).saturating_sub(y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { x, y, width, height })
    }

    /// Box shrunk by `fraction` of its size on every side
    pub fn inset(&self, fraction: f32) -> Self {
        let dx = (self.width as f32 * fraction) as u32;
        let dy = (self.height as f32 * fraction) as u32;
        Self {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width.saturating_sub(2 * dx).max(1),
            height: self.height.saturating_sub(2 * dy).max(1),
        }
    }
}

/// One located face
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Head orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseAngles {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Facial signature. Always L2-normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceEmbedding(Vec<f32>);

impl FaceEmbedding {
    /// Normalize raw model output. Zero / non-finite vectors are rejected.
    pub fn from_raw(values: Vec<f32>) -> Result<Self, InferenceError> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::Failed("embedding is empty or non-finite".to_string()));
        }
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm < 1e-6 {
            return Err(InferenceError::Featureless);
        }
        Ok(Self(values.into_iter().map(|v| v / norm).collect()))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance. Embeddings of different length never match.
    pub fn distance(&self, other: &FaceEmbedding) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

// ============================================================================
// PROVIDER TRAITS
// ============================================================================

pub trait FaceLocator: Send + Sync {
    fn name(&self) -> &str;
    fn locate(&self, frame: &ImageFrame) -> Result<Vec<FaceRegion>, InferenceError>;
}

pub trait PoseEstimator: Send + Sync {
    fn name(&self) -> &str;
    fn estimate(&self, frame: &ImageFrame, face: &FaceRegion) -> Result<PoseAngles, InferenceError>;
}

pub trait FaceEmbedder: Send + Sync {
    fn name(&self) -> &str;
    fn embed(&self, frame: &ImageFrame, face: &FaceRegion) -> Result<FaceEmbedding, InferenceError>;
}

pub trait ObjectLocator: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, frame: &ImageFrame) -> Result<Vec<Detection>, InferenceError>;
}

// ============================================================================
// PROVIDER SET
// ============================================================================

/// The providers one pipeline runs with
#[derive(Clone)]
pub struct ProviderSet {
    pub face_locator: Arc<dyn FaceLocator>,
    pub pose_estimator: Arc<dyn PoseEstimator>,
    pub face_embedder: Arc<dyn FaceEmbedder>,
    pub object_locator: Arc<dyn ObjectLocator>,
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("face_locator", &self.face_locator.name())
            .field("pose_estimator", &self.pose_estimator.name())
            .field("face_embedder", &self.face_embedder.name())
            .field("object_locator", &self.object_locator.name())
            .finish()
    }
}

impl ProviderSet {
    /// Heuristics only, no model files needed
    pub fn fallback(person_label: &str) -> Self {
        let locator: Arc<dyn FaceLocator> = Arc::new(SkinToneLocator::default());
        Self {
            object_locator: Arc::new(FaceCountObjectLocator::new(locator.clone(), person_label)),
            face_locator: locator,
            pose_estimator: Arc::new(GeometricPoseEstimator::default()),
            face_embedder: Arc::new(IntensityGridEmbedder::default()),
        }
    }

    /// ONNX where a model is configured and loads, heuristics otherwise
    pub fn from_config(paths: &ModelPaths, person_label: &str) -> Self {
        let mut set = Self::fallback(person_label);

        if let Some(model) = load_optional(paths.face_locator.as_deref(), "face_locator") {
            set.face_locator = Arc::new(OnnxFaceLocator::new(model));
            // Person counting follows the better locator
            set.object_locator = Arc::new(FaceCountObjectLocator::new(set.face_locator.clone(), person_label));
        }
        if let Some(model) = load_optional(paths.head_pose.as_deref(), "head_pose") {
            set.pose_estimator = Arc::new(OnnxPoseEstimator::new(model));
        }
        if let Some(model) = load_optional(paths.face_embedder.as_deref(), "face_embedder") {
            set.face_embedder = Arc::new(OnnxFaceEmbedder::new(model));
        }
        if let Some(model) = load_optional(paths.object_detector.as_deref(), "object_detector") {
            match load_labels(paths.object_labels.as_deref()) {
                Ok(labels) => set.object_locator = Arc::new(OnnxObjectLocator::new(model, labels)),
                Err(e) => log::warn!("Object labels unavailable ({}) - keeping fallback object locator", e),
            }
        }

        log::info!("Vision providers: {:?}", set);
        set
    }
}

fn load_optional(path: Option<&Path>, role: &str) -> Option<OnnxModel> {
    let path = path?;
    match OnnxModel::load(path, role) {
        Ok(model) => Some(model),
        Err(e) => {
            log::warn!("{} model not loaded ({}) - using fallback heuristics", role, e);
            None
        }
    }
}

/// One class name per line, indexed by class id. COCO names when absent.
fn load_labels(path: Option<&Path>) -> Result<Vec<String>, InferenceError> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| InferenceError::Failed(format!("Cannot read labels {:?}: {}", path, e)))?;
            Ok(content.lines().map(|l| l.trim().to_string()).collect())
        }
        None => Ok(super::onnx::COCO_LABELS.iter().map(|s| s.to_string()).collect()),
    }
}
