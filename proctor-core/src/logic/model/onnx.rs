//! ONNX-backed providers
//!
//! Output contracts the exported models must follow:
//! - face locator: rows of `[x1, y1, x2, y2, score]`, corners in 0.0 - 1.0
//! - head pose: `[yaw, pitch, roll]` in degrees
//! - face embedder: one embedding vector of any length
//! - object detector: rows of `[x1, y1, x2, y2, score, class_id]` after NMS,
//!   corners in 0.0 - 1.0

use crate::constants::MAX_ANGLE_DEG;
use crate::logic::signal::ImageFrame;
use super::inference::{frame_to_tensor, InferenceError, OnnxModel};
use super::providers::{
    BoundingBox, Detection, FaceEmbedder, FaceEmbedding, FaceLocator, FaceRegion, ObjectLocator,
    PoseAngles, PoseEstimator,
};

const FACE_LOCATOR_INPUT: (u32, u32) = (320, 240);
const HEAD_POSE_INPUT: (u32, u32) = (224, 224);
const FACE_EMBEDDER_INPUT: (u32, u32) = (112, 112);
const OBJECT_DETECTOR_INPUT: (u32, u32) = (640, 640);

/// Rows below this score are dropped before they reach a detector
const MIN_ROW_SCORE: f32 = 0.05;

// ============================================================================
// FACE LOCATOR
// ============================================================================

pub struct OnnxFaceLocator {
    model: OnnxModel,
}

impl OnnxFaceLocator {
    pub fn new(model: OnnxModel) -> Self {
        Self { model }
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn name(&self) -> &str {
        "onnx-face-locator"
    }

    fn locate(&self, frame: &ImageFrame) -> Result<Vec<FaceRegion>, InferenceError> {
        let output = self.model.run(frame_to_tensor(frame, None, FACE_LOCATOR_INPUT))?;
        if output.len() % 5 != 0 {
            return Err(InferenceError::Failed(format!("face locator output length {} is not a multiple of 5", output.len())));
        }

        let faces = output
            .chunks_exact(5)
            .filter(|row| row[4] >= MIN_ROW_SCORE)
            .filter_map(|row| {
                let bbox = scale_box(row, frame)?;
                Some(FaceRegion { bbox, confidence: row[4].clamp(0.0, 1.0) })
            })
            .collect();
        Ok(faces)
    }
}

// ============================================================================
// HEAD POSE
// ============================================================================

pub struct OnnxPoseEstimator {
    model: OnnxModel,
}

impl OnnxPoseEstimator {
    pub fn new(model: OnnxModel) -> Self {
        Self { model }
    }
}

impl PoseEstimator for OnnxPoseEstimator {
    fn name(&self) -> &str {
        "onnx-head-pose"
    }

    fn estimate(&self, frame: &ImageFrame, face: &FaceRegion) -> Result<PoseAngles, InferenceError> {
        let output = self.model.run(frame_to_tensor(frame, Some(&face.bbox), HEAD_POSE_INPUT))?;
        match output.as_slice() {
            [yaw, pitch, roll, ..] if yaw.is_finite() && pitch.is_finite() && roll.is_finite() => Ok(PoseAngles {
                yaw: yaw.clamp(-MAX_ANGLE_DEG, MAX_ANGLE_DEG),
                pitch: pitch.clamp(-MAX_ANGLE_DEG, MAX_ANGLE_DEG),
                roll: roll.clamp(-MAX_ANGLE_DEG, MAX_ANGLE_DEG),
            }),
            _ => Err(InferenceError::Failed(format!("head pose output {:?} is not [yaw, pitch, roll]", output))),
        }
    }
}

// ============================================================================
// FACE EMBEDDER
// ============================================================================

pub struct OnnxFaceEmbedder {
    model: OnnxModel,
}

impl OnnxFaceEmbedder {
    pub fn new(model: OnnxModel) -> Self {
        Self { model }
    }
}

impl FaceEmbedder for OnnxFaceEmbedder {
    fn name(&self) -> &str {
        "onnx-face-embedder"
    }

    fn embed(&self, frame: &ImageFrame, face: &FaceRegion) -> Result<FaceEmbedding, InferenceError> {
        let output = self.model.run(frame_to_tensor(frame, Some(&face.bbox), FACE_EMBEDDER_INPUT))?;
        FaceEmbedding::from_raw(output)
    }
}

// ============================================================================
// OBJECT DETECTOR
// ============================================================================

pub struct OnnxObjectLocator {
    model: OnnxModel,
    labels: Vec<String>,
}

impl OnnxObjectLocator {
    pub fn new(model: OnnxModel, labels: Vec<String>) -> Self {
        Self { model, labels }
    }
}

impl ObjectLocator for OnnxObjectLocator {
    fn name(&self) -> &str {
        "onnx-object-detector"
    }

    fn detect(&self, frame: &ImageFrame) -> Result<Vec<Detection>, InferenceError> {
        let output = self.model.run(frame_to_tensor(frame, None, OBJECT_DETECTOR_INPUT))?;
        if output.len() % 6 != 0 {
            return Err(InferenceError::Failed(format!("object output length {} is not a multiple of 6", output.len())));
        }

        let mut detections = Vec::new();
        for row in output.chunks_exact(6) {
            if row[4] < MIN_ROW_SCORE {
                continue;
            }
            let class_id = row[5];
            let label = if class_id >= 0.0 {
                self.labels.get(class_id as usize)
            } else {
                None
            };
            let Some(label) = label else {
                log::debug!("Unknown class id {} from object model", class_id);
                continue;
            };
            if let Some(bbox) = scale_box(row, frame) {
                detections.push(Detection {
                    label: label.clone(),
                    confidence: row[4].clamp(0.0, 1.0),
                    bbox,
                });
            }
        }
        Ok(detections)
    }
}

fn scale_box(row: &[f32], frame: &ImageFrame) -> Option<BoundingBox> {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    BoundingBox::from_corners(row[0] * w, row[1] * h, row[2] * w, row[3] * h, frame.width(), frame.height())
}

/// Class names of the 80-class COCO set, in model index order
pub const COCO_LABELS: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];
