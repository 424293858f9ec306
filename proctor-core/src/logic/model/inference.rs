//! ONNX Runtime sessions and frame preprocessing
//!
//! Every ONNX-backed provider goes through `OnnxModel`, so session handling
//! lives in one place.

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;

use crate::logic::signal::ImageFrame;
use super::providers::BoundingBox;

/// A provider could not produce a result for this frame
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Failed(String),
    /// The region holds nothing to measure: no features, no skin
    #[error("face region carries no features")]
    Featureless,
}

/// One loaded ONNX session. `run` needs `&mut Session`, hence the mutex.
pub struct OnnxModel {
    role: String,
    path: PathBuf,
    session: Mutex<Session>,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("role", &self.role)
            .field("path", &self.path)
            .finish()
    }
}

impl OnnxModel {
    pub fn load(path: &Path, role: &str) -> Result<Self, InferenceError> {
        if !path.exists() {
            return Err(InferenceError::Failed(format!("{} model not found at {:?}", role, path)));
        }

        let load_error = |e: &dyn std::fmt::Display| InferenceError::Failed(format!("cannot load {} model {:?}: {}", role, path, e));
        let session = Session::builder()
            .map_err(|e| load_error(&e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(&e))?
            .commit_from_file(path)
            .map_err(|e| load_error(&e))?;

        log::info!("{} model loaded from {:?}", role, path);
        Ok(Self {
            role: role.to_string(),
            path: path.to_path_buf(),
            session: Mutex::new(session),
        })
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Run on one NCHW tensor; first output, flattened
    pub fn run(&self, input: Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let started = Instant::now();
        let tensor = Value::from_array(input)
            .map_err(|e| InferenceError::Failed(format!("{}: bad input tensor: {}", self.role, e)))?;

        let mut session = self.session.lock();
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| InferenceError::Failed(format!("{}: model declares no outputs", self.role)))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| InferenceError::Failed(format!("{}: {}", self.role, e)))?;
        let (_, data) = outputs
            .get(&output_name)
            .ok_or_else(|| InferenceError::Failed(format!("{}: output {} missing", self.role, output_name)))?
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Failed(format!("{}: output is not f32: {}", self.role, e)))?;
        let data = data.to_vec();

        log::trace!("{} inference took {:?}", self.role, started.elapsed());
        Ok(data)
    }
}

// ============================================================================
// PREPROCESSING
// ============================================================================

/// Crop (optional), resize and convert to a `[1, 3, H, W]` tensor in 0.0 - 1.0
pub fn frame_to_tensor(frame: &ImageFrame, region: Option<&BoundingBox>, size: (u32, u32)) -> Array4<f32> {
    let rgb = frame.to_rgb_image();
    let source = match region {
        Some(b) => image::imageops::crop_imm(&rgb, b.x, b.y, b.width, b.height).to_image(),
        None => rgb,
    };
    let (width, height) = size;
    let resized = image::imageops::resize(&source, width, height, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::signal::SignalNormalizer;

    #[test]
    fn test_missing_model_rejected() {
        let result = OnnxModel::load(Path::new("/nonexistent/model.onnx"), "test");
        assert!(result.is_err());
    }

    #[test]
    fn test_frame_to_tensor_shape_and_scale() {
        let mut pixels = vec![0u8; 8 * 4 * 3];
        for chunk in pixels.chunks_mut(3) {
            chunk.copy_from_slice(&[255, 0, 51]);
        }
        let frame = SignalNormalizer::default().image_from_raw(pixels, 8, 4).unwrap();

        let tensor = frame_to_tensor(&frame, None, (4, 2));
        assert_eq!(tensor.shape(), &[1, 3, 2, 4]);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 1, 3]]).abs() < 1e-6);
        assert!((tensor[[0, 2, 1, 1]] - 0.2).abs() < 1e-6);
    }
}
