//! Detection Configuration
//!
//! Every threshold the detectors use lives here as a named field.
//! Load order: defaults (`constants.rs`) -> optional JSON file -> env overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::*;
use super::error::{ProctorError, ProctorResult};

/// Environment variable naming an optional JSON config file
pub const CONFIG_PATH_ENV: &str = "PROCTOR_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub audio: AudioThresholds,
    pub head_pose: HeadPoseBands,
    pub face: FaceMatchConfig,
    pub objects: ObjectConfig,
    pub limits: InputLimits,
    pub alerts: AlertPolicy,
    pub models: ModelPaths,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioThresholds {
    pub volume_threshold: f32,
    pub frequency_std_threshold: f32,
}

impl Default for AudioThresholds {
    fn default() -> Self {
        Self {
            volume_threshold: DEFAULT_VOLUME_THRESHOLD,
            frequency_std_threshold: DEFAULT_FREQUENCY_STD_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadPoseBands {
    pub yaw_band_deg: f32,
    pub pitch_band_deg: f32,
}

impl Default for HeadPoseBands {
    fn default() -> Self {
        Self {
            yaw_band_deg: DEFAULT_YAW_BAND_DEG,
            pitch_band_deg: DEFAULT_PITCH_BAND_DEG,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceMatchConfig {
    pub max_match_distance: f32,
}

impl Default for FaceMatchConfig {
    fn default() -> Self {
        Self {
            max_match_distance: DEFAULT_MAX_MATCH_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    pub confidence_threshold: f32,
    pub forbidden_labels: Vec<String>,
    pub person_label: String,
    pub max_person_count: usize,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_OBJECT_CONFIDENCE,
            forbidden_labels: DEFAULT_FORBIDDEN_LABELS.iter().map(|s| s.to_string()).collect(),
            person_label: DEFAULT_PERSON_LABEL.to_string(),
            max_person_count: DEFAULT_MAX_PERSON_COUNT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputLimits {
    pub max_image_bytes: usize,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    /// Journal frames where the candidate's face is missing
    pub alert_on_missing_face: bool,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            alert_on_missing_face: true,
        }
    }
}

/// Optional ONNX models. Missing entries fall back to heuristics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub face_locator: Option<PathBuf>,
    pub face_embedder: Option<PathBuf>,
    pub head_pose: Option<PathBuf>,
    pub object_detector: Option<PathBuf>,
    /// Class names indexed by the object model's class id
    pub object_labels: Option<PathBuf>,
}

impl DetectionConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> ProctorResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProctorError::invalid(format!("cannot read config {:?}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ProctorError::invalid(format!("cannot parse config {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then `PROCTOR_CONFIG` file if set, then `PROCTOR_*` overrides
    pub fn from_env() -> ProctorResult<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        override_from_env("PROCTOR_VOLUME_THRESHOLD", &mut self.audio.volume_threshold);
        override_from_env("PROCTOR_FREQUENCY_STD_THRESHOLD", &mut self.audio.frequency_std_threshold);
        override_from_env("PROCTOR_YAW_BAND_DEG", &mut self.head_pose.yaw_band_deg);
        override_from_env("PROCTOR_PITCH_BAND_DEG", &mut self.head_pose.pitch_band_deg);
        override_from_env("PROCTOR_MAX_MATCH_DISTANCE", &mut self.face.max_match_distance);
        override_from_env("PROCTOR_OBJECT_CONFIDENCE", &mut self.objects.confidence_threshold);
        override_from_env("PROCTOR_MAX_PERSON_COUNT", &mut self.objects.max_person_count);
        override_from_env("PROCTOR_MAX_IMAGE_BYTES", &mut self.limits.max_image_bytes);
        override_from_env("PROCTOR_ALERT_ON_MISSING_FACE", &mut self.alerts.alert_on_missing_face);

        if let Ok(labels) = std::env::var("PROCTOR_FORBIDDEN_LABELS") {
            self.objects.forbidden_labels = labels
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
        }

        let models = &mut self.models;
        for (key, slot) in [
            ("PROCTOR_FACE_LOCATOR_MODEL", &mut models.face_locator),
            ("PROCTOR_FACE_EMBEDDER_MODEL", &mut models.face_embedder),
            ("PROCTOR_HEAD_POSE_MODEL", &mut models.head_pose),
            ("PROCTOR_OBJECT_MODEL", &mut models.object_detector),
            ("PROCTOR_OBJECT_LABELS", &mut models.object_labels),
        ] {
            if let Ok(path) = std::env::var(key) {
                *slot = Some(PathBuf::from(path));
            }
        }
    }

    /// Reject values that would make a detector meaningless
    pub fn validate(&self) -> ProctorResult<()> {
        let unit = |name: &str, v: f32| {
            if v.is_finite() && (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ProctorError::invalid(format!("{} must be within [0, 1], got {}", name, v)))
            }
        };
        unit("audio.volume_threshold", self.audio.volume_threshold)?;
        unit("objects.confidence_threshold", self.objects.confidence_threshold)?;

        if !(self.audio.frequency_std_threshold.is_finite() && self.audio.frequency_std_threshold >= 0.0) {
            return Err(ProctorError::invalid("audio.frequency_std_threshold must be >= 0"));
        }
        for (name, band) in [
            ("head_pose.yaw_band_deg", self.head_pose.yaw_band_deg),
            ("head_pose.pitch_band_deg", self.head_pose.pitch_band_deg),
        ] {
            if !(band.is_finite() && band >= 0.0 && band <= MAX_ANGLE_DEG) {
                return Err(ProctorError::invalid(format!("{} must be within [0, {}]", name, MAX_ANGLE_DEG)));
            }
        }
        if !(self.face.max_match_distance.is_finite() && self.face.max_match_distance > 0.0) {
            return Err(ProctorError::invalid("face.max_match_distance must be > 0"));
        }
        if self.limits.max_width == 0 || self.limits.max_height == 0 || self.limits.max_image_bytes == 0 {
            return Err(ProctorError::invalid("limits must be non-zero"));
        }
        Ok(())
    }
}

fn override_from_env<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Some(value) = std::env::var(key).ok().and_then(|v| v.trim().parse().ok()) {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DetectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.volume_threshold, 0.5);
        assert!(config.objects.forbidden_labels.contains(&"cell phone".to_string()));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proctor.json");
        std::fs::write(&path, r#"{"audio": {"volume_threshold": 0.7}}"#).unwrap();

        let config = DetectionConfig::load(&path).unwrap();
        assert_eq!(config.audio.volume_threshold, 0.7);
        assert_eq!(config.audio.frequency_std_threshold, DEFAULT_FREQUENCY_STD_THRESHOLD);
        assert_eq!(config.head_pose.yaw_band_deg, DEFAULT_YAW_BAND_DEG);
    }

    #[test]
    fn test_reject_out_of_range_threshold() {
        let mut config = DetectionConfig::default();
        config.audio.volume_threshold = 1.5;
        assert!(matches!(config.validate(), Err(ProctorError::InvalidInput(_))));
    }
}
