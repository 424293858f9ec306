//! Audio Anomaly Detector
//!
//! Independent sub-checks over one feature window, unioned. A window that
//! triggers nothing but could not run every check is reported as
//! `insufficient_data`, never as `clear`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::logic::config::{AlertPolicy, AudioThresholds};
use crate::logic::signal::AudioFeatureSet;
use super::verdict::{SignalKind, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCheck {
    Volume,
    FrequencyVariation,
}

impl AudioCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCheck::Volume => "volume",
            AudioCheck::FrequencyVariation => "frequency_variation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioStatus {
    Clear,
    AnomalyDetected,
    InsufficientData,
}

impl AudioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioStatus::Clear => "clear",
            AudioStatus::AnomalyDetected => "anomaly_detected",
            AudioStatus::InsufficientData => "insufficient_data",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioVerdict {
    pub status: AudioStatus,
    /// Triggered checks, always in `AudioCheck` declaration order
    pub anomalies: Vec<AudioCheck>,
    /// Checks skipped for lack of input
    pub unavailable: Vec<AudioCheck>,
    /// Echoed exactly as received
    pub volume_level: Option<f64>,
    pub frequency_std: Option<f64>,
    pub duration: Option<f64>,
}

impl Verdict for AudioVerdict {
    fn signal_kind(&self) -> SignalKind {
        SignalKind::Audio
    }

    fn status(&self) -> &'static str {
        self.status.as_str()
    }

    fn is_alert(&self, _policy: &AlertPolicy) -> bool {
        self.status == AudioStatus::AnomalyDetected
    }

    fn label(&self) -> String {
        match self.status {
            AudioStatus::Clear => "Audio clear".to_string(),
            AudioStatus::InsufficientData => "Audio data incomplete".to_string(),
            AudioStatus::AnomalyDetected => {
                let names: Vec<&str> = self.anomalies.iter().map(AudioCheck::as_str).collect();
                format!("Audio anomaly: {}", names.join(", "))
            }
        }
    }

    fn details(&self) -> serde_json::Value {
        json!({
            "status": self.status.as_str(),
            "anomalies": self.anomalies,
            "unavailable": self.unavailable,
            "volume_level": self.volume_level,
            "frequency_std": self.frequency_std,
            "duration": self.duration,
        })
    }
}

/// Population standard deviation (divide by n). `None` for an empty slice.
pub fn population_std(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

#[derive(Debug, Clone, Default)]
pub struct AudioAnomalyDetector {
    thresholds: AudioThresholds,
}

impl AudioAnomalyDetector {
    pub fn new(thresholds: AudioThresholds) -> Self {
        Self { thresholds }
    }

    pub fn detect(&self, features: &AudioFeatureSet) -> AudioVerdict {
        let mut anomalies = Vec::new();
        let mut unavailable = Vec::new();

        match features.volume_level {
            Some(volume) if volume > self.thresholds.volume_threshold as f64 => anomalies.push(AudioCheck::Volume),
            Some(_) => {}
            None => unavailable.push(AudioCheck::Volume),
        }

        let frequency_std = features.frequency_data.as_deref().and_then(population_std);
        match frequency_std {
            Some(std) if std > self.thresholds.frequency_std_threshold as f64 => {
                anomalies.push(AudioCheck::FrequencyVariation)
            }
            Some(_) => {}
            None => unavailable.push(AudioCheck::FrequencyVariation),
        }

        let status = if !anomalies.is_empty() {
            AudioStatus::AnomalyDetected
        } else if !unavailable.is_empty() {
            AudioStatus::InsufficientData
        } else {
            AudioStatus::Clear
        };

        AudioVerdict {
            status,
            anomalies,
            unavailable,
            volume_level: features.volume_level,
            frequency_std,
            duration: features.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(volume: Option<f64>, freq: Option<Vec<f64>>) -> AudioFeatureSet {
        AudioFeatureSet {
            volume_level: volume,
            frequency_data: freq,
            duration: Some(1.0),
        }
    }

    #[test]
    fn test_population_std() {
        assert_eq!(population_std(&[]), None);
        assert_eq!(population_std(&[0.5]), Some(0.0));
        let std = population_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((std - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_quiet_steady_window_is_clear() {
        let verdict = AudioAnomalyDetector::default().detect(&features(Some(0.3), Some(vec![0.1, 0.2, 0.1])));
        assert_eq!(verdict.status, AudioStatus::Clear);
        assert!(verdict.anomalies.is_empty());
        assert!(!verdict.is_alert(&AlertPolicy::default()));
    }

    #[test]
    fn test_loud_window_echoes_volume() {
        let verdict = AudioAnomalyDetector::default().detect(&features(Some(0.6), Some(vec![0.1, 0.2, 0.1])));
        assert_eq!(verdict.status, AudioStatus::AnomalyDetected);
        assert_eq!(verdict.anomalies, vec![AudioCheck::Volume]);
        assert_eq!(verdict.details()["volume_level"], json!(0.6));
        assert_eq!(verdict.details()["anomalies"], json!(["volume"]));
        assert!(verdict.is_alert(&AlertPolicy::default()));
    }

    #[test]
    fn test_volume_threshold_is_strict() {
        let verdict = AudioAnomalyDetector::default().detect(&features(Some(0.5), Some(vec![0.2, 0.2])));
        assert_eq!(verdict.status, AudioStatus::Clear);
    }

    #[test]
    fn test_anomalies_in_fixed_order() {
        let verdict = AudioAnomalyDetector::default().detect(&features(Some(0.9), Some(vec![0.0, 1.0, 0.0, 1.0])));
        assert_eq!(verdict.anomalies, vec![AudioCheck::Volume, AudioCheck::FrequencyVariation]);
        assert_eq!(verdict.label(), "Audio anomaly: volume, frequency_variation");
    }

    #[test]
    fn test_partial_window_is_insufficient_not_clear() {
        let verdict = AudioAnomalyDetector::default().detect(&features(Some(0.2), None));
        assert_eq!(verdict.status, AudioStatus::InsufficientData);
        assert_eq!(verdict.unavailable, vec![AudioCheck::FrequencyVariation]);
        assert_ne!(verdict.status, AudioStatus::Clear);
    }

    #[test]
    fn test_partial_window_can_still_alert() {
        let verdict = AudioAnomalyDetector::default().detect(&features(None, Some(vec![0.0, 0.9])));
        assert_eq!(verdict.status, AudioStatus::AnomalyDetected);
        assert_eq!(verdict.unavailable, vec![AudioCheck::Volume]);
    }

    #[test]
    fn test_custom_thresholds() {
        let detector = AudioAnomalyDetector::new(AudioThresholds {
            volume_threshold: 0.2,
            frequency_std_threshold: 0.01,
        });
        let verdict = detector.detect(&features(Some(0.3), Some(vec![0.1, 0.2, 0.1])));
        assert_eq!(verdict.anomalies, vec![AudioCheck::Volume, AudioCheck::FrequencyVariation]);
    }
}
