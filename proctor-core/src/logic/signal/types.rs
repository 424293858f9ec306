//! Signal Types
//!
//! Canonical inputs the detectors accept. Only the normalizer builds these,
//! so every instance already satisfies its invariants.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_STUDENT_ID_LEN;
use crate::logic::error::{ProctorError, ProctorResult};

// ============================================================================
// STUDENT ID
// ============================================================================

/// Non-empty, trimmed student identifier (roll number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StudentId(String);

impl StudentId {
    /// Trim and validate: non-empty, at most `MAX_STUDENT_ID_LEN` characters
    pub fn parse(raw: &str) -> ProctorResult<Self> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(ProctorError::invalid("student_id is required"));
        }
        if id.chars().count() > MAX_STUDENT_ID_LEN {
            return Err(ProctorError::invalid(format!(
                "student_id longer than {} characters",
                MAX_STUDENT_ID_LEN
            )));
        }
        Ok(StudentId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StudentId {
    type Error = ProctorError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        StudentId::parse(&raw)
    }
}

impl From<StudentId> for String {
    fn from(id: StudentId) -> Self {
        id.0
    }
}

impl AsRef<str> for StudentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// IMAGE FRAME
// ============================================================================

/// Decoded RGB8 frame, row-major, 3 bytes per pixel
#[derive(Clone, PartialEq)]
pub struct ImageFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ImageFrame {
    /// Caller guarantees `pixels.len() == width * height * 3`
    pub(crate) fn from_parts(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 3);
        Self { width, height, pixels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGB at (x, y); caller keeps coordinates in bounds
    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    /// Rec. 601 luma at (x, y), 0.0 - 255.0
    #[inline]
    pub fn luma(&self, x: u32, y: u32) -> f32 {
        let [r, g, b] = self.rgb(x, y);
        0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
    }

    /// Copy into an `image` buffer for resampling
    pub fn to_rgb_image(&self) -> image::RgbImage {
        image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| image::RgbImage::new(self.width, self.height))
    }
}

impl fmt::Debug for ImageFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

// ============================================================================
// AUDIO FEATURES
// ============================================================================

/// Short-window audio features. At least one field is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatureSet {
    /// 0.0 - 1.0, kept at input precision so it echoes back unchanged
    pub volume_level: Option<f64>,
    /// Ordered magnitudes, all finite, never empty when present
    pub frequency_data: Option<Vec<f64>>,
    /// Seconds, > 0
    pub duration: Option<f64>,
}

// ============================================================================
// OBSERVATION
// ============================================================================

/// One unit of sensor input
#[derive(Debug, Clone)]
pub enum Signal {
    Image(ImageFrame),
    Audio(AudioFeatureSet),
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Image(_) => "image",
            Signal::Audio(_) => "audio",
        }
    }
}

/// Sensor input tagged with who and when
#[derive(Debug, Clone)]
pub struct Observation {
    pub student_id: StudentId,
    pub timestamp: DateTime<Utc>,
    pub signal: Signal,
}

impl Observation {
    pub fn new(student_id: StudentId, signal: Signal) -> Self {
        Self {
            student_id,
            timestamp: Utc::now(),
            signal,
        }
    }
}

// ============================================================================
// RAW PAYLOADS (as received at the boundary)
// ============================================================================

/// Audio features exactly as posted; every field may be missing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAudioFeatures {
    pub volume_level: Option<f64>,
    pub frequency_data: Option<Vec<f64>>,
    pub duration: Option<f64>,
}

/// `{student_id, audio_features: {...}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAudioSubmission {
    pub student_id: Option<String>,
    pub audio_features: Option<RawAudioFeatures>,
}

/// Client-reported alert `{student_id, direction, time}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAlertSubmission {
    pub student_id: Option<String>,
    pub direction: Option<String>,
    pub time: Option<String>,
    #[serde(default)]
    pub signal_kind: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
