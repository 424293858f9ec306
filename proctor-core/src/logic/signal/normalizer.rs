//! Signal Normalizer
//!
//! Raw artifact -> canonical typed input. Rejects malformed input before any
//! detector runs: structural problems are `InvalidInput`, undecodable
//! payloads are `Decode`.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::logic::config::InputLimits;
use crate::logic::error::{ProctorError, ProctorResult};
use super::types::{AudioFeatureSet, ImageFrame, RawAudioFeatures, RawAudioSubmission, StudentId};

#[derive(Debug, Clone, Default)]
pub struct SignalNormalizer {
    limits: InputLimits,
}

impl SignalNormalizer {
    pub fn new(limits: InputLimits) -> Self {
        Self { limits }
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    pub fn student_id(&self, raw: Option<&str>) -> ProctorResult<StudentId> {
        StudentId::parse(raw.unwrap_or_default())
    }

    /// Like `student_id`, but absent/blank is allowed
    pub fn optional_student_id(&self, raw: Option<&str>) -> ProctorResult<Option<StudentId>> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(id) => self.student_id(Some(id)).map(Some),
        }
    }

    // ------------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------------

    /// Encoded upload (JPEG / PNG / BMP) -> RGB8 frame
    pub fn image_from_bytes(&self, bytes: &[u8]) -> ProctorResult<ImageFrame> {
        if bytes.is_empty() {
            return Err(ProctorError::invalid("image is required"));
        }
        if bytes.len() > self.limits.max_image_bytes {
            return Err(ProctorError::invalid(format!(
                "image is {} bytes, limit is {}",
                bytes.len(),
                self.limits.max_image_bytes
            )));
        }

        let format = image::guess_format(bytes)?;
        let reader = image::ImageReader::with_format(std::io::Cursor::new(bytes), format);
        let (width, height) = reader.into_dimensions()?;
        self.check_dimensions(width, height)?;

        let decoded = image::load_from_memory_with_format(bytes, format)?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        log::debug!("Decoded {:?} frame {}x{}", format, width, height);

        Ok(ImageFrame::from_parts(width, height, rgb.into_raw()))
    }

    /// Raw RGB8 buffer with declared dimensions
    pub fn image_from_raw(&self, pixels: Vec<u8>, width: u32, height: u32) -> ProctorResult<ImageFrame> {
        self.check_dimensions(width, height)?;
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(ProctorError::Decode(format!(
                "pixel buffer is {} bytes, {}x{} RGB needs {}",
                pixels.len(),
                width,
                height,
                expected
            )));
        }
        Ok(ImageFrame::from_parts(width, height, pixels))
    }

    fn check_dimensions(&self, width: u32, height: u32) -> ProctorResult<()> {
        if width == 0 || height == 0 {
            return Err(ProctorError::invalid("image has zero width or height"));
        }
        if width > self.limits.max_width || height > self.limits.max_height {
            return Err(ProctorError::invalid(format!(
                "image {}x{} exceeds limit {}x{}",
                width, height, self.limits.max_width, self.limits.max_height
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Audio
    // ------------------------------------------------------------------------

    pub fn audio_from_payload(
        &self,
        raw: &RawAudioSubmission,
    ) -> ProctorResult<(StudentId, AudioFeatureSet)> {
        let student_id = self.student_id(raw.student_id.as_deref())?;
        let features = raw
            .audio_features
            .as_ref()
            .ok_or_else(|| ProctorError::invalid("audio_features is required"))?;
        Ok((student_id, self.audio_features(features)?))
    }

    pub fn audio_features(&self, raw: &RawAudioFeatures) -> ProctorResult<AudioFeatureSet> {
        if raw.volume_level.is_none() && raw.frequency_data.is_none() && raw.duration.is_none() {
            return Err(ProctorError::invalid(
                "audio_features needs at least one of volume_level, frequency_data, duration",
            ));
        }

        let volume_level = match raw.volume_level {
            Some(v) if !v.is_finite() || !(0.0..=1.0).contains(&v) => {
                return Err(ProctorError::invalid(format!("volume_level must be within [0, 1], got {}", v)));
            }
            other => other,
        };

        let frequency_data = match &raw.frequency_data {
            Some(data) if data.iter().any(|m| !m.is_finite()) => {
                return Err(ProctorError::invalid("frequency_data contains non-finite values"));
            }
            // An empty spectrum carries no information
            Some(data) if data.is_empty() => None,
            Some(data) => Some(data.clone()),
            None => None,
        };

        let duration = match raw.duration {
            Some(d) if !d.is_finite() || d <= 0.0 => {
                return Err(ProctorError::invalid(format!("duration must be > 0, got {}", d)));
            }
            other => other,
        };

        Ok(AudioFeatureSet {
            volume_level,
            frequency_data,
            duration,
        })
    }

    // ------------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------------

    /// RFC 3339, or naive ISO-8601 (as browsers' `toISOString` minus zone) read as UTC
    pub fn timestamp(&self, raw: Option<&str>) -> ProctorResult<DateTime<Utc>> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(ProctorError::invalid("time is required"));
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| ProctorError::invalid(format!("time is not ISO-8601: {}", raw)))
    }
}
