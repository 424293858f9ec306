//! Verdict Types
//!
//! Shared shape of every detector result. Data only; detection logic lives
//! in the sibling modules.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::logic::config::AlertPolicy;
use super::audio::AudioVerdict;
use super::face_identity::FaceVerdict;
use super::head_pose::HeadPoseVerdict;
use super::objects::ObjectVerdict;

// ============================================================================
// SIGNAL KIND
// ============================================================================

/// Which sensor channel produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Head,
    Face,
    Object,
    Audio,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Head => "head",
            SignalKind::Face => "face",
            SignalKind::Object => "object",
            SignalKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "head" => Ok(SignalKind::Head),
            "face" => Ok(SignalKind::Face),
            "object" => Ok(SignalKind::Object),
            "audio" => Ok(SignalKind::Audio),
            other => Err(format!("unknown signal kind: {}", other)),
        }
    }
}

// ============================================================================
// VERDICT TRAIT
// ============================================================================

/// What the orchestrator needs from any detector result
pub trait Verdict {
    fn signal_kind(&self) -> SignalKind;

    /// Machine-readable status, e.g. `clear`, `no_match`
    fn status(&self) -> &'static str;

    /// Whether this verdict should land in the alert journal
    fn is_alert(&self, policy: &AlertPolicy) -> bool;

    /// Human-readable line for the dashboard
    fn label(&self) -> String;

    /// Structured payload stored with the alert
    fn details(&self) -> serde_json::Value;
}

// ============================================================================
// DETECTION VERDICT
// ============================================================================

/// Result of one dispatched observation
#[derive(Debug, Clone)]
pub enum DetectionVerdict {
    HeadPose(HeadPoseVerdict),
    Face(FaceVerdict),
    Objects(ObjectVerdict),
    Audio(AudioVerdict),
}

impl DetectionVerdict {
    fn inner(&self) -> &dyn Verdict {
        match self {
            DetectionVerdict::HeadPose(v) => v,
            DetectionVerdict::Face(v) => v,
            DetectionVerdict::Objects(v) => v,
            DetectionVerdict::Audio(v) => v,
        }
    }
}

impl Verdict for DetectionVerdict {
    fn signal_kind(&self) -> SignalKind {
        self.inner().signal_kind()
    }

    fn status(&self) -> &'static str {
        self.inner().status()
    }

    fn is_alert(&self, policy: &AlertPolicy) -> bool {
        self.inner().is_alert(policy)
    }

    fn label(&self) -> String {
        self.inner().label()
    }

    fn details(&self) -> serde_json::Value {
        self.inner().details()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_kind_roundtrip_names() {
        for kind in [SignalKind::Head, SignalKind::Face, SignalKind::Object, SignalKind::Audio] {
            assert_eq!(kind.as_str().parse::<SignalKind>().unwrap(), kind);
        }
        assert_eq!(" HEAD ".parse::<SignalKind>().unwrap(), SignalKind::Head);
        assert!("gaze".parse::<SignalKind>().is_err());
    }
}
