//! Face Identity Verifier
//!
//! Registers one reference embedding per student and compares later frames
//! against it. Extraction is synchronous CPU work; store access is async, so
//! callers can run the two on different executors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::logic::config::{AlertPolicy, FaceMatchConfig};
use crate::logic::error::{ProctorError, ProctorResult};
use crate::logic::model::{FaceEmbedder, FaceEmbedding, FaceLocator, InferenceError};
use crate::logic::signal::{ImageFrame, StudentId};
use crate::logic::storage::{image_digest, FaceReference, FaceReferenceStore};
use super::verdict::{SignalKind, Verdict};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceStatus {
    NoFace,
    MultipleFaces,
    Registered,
    Match,
    NoMatch,
}

impl FaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaceStatus::NoFace => "no_face",
            FaceStatus::MultipleFaces => "multiple_faces",
            FaceStatus::Registered => "registered",
            FaceStatus::Match => "match",
            FaceStatus::NoMatch => "no_match",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceVerdict {
    pub status: FaceStatus,
    /// Set only when a comparison actually ran
    pub distance: Option<f32>,
    pub faces_found: usize,
}

impl Verdict for FaceVerdict {
    fn signal_kind(&self) -> SignalKind {
        SignalKind::Face
    }

    fn status(&self) -> &'static str {
        self.status.as_str()
    }

    fn is_alert(&self, policy: &AlertPolicy) -> bool {
        match self.status {
            FaceStatus::NoMatch | FaceStatus::MultipleFaces => true,
            FaceStatus::NoFace => policy.alert_on_missing_face,
            FaceStatus::Registered | FaceStatus::Match => false,
        }
    }

    fn label(&self) -> String {
        match self.status {
            FaceStatus::NoFace => "No face detected",
            FaceStatus::MultipleFaces => "Multiple faces detected",
            FaceStatus::Registered => "Face registered",
            FaceStatus::Match => "Face verified",
            FaceStatus::NoMatch => "Face mismatch",
        }
        .to_string()
    }

    fn details(&self) -> serde_json::Value {
        json!({
            "status": self.status.as_str(),
            "distance": self.distance,
            "faces_found": self.faces_found,
        })
    }
}

/// Outcome of looking for exactly one face in a frame
#[derive(Debug, Clone)]
pub enum FaceExtraction {
    NoFace,
    Multiple(usize),
    Single(FaceEmbedding),
}

impl FaceExtraction {
    /// The single embedding, or the verdict explaining why there is none
    fn single(&self) -> Result<&FaceEmbedding, FaceVerdict> {
        match self {
            FaceExtraction::Single(embedding) => Ok(embedding),
            FaceExtraction::NoFace => Err(FaceVerdict {
                status: FaceStatus::NoFace,
                distance: None,
                faces_found: 0,
            }),
            FaceExtraction::Multiple(count) => Err(FaceVerdict {
                status: FaceStatus::MultipleFaces,
                distance: None,
                faces_found: *count,
            }),
        }
    }
}

// ============================================================================
// VERIFIER
// ============================================================================

pub struct FaceIdentityVerifier {
    locator: Arc<dyn FaceLocator>,
    embedder: Arc<dyn FaceEmbedder>,
    store: Arc<dyn FaceReferenceStore>,
    config: FaceMatchConfig,
}

impl FaceIdentityVerifier {
    pub fn new(
        locator: Arc<dyn FaceLocator>,
        embedder: Arc<dyn FaceEmbedder>,
        store: Arc<dyn FaceReferenceStore>,
        config: FaceMatchConfig,
    ) -> Self {
        Self { locator, embedder, store, config }
    }

    pub fn store(&self) -> &Arc<dyn FaceReferenceStore> {
        &self.store
    }

    /// Locate faces and embed the only one, if there is exactly one
    pub fn extract(&self, frame: &ImageFrame) -> ProctorResult<FaceExtraction> {
        let faces = self.locator.locate(frame)?;
        match faces.as_slice() {
            [] => Ok(FaceExtraction::NoFace),
            [face] => match self.embedder.embed(frame, face) {
                Ok(embedding) => Ok(FaceExtraction::Single(embedding)),
                // Flat region: nothing to identify
                Err(InferenceError::Featureless) => Ok(FaceExtraction::NoFace),
                Err(e) => Err(e.into()),
            },
            many => Ok(FaceExtraction::Multiple(many.len())),
        }
    }

    /// Stored reference, or `NotRegistered`
    pub async fn reference(&self, student_id: &StudentId) -> ProctorResult<FaceReference> {
        self.store
            .find(student_id)
            .await?
            .ok_or_else(|| ProctorError::NotRegistered(student_id.to_string()))
    }

    /// Persist a single-face extraction; anything else leaves the store untouched
    pub async fn register_extraction(
        &self,
        student_id: &StudentId,
        extraction: FaceExtraction,
        digest: String,
    ) -> ProctorResult<FaceVerdict> {
        let embedding = match extraction.single() {
            Ok(embedding) => embedding.clone(),
            Err(verdict) => {
                log::info!("Registration for {} rejected: {}", student_id, verdict.status.as_str());
                return Ok(verdict);
            }
        };

        let reference = FaceReference::new(student_id.clone(), embedding, self.embedder.name(), digest);
        self.store.upsert(reference).await?;
        log::info!("Registered face reference for {}", student_id);

        Ok(FaceVerdict {
            status: FaceStatus::Registered,
            distance: None,
            faces_found: 1,
        })
    }

    /// Match iff distance is strictly below `max_match_distance`
    pub fn compare(&self, reference: &FaceReference, extraction: &FaceExtraction) -> FaceVerdict {
        let embedding = match extraction.single() {
            Ok(embedding) => embedding,
            Err(verdict) => return verdict,
        };

        if reference.model != self.embedder.name() {
            log::warn!(
                "Reference for {} was built by '{}', comparing with '{}'",
                reference.student_id,
                reference.model,
                self.embedder.name()
            );
        }

        let distance = reference.embedding.distance(embedding);
        let status = if distance < self.config.max_match_distance {
            FaceStatus::Match
        } else {
            FaceStatus::NoMatch
        };
        log::debug!("Face check {}: distance={:.4} -> {}", reference.student_id, distance, status.as_str());

        FaceVerdict {
            status,
            // Infinite distance (embedding size mismatch) has no JSON form
            distance: distance.is_finite().then_some(distance),
            faces_found: 1,
        }
    }

    /// Digest covers the decoded pixels, so re-encoding the same photo audits equal
    pub async fn register(&self, student_id: &StudentId, frame: &ImageFrame) -> ProctorResult<FaceVerdict> {
        let extraction = self.extract(frame)?;
        self.register_extraction(student_id, extraction, image_digest(frame.pixels())).await
    }

    pub async fn verify(&self, student_id: &StudentId, frame: &ImageFrame) -> ProctorResult<FaceVerdict> {
        let reference = self.reference(student_id).await?;
        let extraction = self.extract(frame)?;
        Ok(self.compare(&reference, &extraction))
    }

    pub async fn registered_students(&self) -> ProctorResult<Vec<StudentId>> {
        self.store.list_ids().await
    }
}
