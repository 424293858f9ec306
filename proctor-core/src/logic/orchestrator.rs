//! Proctoring Orchestrator
//!
//! Receive -> Normalize -> Dispatch -> Evaluate -> (alerting) Append -> Respond.
//!
//! Image decoding and model inference run on the blocking pool. The journal
//! is written only once a verdict is complete, so a dropped request never
//! leaves a partial alert behind. Failures are returned, never retried.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::DetectionConfig;
use super::detectors::{
    AudioAnomalyDetector, AudioVerdict, DetectionVerdict, FaceIdentityVerifier, FaceVerdict,
    ForbiddenObjectDetector, HeadPoseDetector, HeadPoseVerdict, ObjectVerdict, SignalKind, Verdict,
};
use super::error::{ProctorError, ProctorResult};
use super::model::ProviderSet;
use super::signal::{
    AudioFeatureSet, ImageFrame, Observation, RawAlertSubmission, RawAudioSubmission, Signal, SignalNormalizer,
    StudentId,
};
use super::storage::{
    image_digest, AlertEntry, AlertFilter, AlertJournal, FaceReferenceStore, MemoryAlertJournal, MemoryFaceStore,
};

/// Status recorded for alerts the client raised itself
pub const CLIENT_REPORTED_STATUS: &str = "client_reported";

/// Which analysis an observation is submitted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    HeadPose,
    FaceVerify,
    FaceRegister,
    Objects,
    Audio,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::HeadPose => "head_pose",
            CheckKind::FaceVerify => "face_verify",
            CheckKind::FaceRegister => "face_register",
            CheckKind::Objects => "objects",
            CheckKind::Audio => "audio",
        }
    }
}

/// Run CPU-bound work off the async workers
async fn blocking<T, F>(work: F) -> ProctorResult<T>
where
    F: FnOnce() -> ProctorResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

pub struct ProctoringOrchestrator {
    config: DetectionConfig,
    providers: ProviderSet,
    normalizer: SignalNormalizer,
    head_pose: Arc<HeadPoseDetector>,
    faces: Arc<FaceIdentityVerifier>,
    objects: Arc<ForbiddenObjectDetector>,
    audio: AudioAnomalyDetector,
    journal: Arc<dyn AlertJournal>,
}

impl ProctoringOrchestrator {
    pub fn new(
        config: DetectionConfig,
        providers: ProviderSet,
        face_store: Arc<dyn FaceReferenceStore>,
        journal: Arc<dyn AlertJournal>,
    ) -> ProctorResult<Self> {
        config.validate()?;

        let head_pose = HeadPoseDetector::new(
            providers.face_locator.clone(),
            providers.pose_estimator.clone(),
            config.head_pose.clone(),
        );
        let faces = FaceIdentityVerifier::new(
            providers.face_locator.clone(),
            providers.face_embedder.clone(),
            face_store,
            config.face.clone(),
        );
        let objects = ForbiddenObjectDetector::new(providers.object_locator.clone(), &config.objects);

        Ok(Self {
            normalizer: SignalNormalizer::new(config.limits.clone()),
            audio: AudioAnomalyDetector::new(config.audio.clone()),
            head_pose: Arc::new(head_pose),
            faces: Arc::new(faces),
            objects: Arc::new(objects),
            providers,
            journal,
            config,
        })
    }

    /// Providers from `config.models`, memory-backed stores
    pub fn in_memory(config: DetectionConfig) -> ProctorResult<Self> {
        let providers = ProviderSet::from_config(&config.models, &config.objects.person_label);
        Self::new(
            config,
            providers,
            Arc::new(MemoryFaceStore::new()),
            Arc::new(MemoryAlertJournal::new()),
        )
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn normalizer(&self) -> &SignalNormalizer {
        &self.normalizer
    }

    // ------------------------------------------------------------------------
    // Generic dispatch
    // ------------------------------------------------------------------------

    pub async fn process(&self, check: CheckKind, observation: Observation) -> ProctorResult<DetectionVerdict> {
        let Observation { student_id, timestamp, signal } = observation;
        log::debug!("Processing {} ({} signal) for {}", check.as_str(), signal.kind(), student_id);

        let verdict = match (check, signal) {
            (CheckKind::HeadPose, Signal::Image(frame)) => DetectionVerdict::HeadPose(self.run_head_pose(frame).await?),
            (CheckKind::Objects, Signal::Image(frame)) => DetectionVerdict::Objects(self.run_objects(frame).await?),
            (CheckKind::FaceVerify, Signal::Image(frame)) => {
                DetectionVerdict::Face(self.run_face_verify(&student_id, frame).await?)
            }
            (CheckKind::FaceRegister, Signal::Image(frame)) => {
                // Registration outcomes are answers to the caller, never alerts
                return Ok(DetectionVerdict::Face(self.run_face_register(&student_id, frame).await?));
            }
            (CheckKind::Audio, Signal::Audio(features)) => DetectionVerdict::Audio(self.run_audio(&features)),
            (check, signal) => {
                return Err(ProctorError::invalid(format!(
                    "{} check cannot take a {} signal",
                    check.as_str(),
                    signal.kind()
                )));
            }
        };

        self.journal_if_alert(Some(&student_id), &verdict, timestamp).await?;
        Ok(verdict)
    }

    // ------------------------------------------------------------------------
    // Boundary conveniences
    // ------------------------------------------------------------------------

    /// Anonymous calls (no student id) are analyzed but never journaled
    pub async fn analyze_head(&self, student_id: Option<&str>, image: Vec<u8>) -> ProctorResult<HeadPoseVerdict> {
        let student_id = self.normalizer.optional_student_id(student_id)?;
        let frame = self.decode(image).await?;
        let verdict = self.run_head_pose(frame).await?;
        self.journal_if_alert(student_id.as_ref(), &verdict, Utc::now()).await?;
        Ok(verdict)
    }

    pub async fn detect_objects(&self, student_id: Option<&str>, image: Vec<u8>) -> ProctorResult<ObjectVerdict> {
        let student_id = self.normalizer.optional_student_id(student_id)?;
        let frame = self.decode(image).await?;
        let verdict = self.run_objects(frame).await?;
        self.journal_if_alert(student_id.as_ref(), &verdict, Utc::now()).await?;
        Ok(verdict)
    }

    /// `NotRegistered` when the roll number has no reference
    pub async fn verify_face(&self, roll_number: Option<&str>, image: Vec<u8>) -> ProctorResult<FaceVerdict> {
        let student_id = self.normalizer.student_id(roll_number)?;
        let frame = self.decode(image).await?;
        let verdict = self.run_face_verify(&student_id, frame).await?;
        self.journal_if_alert(Some(&student_id), &verdict, Utc::now()).await?;
        Ok(verdict)
    }

    pub async fn register_face(&self, roll_number: Option<&str>, image: Vec<u8>) -> ProctorResult<FaceVerdict> {
        let student_id = self.normalizer.student_id(roll_number)?;
        let frame = self.decode(image).await?;
        self.run_face_register(&student_id, frame).await
    }

    pub async fn analyze_audio(&self, submission: &RawAudioSubmission) -> ProctorResult<AudioVerdict> {
        let (student_id, features) = self.normalizer.audio_from_payload(submission)?;
        let observation = Observation::new(student_id, Signal::Audio(features));
        match self.process(CheckKind::Audio, observation).await? {
            DetectionVerdict::Audio(verdict) => Ok(verdict),
            other => Err(ProctorError::Decode(format!("audio check produced a {} verdict", other.signal_kind()))),
        }
    }

    /// Client-side alert. Every field is validated before anything is written.
    pub async fn log_alert(&self, submission: &RawAlertSubmission) -> ProctorResult<AlertEntry> {
        let student_id = self.normalizer.student_id(submission.student_id.as_deref())?;
        let direction = submission
            .direction
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ProctorError::invalid("direction is required"))?;
        let alert_time = self.normalizer.timestamp(submission.time.as_deref())?;
        let signal_kind = match submission.signal_kind.as_deref().map(str::trim) {
            None | Some("") => SignalKind::Head,
            Some(raw) => raw.parse::<SignalKind>().map_err(ProctorError::invalid)?,
        };
        let details = submission.details.clone().unwrap_or_else(|| serde_json::json!({}));

        let entry = AlertEntry::new(student_id, signal_kind, CLIENT_REPORTED_STATUS, direction, details, alert_time);
        self.journal.append(entry.clone()).await?;
        log::info!("Client alert for {}: {}", entry.student_id, entry.direction);
        Ok(entry)
    }

    pub async fn alerts(&self, filter: &AlertFilter) -> ProctorResult<Vec<AlertEntry>> {
        self.journal.list(filter).await
    }

    pub async fn registered_faces(&self) -> ProctorResult<Vec<StudentId>> {
        self.faces.registered_students().await
    }

    /// Both stores reachable
    pub async fn store_health(&self) -> ProctorResult<()> {
        self.journal.ping().await?;
        self.faces.store().ping().await
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn decode(&self, image: Vec<u8>) -> ProctorResult<ImageFrame> {
        let normalizer = self.normalizer.clone();
        blocking(move || normalizer.image_from_bytes(&image)).await
    }

    async fn run_head_pose(&self, frame: ImageFrame) -> ProctorResult<HeadPoseVerdict> {
        let detector = self.head_pose.clone();
        blocking(move || detector.detect(&frame)).await
    }

    async fn run_objects(&self, frame: ImageFrame) -> ProctorResult<ObjectVerdict> {
        let detector = self.objects.clone();
        blocking(move || detector.detect(&frame)).await
    }

    async fn run_face_verify(&self, student_id: &StudentId, frame: ImageFrame) -> ProctorResult<FaceVerdict> {
        let reference = self.faces.reference(student_id).await?;
        let verifier = self.faces.clone();
        let extraction = blocking(move || verifier.extract(&frame)).await?;
        Ok(self.faces.compare(&reference, &extraction))
    }

    async fn run_face_register(&self, student_id: &StudentId, frame: ImageFrame) -> ProctorResult<FaceVerdict> {
        let verifier = self.faces.clone();
        let (extraction, digest) = blocking(move || {
            let extraction = verifier.extract(&frame)?;
            Ok((extraction, image_digest(frame.pixels())))
        })
        .await?;
        self.faces.register_extraction(student_id, extraction, digest).await
    }

    fn run_audio(&self, features: &AudioFeatureSet) -> AudioVerdict {
        self.audio.detect(features)
    }

    async fn journal_if_alert<V: Verdict + ?Sized>(
        &self,
        student_id: Option<&StudentId>,
        verdict: &V,
        at: DateTime<Utc>,
    ) -> ProctorResult<()> {
        let Some(student_id) = student_id else {
            return Ok(());
        };
        if !verdict.is_alert(&self.config.alerts) {
            return Ok(());
        }

        let entry = AlertEntry::new(
            student_id.clone(),
            verdict.signal_kind(),
            verdict.status(),
            verdict.label(),
            verdict.details(),
            at,
        );
        self.journal.append(entry).await?;
        log::info!("Alert for {}: {} ({})", student_id, verdict.label(), verdict.signal_kind());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::detectors::{AudioStatus, FaceStatus, GazeDirection, ObjectStatus};
    use crate::logic::model::fixtures::{blank_frame, encode_png, face_frame, FaceSpec, BACKGROUND};
    use crate::logic::signal::RawAudioFeatures;
    use serde_json::json;

    fn orchestrator() -> (ProctoringOrchestrator, Arc<MemoryAlertJournal>) {
        let journal = Arc::new(MemoryAlertJournal::new());
        let orchestrator = ProctoringOrchestrator::new(
            DetectionConfig::default(),
            ProviderSet::fallback("person"),
            Arc::new(MemoryFaceStore::new()),
            journal.clone(),
        )
        .unwrap();
        (orchestrator, journal)
    }

    fn audio(student: &str, volume: f64) -> RawAudioSubmission {
        RawAudioSubmission {
            student_id: Some(student.to_string()),
            audio_features: Some(RawAudioFeatures {
                volume_level: Some(volume),
                frequency_data: Some(vec![0.1, 0.2, 0.1]),
                duration: Some(1.0),
            }),
        }
    }

    fn face_png() -> Vec<u8> {
        encode_png(&face_frame(320, 240, &[FaceSpec::centered(160, 120)]))
    }

    #[tokio::test]
    async fn test_audio_scenario_end_to_end() {
        let (orchestrator, _) = orchestrator();

        let quiet = orchestrator.analyze_audio(&audio("TEST001", 0.3)).await.unwrap();
        assert_eq!(quiet.status, AudioStatus::Clear);

        let loud = orchestrator.analyze_audio(&audio("TEST001", 0.6)).await.unwrap();
        assert_eq!(loud.status, AudioStatus::AnomalyDetected);
        assert_eq!(loud.volume_level, Some(0.6));

        let alerts = orchestrator
            .alerts(&AlertFilter::for_student(StudentId::parse("TEST001").unwrap()))
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].signal_kind, SignalKind::Audio);
        assert_eq!(alerts[0].verdict_status, "anomaly_detected");
        assert_eq!(alerts[0].details["volume_level"], json!(0.6));
        assert_eq!(alerts[0].details["anomalies"], json!(["volume"]));
    }

    #[tokio::test]
    async fn test_log_alert_missing_direction_appends_nothing() {
        let (orchestrator, journal) = orchestrator();
        let submission = RawAlertSubmission {
            student_id: Some("TEST001".into()),
            direction: None,
            time: Some("2024-01-01T12:00:00".into()),
            ..Default::default()
        };
        let err = orchestrator.log_alert(&submission).await.unwrap_err();
        assert!(matches!(err, ProctorError::InvalidInput(_)));
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn test_log_alert_bad_time_or_kind_rejected() {
        let (orchestrator, journal) = orchestrator();
        let base = RawAlertSubmission {
            student_id: Some("TEST001".into()),
            direction: Some("Looking Left".into()),
            time: Some("2024-01-01T12:00:00".into()),
            ..Default::default()
        };
        let bad_time = RawAlertSubmission { time: Some("noon".into()), ..base.clone() };
        let bad_kind = RawAlertSubmission { signal_kind: Some("smell".into()), ..base.clone() };
        assert!(orchestrator.log_alert(&bad_time).await.is_err());
        assert!(orchestrator.log_alert(&bad_kind).await.is_err());
        assert!(journal.is_empty());

        let entry = orchestrator.log_alert(&base).await.unwrap();
        assert_eq!(entry.direction, "Looking Left");
        assert_eq!(entry.signal_kind, SignalKind::Head);
        assert_eq!(entry.verdict_status, CLIENT_REPORTED_STATUS);
        assert_eq!(journal.len(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_head_analysis_not_journaled() {
        let (orchestrator, journal) = orchestrator();
        let blank = encode_png(&blank_frame(160, 120, BACKGROUND));

        let verdict = orchestrator.analyze_head(None, blank.clone()).await.unwrap();
        assert_eq!(verdict, HeadPoseVerdict::NoFace);
        assert!(journal.is_empty());

        orchestrator.analyze_head(Some("TEST001"), blank).await.unwrap();
        let alerts = orchestrator.alerts(&AlertFilter::default()).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].direction, "No face detected");
    }

    #[tokio::test]
    async fn test_centered_head_is_not_an_alert() {
        let (orchestrator, journal) = orchestrator();
        let verdict = orchestrator.analyze_head(Some("TEST001"), face_png()).await.unwrap();
        assert_eq!(verdict.direction(), Some(GazeDirection::Center));
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_image_is_decode_error_without_alert() {
        let (orchestrator, journal) = orchestrator();
        let err = orchestrator
            .analyze_head(Some("TEST001"), b"not an image".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ProctorError::Decode(_)));
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn test_register_verify_flow() {
        let (orchestrator, journal) = orchestrator();

        let err = orchestrator.verify_face(Some("TEST001"), face_png()).await.unwrap_err();
        assert!(matches!(err, ProctorError::NotRegistered(_)));

        let blank = encode_png(&blank_frame(320, 240, BACKGROUND));
        let verdict = orchestrator.register_face(Some("TEST001"), blank).await.unwrap();
        assert_eq!(verdict.status, FaceStatus::NoFace);
        assert!(orchestrator.registered_faces().await.unwrap().is_empty());

        let verdict = orchestrator.register_face(Some("TEST001"), face_png()).await.unwrap();
        assert_eq!(verdict.status, FaceStatus::Registered);

        let verdict = orchestrator.verify_face(Some("TEST001"), face_png()).await.unwrap();
        assert_eq!(verdict.status, FaceStatus::Match);

        let stranger = encode_png(&face_frame(320, 240, &[FaceSpec::centered(160, 120).with_stripe()]));
        let verdict = orchestrator.verify_face(Some("TEST001"), stranger).await.unwrap();
        assert_eq!(verdict.status, FaceStatus::NoMatch);

        // Only the mismatch is an alert; the failed registration is not
        let alerts = orchestrator.alerts(&AlertFilter::default()).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].verdict_status, "no_match");
        assert_eq!(journal.len(), 1);
    }

    #[tokio::test]
    async fn test_second_person_flagged() {
        let (orchestrator, _) = orchestrator();
        let two = encode_png(&face_frame(480, 240, &[FaceSpec::centered(110, 120), FaceSpec::centered(370, 120)]));
        let verdict = orchestrator.detect_objects(Some("TEST001"), two).await.unwrap();
        assert_eq!(verdict.status, ObjectStatus::ForbiddenObject);

        let alerts = orchestrator.alerts(&AlertFilter::default()).await.unwrap();
        assert_eq!(alerts[0].signal_kind, SignalKind::Object);
    }

    #[tokio::test]
    async fn test_check_signal_mismatch_rejected() {
        let (orchestrator, journal) = orchestrator();
        let features = AudioFeatureSet {
            volume_level: Some(0.9),
            frequency_data: None,
            duration: None,
        };
        let observation = Observation::new(StudentId::parse("TEST001").unwrap(), Signal::Audio(features));
        let err = orchestrator.process(CheckKind::HeadPose, observation).await.unwrap_err();
        assert!(matches!(err, ProctorError::InvalidInput(_)));
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn test_process_register_never_alerts() {
        let (orchestrator, journal) = orchestrator();
        let observation = Observation::new(
            StudentId::parse("TEST001").unwrap(),
            Signal::Image(blank_frame(160, 120, BACKGROUND)),
        );
        let verdict = orchestrator.process(CheckKind::FaceRegister, observation).await.unwrap();
        assert_eq!(verdict.status(), "no_face");
        assert!(journal.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_all_land() {
        let (orchestrator, _) = orchestrator();
        let orchestrator = Arc::new(orchestrator);
        let image = face_png();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let orchestrator = orchestrator.clone();
                let image = image.clone();
                tokio::spawn(async move {
                    let roll = format!("ROLL{:02}", i);
                    orchestrator.register_face(Some(&roll), image).await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().status, FaceStatus::Registered);
        }
        assert_eq!(orchestrator.registered_faces().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_store_health() {
        let (orchestrator, _) = orchestrator();
        assert!(orchestrator.store_health().await.is_ok());
    }
}
