//! Exam Proctor Core
//!
//! Turns webcam frames and microphone features into verdicts, and journals
//! the verdicts that warrant an invigilator's attention.
//!
//! ```no_run
//! # async fn demo(png: Vec<u8>) -> proctor_core::ProctorResult<()> {
//! use proctor_core::{DetectionConfig, ProctoringOrchestrator};
//!
//! let orchestrator = ProctoringOrchestrator::in_memory(DetectionConfig::from_env()?)?;
//! let verdict = orchestrator.analyze_head(Some("TEST001"), png).await?;
//! println!("{:?}", verdict.direction());
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod logic;

pub use logic::config::DetectionConfig;
pub use logic::detectors::{
    AudioStatus, AudioVerdict, DetectionVerdict, FaceStatus, FaceVerdict, GazeDirection, HeadPoseVerdict,
    ObjectStatus, ObjectVerdict, SignalKind, Verdict,
};
pub use logic::error::{ProctorError, ProctorResult};
pub use logic::model::ProviderSet;
pub use logic::orchestrator::{CheckKind, ProctoringOrchestrator};
pub use logic::signal::{Observation, RawAlertSubmission, RawAudioSubmission, Signal, StudentId};
pub use logic::storage::{
    AlertEntry, AlertFilter, AlertJournal, FaceReference, FaceReferenceStore, JsonlAlertJournal,
    MemoryAlertJournal, MemoryFaceStore,
};
