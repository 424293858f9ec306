//! Signal Module
//!
//! Canonical detector inputs and the normalizer that builds them from raw
//! uploads.

pub mod types;
pub mod normalizer;

pub use types::{
    AudioFeatureSet, ImageFrame, Observation, RawAlertSubmission, RawAudioFeatures,
    RawAudioSubmission, Signal, StudentId,
};
pub use normalizer::SignalNormalizer;
