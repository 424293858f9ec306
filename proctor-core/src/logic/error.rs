//! Error taxonomy
//!
//! Every failure that leaves the core is one of four kinds. Callers can
//! always tell "could not analyze" apart from "analyzed and clear".

use thiserror::Error;

use super::model::InferenceError;

pub type ProctorResult<T> = Result<T, ProctorError>;

#[derive(Debug, Error)]
pub enum ProctorError {
    /// Missing or malformed required field. Client error, never journaled.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Payload could not be decoded or analyzed.
    #[error("could not analyze input: {0}")]
    Decode(String),

    /// Verification attempted before any registration.
    #[error("no face reference registered for {0}")]
    NotRegistered(String),

    /// Backing store unavailable or failed. Not retried internally.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ProctorError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            ProctorError::InvalidInput(_) => "invalid_input",
            ProctorError::Decode(_) => "decode_error",
            ProctorError::NotRegistered(_) => "not_registered",
            ProctorError::Storage(_) => "storage_error",
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ProctorError::InvalidInput(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        ProctorError::Storage(msg.into())
    }
}

impl From<InferenceError> for ProctorError {
    fn from(err: InferenceError) -> Self {
        ProctorError::Decode(err.to_string())
    }
}

impl From<image::ImageError> for ProctorError {
    fn from(err: image::ImageError) -> Self {
        ProctorError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ProctorError {
    fn from(err: std::io::Error) -> Self {
        ProctorError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ProctorError {
    fn from(err: tokio::task::JoinError) -> Self {
        ProctorError::Decode(format!("analysis task failed: {}", err))
    }
}
