//! Logic Module - Detection Pipeline
//!
//! ## Layout
//! - `signal/` - Raw input -> validated observations
//! - `model/` - Vision providers (ONNX + fallback heuristics)
//! - `detectors/` - Head pose, face identity, objects, audio
//! - `storage/` - Face references & alert journal
//! - `orchestrator` - Dispatch, alert policy, journaling

pub mod config;
pub mod error;

pub mod signal;
pub mod model;
pub mod detectors;
pub mod storage;
pub mod orchestrator;
