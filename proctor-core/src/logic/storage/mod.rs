//! Storage Module - Face References & Alert Journal
//!
//! Async traits so the server can swap in database-backed stores.
//! - `faces`: `FaceReferenceStore` + sharded in-memory store
//! - `journal`: `AlertJournal`, `AlertEntry`, `AlertFilter` + in-memory journal
//! - `jsonl`: file-backed journal

pub mod faces;
pub mod journal;
pub mod jsonl;

// Re-export common types
pub use faces::{image_digest, FaceReference, FaceReferenceStore, MemoryFaceStore};
pub use journal::{AlertEntry, AlertFilter, AlertJournal, MemoryAlertJournal};
pub use jsonl::JsonlAlertJournal;
