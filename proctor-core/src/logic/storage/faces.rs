//! Face Reference Store
//!
//! One reference embedding per student. Upserts are atomic per id;
//! re-registration keeps the original `registered_at`.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::FACE_STORE_SHARDS;
use crate::logic::error::ProctorResult;
use crate::logic::model::FaceEmbedding;
use crate::logic::signal::StudentId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceReference {
    pub student_id: StudentId,
    pub embedding: FaceEmbedding,
    /// Embedder that produced `embedding`
    pub model: String,
    /// SHA-256 (hex) of the registration image, for audit
    pub image_digest: String,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FaceReference {
    pub fn new(student_id: StudentId, embedding: FaceEmbedding, model: &str, image_digest: String) -> Self {
        let now = Utc::now();
        Self {
            student_id,
            embedding,
            model: model.to_string(),
            image_digest,
            registered_at: now,
            updated_at: now,
        }
    }
}

pub fn image_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
pub trait FaceReferenceStore: Send + Sync {
    /// Insert or replace; returns the stored reference
    async fn upsert(&self, reference: FaceReference) -> ProctorResult<FaceReference>;

    async fn find(&self, student_id: &StudentId) -> ProctorResult<Option<FaceReference>>;

    /// Registered ids, sorted
    async fn list_ids(&self) -> ProctorResult<Vec<StudentId>>;

    async fn ping(&self) -> ProctorResult<()> {
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Sharded by id hash so registrations for different students rarely share a lock
pub struct MemoryFaceStore {
    shards: Vec<RwLock<HashMap<StudentId, FaceReference>>>,
}

impl Default for MemoryFaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFaceStore {
    pub fn new() -> Self {
        Self {
            shards: (0..FACE_STORE_SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, student_id: &StudentId) -> &RwLock<HashMap<StudentId, FaceReference>> {
        let mut hasher = DefaultHasher::new();
        student_id.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % self.shards.len()]
    }
}

#[async_trait]
impl FaceReferenceStore for MemoryFaceStore {
    async fn upsert(&self, mut reference: FaceReference) -> ProctorResult<FaceReference> {
        let mut shard = self.shard(&reference.student_id).write();
        if let Some(existing) = shard.get(&reference.student_id) {
            reference.registered_at = existing.registered_at;
        }
        shard.insert(reference.student_id.clone(), reference.clone());
        Ok(reference)
    }

    async fn find(&self, student_id: &StudentId) -> ProctorResult<Option<FaceReference>> {
        Ok(self.shard(student_id).read().get(student_id).cloned())
    }

    async fn list_ids(&self) -> ProctorResult<Vec<StudentId>> {
        let mut ids: Vec<StudentId> = self
            .shards
            .iter()
            .flat_map(|shard| shard.read().keys().cloned().collect::<Vec<_>>())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(id: &str, values: Vec<f32>) -> FaceReference {
        FaceReference::new(
            StudentId::parse(id).unwrap(),
            FaceEmbedding::from_raw(values).unwrap(),
            "test",
            image_digest(id.as_bytes()),
        )
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let store = MemoryFaceStore::new();
        let id = StudentId::parse("S1").unwrap();
        assert!(store.find(&id).await.unwrap().is_none());

        store.upsert(reference("S1", vec![1.0, 0.0])).await.unwrap();
        let found = store.find(&id).await.unwrap().unwrap();
        assert_eq!(found.embedding.as_slice(), &[1.0, 0.0]);
        assert_eq!(found.image_digest.len(), 64);
    }

    #[tokio::test]
    async fn test_reregistration_overwrites_but_keeps_registered_at() {
        let store = MemoryFaceStore::new();
        let first = store.upsert(reference("S1", vec![1.0, 0.0])).await.unwrap();
        let second = store.upsert(reference("S1", vec![0.0, 1.0])).await.unwrap();

        assert_eq!(second.registered_at, first.registered_at);
        assert!(second.updated_at >= first.updated_at);
        let found = store.find(&first.student_id).await.unwrap().unwrap();
        assert_eq!(found.embedding.as_slice(), &[0.0, 1.0]);
        assert_eq!(store.list_ids().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_ids_sorted_across_shards() {
        let store = MemoryFaceStore::new();
        for id in ["S9", "S1", "S5", "A0"] {
            store.upsert(reference(id, vec![1.0])).await.unwrap();
        }
        let ids: Vec<String> = store.list_ids().await.unwrap().into_iter().map(String::from).collect();
        assert_eq!(ids, vec!["A0", "S1", "S5", "S9"]);
    }
}
