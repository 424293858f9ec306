//! Face reference model

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proctor_core::logic::model::FaceEmbedding;
use proctor_core::{FaceReference, FaceReferenceStore, ProctorError, ProctorResult, StudentId};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use super::alert::storage_error;

#[derive(Debug, Serialize)]
pub struct RegisteredFacesResponse {
    pub registered_faces: Vec<String>,
}

#[derive(Debug, FromRow)]
struct FaceRow {
    student_id: String,
    embedding: Vec<f32>,
    model: String,
    image_digest: String,
    registered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FaceRow> for FaceReference {
    type Error = ProctorError;

    fn try_from(row: FaceRow) -> Result<Self, Self::Error> {
        let student_id = StudentId::parse(&row.student_id)
            .map_err(|e| ProctorError::storage(format!("bad face reference id: {}", e)))?;
        let embedding = FaceEmbedding::from_raw(row.embedding)
            .map_err(|e| ProctorError::storage(format!("face reference {}: {}", student_id, e)))?;
        Ok(FaceReference {
            student_id,
            embedding,
            model: row.model,
            image_digest: row.image_digest,
            registered_at: row.registered_at,
            updated_at: row.updated_at,
        })
    }
}

/// Upserts are a single `INSERT .. ON CONFLICT`, atomic per student
pub struct PgFaceStore {
    pool: PgPool,
}

impl PgFaceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FaceReferenceStore for PgFaceStore {
    async fn upsert(&self, reference: FaceReference) -> ProctorResult<FaceReference> {
        let row = sqlx::query_as::<_, FaceRow>(
            r#"
            INSERT INTO face_references (student_id, embedding, model, image_digest, registered_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (student_id) DO UPDATE SET
                embedding = EXCLUDED.embedding,
                model = EXCLUDED.model,
                image_digest = EXCLUDED.image_digest,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#
        )
        .bind(reference.student_id.as_str())
        .bind(reference.embedding.as_slice())
        .bind(&reference.model)
        .bind(&reference.image_digest)
        .bind(reference.registered_at)
        .bind(reference.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        row.try_into()
    }

    async fn find(&self, student_id: &StudentId) -> ProctorResult<Option<FaceReference>> {
        let row = sqlx::query_as::<_, FaceRow>("SELECT * FROM face_references WHERE student_id = $1")
            .bind(student_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(FaceReference::try_from).transpose()
    }

    async fn list_ids(&self) -> ProctorResult<Vec<StudentId>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT student_id FROM face_references ORDER BY student_id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        ids.iter().map(|id| StudentId::parse(id)).collect()
    }

    async fn ping(&self) -> ProctorResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
