//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Several statements: needs the simple query protocol
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Reference embeddings, one per student
CREATE TABLE IF NOT EXISTS face_references (
    student_id VARCHAR(128) PRIMARY KEY,
    embedding REAL[] NOT NULL,
    model VARCHAR(100) NOT NULL,
    image_digest VARCHAR(64) NOT NULL,
    registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Alert journal; seq gives append order
CREATE TABLE IF NOT EXISTS alerts (
    seq BIGSERIAL PRIMARY KEY,
    id UUID NOT NULL UNIQUE,
    student_id VARCHAR(128) NOT NULL,
    signal_kind VARCHAR(16) NOT NULL,
    verdict_status VARCHAR(32) NOT NULL,
    direction TEXT NOT NULL,
    details JSONB NOT NULL DEFAULT '{}'::jsonb,
    alert_time TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ DEFAULT NOW()
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_alerts_student ON alerts(student_id, seq DESC);
CREATE INDEX IF NOT EXISTS idx_alerts_time ON alerts(alert_time);
"#;
