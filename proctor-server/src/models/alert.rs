//! Alert model

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proctor_core::{AlertEntry, AlertFilter, AlertJournal, ProctorError, ProctorResult, SignalKind, StudentId};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

/// Alert as served to the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: Uuid,
    pub student_id: String,
    pub signal_kind: SignalKind,
    pub status: String,
    pub direction: String,
    pub details: serde_json::Value,
    pub alert_time: DateTime<Utc>,
}

impl From<AlertEntry> for AlertRecord {
    fn from(entry: AlertEntry) -> Self {
        Self {
            id: entry.id,
            student_id: entry.student_id.into_inner(),
            signal_kind: entry.signal_kind,
            status: entry.verdict_status,
            direction: entry.direction,
            details: entry.details,
            alert_time: entry.alert_time,
        }
    }
}

/// `POST /log-alert` body. Fields are optional here so a missing one is a
/// 400 from validation rather than a deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LogAlertRequest {
    #[validate(required, length(min = 1, max = 128))]
    pub student_id: Option<String>,
    #[validate(required, length(min = 1, max = 500))]
    pub direction: Option<String>,
    #[validate(required, length(min = 1))]
    pub time: Option<String>,
    pub signal_kind: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl From<LogAlertRequest> for proctor_core::RawAlertSubmission {
    fn from(req: LogAlertRequest) -> Self {
        Self {
            student_id: req.student_id,
            direction: req.direction,
            time: req.time,
            signal_kind: req.signal_kind,
            details: req.details,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct AlertQuery {
    pub student_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<usize>,
}

// ============================================================================
// POSTGRES JOURNAL
// ============================================================================

#[derive(Debug, FromRow)]
struct AlertRow {
    id: Uuid,
    student_id: String,
    signal_kind: String,
    verdict_status: String,
    direction: String,
    details: serde_json::Value,
    alert_time: DateTime<Utc>,
}

impl TryFrom<AlertRow> for AlertEntry {
    type Error = ProctorError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(AlertEntry {
            id: row.id,
            student_id: StudentId::parse(&row.student_id)
                .map_err(|e| ProctorError::storage(format!("alert {} has bad student id: {}", row.id, e)))?,
            signal_kind: row
                .signal_kind
                .parse()
                .map_err(|e| ProctorError::storage(format!("alert {}: {}", row.id, e)))?,
            verdict_status: row.verdict_status,
            direction: row.direction,
            details: row.details,
            alert_time: row.alert_time,
        })
    }
}

pub(crate) fn storage_error(err: sqlx::Error) -> ProctorError {
    ProctorError::storage(err.to_string())
}

/// Ordered by `seq`, the insertion sequence
pub struct PgAlertJournal {
    pool: PgPool,
}

impl PgAlertJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertJournal for PgAlertJournal {
    async fn append(&self, entry: AlertEntry) -> ProctorResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (id, student_id, signal_kind, verdict_status, direction, details, alert_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#
        )
        .bind(entry.id)
        .bind(entry.student_id.as_str())
        .bind(entry.signal_kind.as_str())
        .bind(&entry.verdict_status)
        .bind(&entry.direction)
        .bind(&entry.details)
        .bind(entry.alert_time)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn list(&self, filter: &AlertFilter) -> ProctorResult<Vec<AlertEntry>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT id, student_id, signal_kind, verdict_status, direction, details, alert_time
            FROM alerts
            WHERE ($1::text IS NULL OR student_id = $1)
              AND ($2::timestamptz IS NULL OR alert_time >= $2)
              AND ($3::timestamptz IS NULL OR alert_time < $3)
            ORDER BY seq DESC
            LIMIT $4
            "#
        )
        .bind(filter.student_id.as_ref().map(|id| id.as_str()))
        .bind(filter.from)
        .bind(filter.to)
        .bind(limit_param(filter.limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(AlertEntry::try_from).collect()
    }

    async fn ping(&self) -> ProctorResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

/// `LIMIT` bind value; anything past `i64::MAX` is as good as no limit
fn limit_param(limit: Option<usize>) -> Option<i64> {
    limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX))
}
