//! Alert handlers

use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Query, State},
    Json,
};
use proctor_core::{AlertFilter, RawAlertSubmission};
use serde_json::{json, Value};
use validator::Validate;

use crate::models::{AlertQuery, AlertRecord, LogAlertRequest};
use crate::{AppResult, AppState};

/// Client-reported alert
pub async fn log_alert(
    State(state): State<AppState>,
    payload: Result<Json<LogAlertRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(req) = payload?;
    req.validate()?;

    let entry = state.orchestrator.log_alert(&RawAlertSubmission::from(req)).await?;
    tracing::info!("Alert logged for {}: {}", entry.student_id, entry.direction);

    Ok(Json(json!({ "status": "ok" })))
}

/// Journaled alerts, newest first
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<AlertQuery>, QueryRejection>,
) -> AppResult<Json<Vec<AlertRecord>>> {
    let Query(query) = query?;
    let normalizer = state.orchestrator.normalizer();

    let filter = AlertFilter {
        student_id: normalizer.optional_student_id(query.student_id.as_deref())?,
        from: query.from.as_deref().map(|t| normalizer.timestamp(Some(t))).transpose()?,
        to: query.to.as_deref().map(|t| normalizer.timestamp(Some(t))).transpose()?,
        limit: query.limit,
    };

    let alerts = state.orchestrator.alerts(&filter).await?;
    Ok(Json(alerts.into_iter().map(AlertRecord::from).collect()))
}
