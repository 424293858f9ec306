//! Detection handlers: head pose, objects, audio

use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection, Multipart, State},
    Json,
};
use proctor_core::{AudioStatus, ObjectStatus, RawAudioSubmission, Verdict};
use serde_json::{json, Map, Value};

use super::UploadForm;
use crate::{AppResult, AppState};

pub async fn detect_head(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<Value>> {
    let mut form = UploadForm::read(multipart?).await?;
    let image = form.take_image()?;

    let verdict = state.orchestrator.analyze_head(form.field("student_id"), image).await?;
    let angles = verdict.angles();

    Ok(Json(json!({
        "status": verdict.status(),
        "direction": verdict.label(),
        "yaw": angles.map(|a| a.yaw),
        "pitch": angles.map(|a| a.pitch),
        "roll": angles.map(|a| a.roll),
    })))
}

pub async fn detect_object(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<Value>> {
    let mut form = UploadForm::read(multipart?).await?;
    let image = form.take_image()?;

    let verdict = state.orchestrator.detect_objects(form.field("student_id"), image).await?;

    let mut body = Map::new();
    body.insert("status".into(), json!(verdict.status()));
    if verdict.status == ObjectStatus::ForbiddenObject {
        body.insert("objects".into(), json!(verdict.objects));
    }
    Ok(Json(Value::Object(body)))
}

pub async fn detect_audio_anomaly(
    State(state): State<AppState>,
    payload: Result<Json<RawAudioSubmission>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(submission) = payload?;
    let verdict = state.orchestrator.analyze_audio(&submission).await?;

    let mut body = Map::new();
    body.insert("status".into(), json!(verdict.status()));
    match verdict.status {
        AudioStatus::AnomalyDetected => {
            body.insert("anomalies".into(), json!(verdict.anomalies));
            body.insert("volume_level".into(), json!(verdict.volume_level));
        }
        AudioStatus::InsufficientData => {
            body.insert("unavailable".into(), json!(verdict.unavailable));
        }
        AudioStatus::Clear => {}
    }
    Ok(Json(Value::Object(body)))
}
