//! Face registration / verification handlers

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use proctor_core::{ProctorError, Verdict};
use serde_json::{json, Value};

use super::UploadForm;
use crate::models::RegisteredFacesResponse;
use crate::{AppResult, AppState};

pub async fn register(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<Value>> {
    let mut form = UploadForm::read(multipart?).await?;
    let image = form.take_image()?;

    let verdict = state.orchestrator.register_face(form.field("roll_number"), image).await?;
    Ok(Json(json!({ "status": verdict.status() })))
}

pub async fn verify(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<Value>> {
    let mut form = UploadForm::read(multipart?).await?;
    let image = form.take_image()?;

    match state.orchestrator.verify_face(form.field("roll_number"), image).await {
        Ok(verdict) => {
            let mut body = json!({ "status": verdict.status() });
            if let Some(distance) = verdict.distance {
                body["distance"] = json!(distance);
            }
            Ok(Json(body))
        }
        // Not an error for the client: nothing to compare against yet
        Err(ProctorError::NotRegistered(_)) => Ok(Json(json!({ "status": "unregistered" }))),
        Err(e) => Err(e.into()),
    }
}

pub async fn list_registered(State(state): State<AppState>) -> AppResult<Json<RegisteredFacesResponse>> {
    let ids = state.orchestrator.registered_faces().await?;
    Ok(Json(RegisteredFacesResponse {
        registered_faces: ids.into_iter().map(|id| id.into_inner()).collect(),
    }))
}
