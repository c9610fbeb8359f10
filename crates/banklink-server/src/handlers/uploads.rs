//! Upload reservation and tracking handlers

use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{AppError, AppState, Identity, Role};
use banklink_core::models::{Upload, UploadList};

/// Request body for reserving an upload slot
#[derive(Debug, Deserialize)]
pub struct ReserveUploadRequest {
    pub year: i32,
    pub bank: String,
}

#[derive(Serialize)]
pub struct ReserveUploadResponse {
    /// Where to PUT the sheet
    pub url: String,
    pub bucket: String,
    pub key: String,
    /// Unix timestamp after which the URL is rejected
    pub expires: i64,
    pub upload: Upload,
}

/// POST /api/uploads/ingest - Reserve an upload and issue a signed URL
///
/// Superusers only. Resets the (year, bank) upload to pending.
pub async fn reserve_upload(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ReserveUploadRequest>,
) -> Result<Json<ReserveUploadResponse>, AppError> {
    if identity.role != Role::Superuser {
        return Err(AppError::forbidden("Only superusers can upload bank sheets"));
    }

    let signer = state
        .signer
        .as_ref()
        .ok_or_else(|| AppError::unavailable("Upload signing is not configured"))?;

    if state.launcher.is_running(req.year, req.bank.trim()) {
        return Err(AppError::conflict(&format!(
            "Ingestion already running for {} {}",
            req.year,
            req.bank.trim()
        )));
    }

    let (signed, upload) = banklink_core::reserve_upload(
        &state.db,
        signer,
        &state.storage.raw_bucket,
        req.year,
        &req.bank,
        chrono::Utc::now().timestamp(),
    )?;

    info!(user = %identity.user, year = upload.year, bank = %upload.bank, "Upload reserved");

    Ok(Json(ReserveUploadResponse {
        url: signed.url,
        bucket: signed.bucket,
        key: signed.key,
        expires: signed.expires,
        upload,
    }))
}

/// GET /api/uploads - List all uploads and their progress
pub async fn list_uploads(State(state): State<Arc<AppState>>) -> Result<Json<UploadList>, AppError> {
    Ok(Json(state.db.list_uploads()?))
}
