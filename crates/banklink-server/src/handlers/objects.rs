//! Signed object writes
//!
//! The local analogue of a pre-signed bucket URL: a PUT carrying a valid
//! signature stores the body. A write into the raw bucket is an
//! object-created event and fires exactly one ingestion run.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{AppError, AppState};

/// Signature parameters carried in the URL
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

#[derive(Serialize)]
pub struct PutObjectResponse {
    pub bucket: String,
    pub key: String,
    pub size: usize,
    /// Whether this write started an ingestion run
    pub ingesting: bool,
}

/// PUT /objects/:bucket/*key - Store an object through a signed URL
pub async fn put_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<SignedQuery>,
    body: Bytes,
) -> Result<Json<PutObjectResponse>, AppError> {
    let key = key.trim_start_matches('/').to_string();

    let signer = state
        .signer
        .as_ref()
        .ok_or_else(|| AppError::unavailable("Upload signing is not configured"))?;

    signer.verify_put(
        &bucket,
        &key,
        params.expires,
        &params.signature,
        chrono::Utc::now().timestamp(),
    )?;

    if body.is_empty() {
        return Err(AppError::bad_request("Empty upload body"));
    }

    state.store.put(&bucket, &key, &body)?;
    info!(bucket = %bucket, key = %key, size = body.len(), "Object stored");

    let ingesting = bucket == state.storage.raw_bucket;
    if ingesting {
        state.launcher.launch(&bucket, &key);
    }

    Ok(Json(PutObjectResponse {
        bucket,
        key,
        size: body.len(),
        ingesting,
    }))
}
