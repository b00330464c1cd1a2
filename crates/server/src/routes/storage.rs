use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, routes::require_user, state::AppState, storage::ObjectStorage};

#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub file_name: String,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    pub url: String,
    pub key: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub struct ObjectKeyRequest {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadUrlResponse {
    pub url: String,
    pub expires_in: u64,
}

pub async fn upload_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, AppError> {
    let user_id = require_user(&state, &headers)?;
    if req.file_name.is_empty() || req.content_type.is_empty() {
        return Err(AppError::BadRequest("Missing required fields".to_string()));
    }

    let key = ObjectStorage::object_key(&user_id, &req.file_name);
    let url = state.storage.upload_url(&key, &req.content_type).await?;

    Ok(Json(UploadUrlResponse {
        url,
        key,
        expires_in: ObjectStorage::expiry_secs(),
    }))
}

pub async fn download_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ObjectKeyRequest>,
) -> Result<Json<DownloadUrlResponse>, AppError> {
    let user_id = require_user(&state, &headers)?;
    if req.key.is_empty() {
        return Err(AppError::BadRequest("Missing file key".to_string()));
    }
    if !ObjectStorage::key_owned_by(&req.key, &user_id) {
        return Err(AppError::Forbidden(
            "Access denied to this file".to_string(),
        ));
    }

    let url = state.storage.download_url(&req.key).await?;
    Ok(Json(DownloadUrlResponse {
        url,
        expires_in: ObjectStorage::expiry_secs(),
    }))
}

pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ObjectKeyRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require_user(&state, &headers)?;
    if req.key.is_empty() {
        return Err(AppError::BadRequest("Missing file key".to_string()));
    }
    if !ObjectStorage::key_owned_by(&req.key, &user_id) {
        return Err(AppError::Forbidden(
            "Access denied to delete this file".to_string(),
        ));
    }

    state.storage.delete(&req.key).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
