//! Upload Handlers
//!
//! Attachment bytes go to the blob store; the returned `{data, type, name,
//! size}` is what a client then puts in a message's `attachment`.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::application::dto::{AudioUploadRequest, UploadResponse};
use crate::shared::error::AppError;
use crate::startup::AppState;

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct DeleteUploadResponse {
    pub deleted: bool,
}

/// POST /uploads
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let max_size = state.settings.uploads.max_file_size;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or("file").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;

        if bytes.is_empty() {
            return Err(AppError::Validation("file: upload is empty".into()));
        }
        if bytes.len() > max_size {
            return Err(AppError::Validation(format!(
                "file: exceeds the {} byte limit",
                max_size
            )));
        }

        let blob = state.blobs.put(&bytes, &name, &mime_type).await?;
        tracing::info!(handle = %blob.handle, size = blob.size, mime_type = %blob.mime_type, "Attachment uploaded");
        return Ok((StatusCode::CREATED, Json(UploadResponse::from(blob))));
    }

    Err(AppError::Validation("file: multipart field is required".into()))
}

/// POST /uploads/audio
pub async fn upload_audio(
    State(state): State<AppState>,
    Json(req): Json<AudioUploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let audio = req.decode(state.settings.uploads.max_file_size)?;

    let blob = state
        .blobs
        .put(&audio.bytes, &audio.name, &audio.mime_type)
        .await?;
    tracing::info!(handle = %blob.handle, size = blob.size, duration = ?req.duration, "Voice note uploaded");

    let mut response = UploadResponse::from(blob);
    response.duration = req.duration;
    Ok((StatusCode::CREATED, Json(response)))
}

/// DELETE /uploads/{handle}
pub async fn delete_upload(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<DeleteUploadResponse>, AppError> {
    if !state.blobs.delete(&handle).await? {
        return Err(AppError::NotFound(format!("Upload '{}' not found", handle)));
    }
    Ok(Json(DeleteUploadResponse { deleted: true }))
}
