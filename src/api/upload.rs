//! POST /upload-image and POST /upload-invoice

use axum::extract::{Multipart, State};
use axum::Json;

use super::ApiError;
use crate::intake::{self, ImageSubmission, InvoiceSubmission, Upload};
use crate::AppState;

/// Take the first file field; a field literally named `file` counts even
/// without a filename.
async fn first_file(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_none() && field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(Upload::new(&filename, content_type.as_deref(), bytes.to_vec()));
    }
    Err(ApiError::MissingFile)
}

/// POST /upload-image
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImageSubmission>, ApiError> {
    let upload = first_file(multipart).await?;
    Ok(Json(intake::submit_image(&state, upload).await))
}

/// POST /upload-invoice
pub async fn upload_invoice(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<InvoiceSubmission>, ApiError> {
    let upload = first_file(multipart).await?;
    Ok(Json(intake::submit_invoice(&state, upload).await))
}
