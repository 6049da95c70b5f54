//! Axum route handlers for the CV Architect.

use axum::{extract::Multipart, Json};
use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::errors::AppError;

#[derive(Debug, Serialize)]
pub struct ExtractCvResponse {
    pub file_name: Option<String>,
    pub base_cv: String,
    pub char_count: usize,
}

/// POST /api/v1/cv/extract
///
/// Multipart upload with a `file` field (PDF or plain text). Returns the text to
/// pass as `base_cv` when creating a workflow.
pub async fn handle_extract_cv(mut multipart: Multipart) -> Result<Json<ExtractCvResponse>, AppError> {
    let mut upload: Option<(Option<String>, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
        upload = Some((file_name, data));
    }

    let (file_name, data) =
        upload.ok_or_else(|| AppError::Validation("Missing `file` field".to_string()))?;
    let base_cv = extract_cv_text(&data)?;
    info!("Extracted {} chars from uploaded CV", base_cv.len());

    Ok(Json(ExtractCvResponse {
        file_name,
        char_count: base_cv.chars().count(),
        base_cv,
    }))
}

/// PDF uploads go through pdf-extract; anything else must be UTF-8 text.
pub fn extract_cv_text(data: &[u8]) -> Result<String, AppError> {
    let text = if data.starts_with(b"%PDF") {
        pdf_extract::extract_text_from_mem(data)
            .map_err(|e| AppError::Validation(format!("Could not read PDF: {e}")))?
    } else {
        String::from_utf8(data.to_vec())
            .map_err(|_| AppError::Validation("CV must be a PDF or UTF-8 text".to_string()))?
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::Validation("CV contains no text".to_string()));
    }
    Ok(text)
}
