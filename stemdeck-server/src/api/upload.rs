//! Upload and separation

use axum::{
    extract::{Host, Multipart, State},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::UploadedJob;
use crate::AppState;

/// POST /upload/ response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Stem name → absolute download URL
    pub stems: BTreeMap<String, String>,
}

/// POST /upload/
///
/// Multipart fields:
/// - `file`: audio file (required, must carry a filename)
/// - `model_name`: separation model (optional, configured default otherwise)
///
/// The file is streamed to disk as soon as its field arrives, so `model_name` may come
/// before or after it. The response is sent once separation has finished.
pub async fn upload_and_separate(
    State(state): State<AppState>,
    Host(host): Host,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut uploaded: Option<UploadedJob> = None;

    let model_name = match read_fields(&state, &mut multipart, &mut uploaded).await {
        Ok(model_name) => model_name,
        Err(e) => {
            // A stored upload that will not be separated falls under the cleanup policy
            if let Some(job) = uploaded {
                state.coordinator.abandon(job).await;
            }
            return Err(e);
        }
    };

    let job = uploaded
        .ok_or_else(|| ApiError::BadRequest("Missing 'file' field".to_string()))?;
    let model = model_name
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.separation.default_model.clone());

    let completed = state.coordinator.separate(job, &model).await?;

    let base_url = format!("http://{}", host);
    let stems = completed
        .stems
        .into_iter()
        .map(|(name, descriptor)| (name, format!("{}{}", base_url, descriptor.download_path())))
        .collect();

    Ok(Json(UploadResponse { stems }))
}

/// Consume every multipart field, storing `file` as it streams in
///
/// Returns the `model_name` value if one was sent. The stored upload is left in `uploaded`
/// even when a later field fails.
async fn read_fields(
    state: &AppState,
    multipart: &mut Multipart,
    uploaded: &mut Option<UploadedJob>,
) -> ApiResult<Option<String>> {
    let mut model_name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                if uploaded.is_some() {
                    return Err(ApiError::BadRequest(
                        "Only one 'file' field is accepted".to_string(),
                    ));
                }
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ApiError::BadRequest("'file' field has no filename".to_string())
                    })?;
                *uploaded = Some(state.coordinator.accept_upload(&filename, field).await?);
            }
            Some("model_name") => {
                let text = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Invalid 'model_name' field: {}", e))
                })?;
                model_name = Some(text);
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring unexpected multipart field");
            }
        }
    }

    Ok(model_name)
}
