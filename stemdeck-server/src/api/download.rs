//! Stem download

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{STEM_EXTENSION, STEM_MEDIA_TYPE};
use crate::AppState;

/// GET /download/:model_name/:job_id/:stem_name
///
/// The file is opened before the response starts streaming, so a concurrent deletion
/// yields either the complete file or 404.
pub async fn download_stem(
    State(state): State<AppState>,
    Path((model_name, job_id, stem_name)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let path = state
        .downloads
        .resolve(&model_name, &job_id, &stem_name)
        .await?;

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File not found".to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let length = file.metadata().await?.len();

    tracing::debug!(
        model = %model_name,
        job_id = %job_id,
        stem = %stem_name,
        bytes = length,
        "Serving stem"
    );

    let headers = [
        (header::CONTENT_TYPE, STEM_MEDIA_TYPE.to_string()),
        (header::CONTENT_LENGTH, length.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.{}\"", stem_name, STEM_EXTENSION),
        ),
    ];

    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
