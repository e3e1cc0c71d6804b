//! Catalog listing and deletion

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use stemdeck_common::db::SongRecord;

use crate::{error::ApiResult, AppState};

/// DELETE /songs/:song_id response
#[derive(Debug, Serialize)]
pub struct DeleteSongResponse {
    pub message: String,
}

/// GET /library
///
/// All catalogued songs, most recent first.
pub async fn list_library(State(state): State<AppState>) -> ApiResult<Json<Vec<SongRecord>>> {
    let mut session = state.catalog.session().await?;
    let songs = session.list().await?;
    Ok(Json(songs))
}

/// DELETE /songs/:song_id
///
/// Removes the stems directory, then the catalog record. 404 for an unknown id.
pub async fn delete_song(
    State(state): State<AppState>,
    Path(song_id): Path<i64>,
) -> ApiResult<Json<DeleteSongResponse>> {
    state.deletions.delete(song_id).await?;

    Ok(Json(DeleteSongResponse {
        message: "Song deleted successfully".to_string(),
    }))
}
