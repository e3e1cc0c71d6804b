//! HTTP API handlers
//!
//! - `GET /library`: catalog, newest first
//! - `POST /upload/`: multipart upload, runs the separation job
//! - `DELETE /songs/:song_id`: remove a job and its stems
//! - `GET /download/:model_name/:job_id/:stem_name`: one stem as `audio/wav`
//! - `GET /health`

pub mod download;
pub mod health;
pub mod library;
pub mod upload;

pub use download::download_stem;
pub use health::health_routes;
pub use library::{delete_song, list_library};
pub use upload::upload_and_separate;
