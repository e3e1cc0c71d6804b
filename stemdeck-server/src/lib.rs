//! stemdeck-server library
//!
//! Upload an audio file, split it into stems with an external separation tool, and serve
//! the stems from a small SQLite catalog.

pub mod api;
pub mod error;
pub mod pipeline;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use stemdeck_common::config::ServiceConfig;
use stemdeck_common::db::Catalog;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::{DeletionManager, DownloadResolver, JobCoordinator, Separator, StorageLayout};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Resolved configuration, built once at startup
    pub config: Arc<ServiceConfig>,
    pub catalog: Catalog,
    pub layout: StorageLayout,
    pub separator: Separator,
    pub coordinator: JobCoordinator,
    pub downloads: DownloadResolver,
    pub deletions: DeletionManager,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the pipeline components from one configuration and one pool
    pub fn new(config: ServiceConfig, db: SqlitePool) -> Self {
        let catalog = Catalog::new(db);
        let layout = StorageLayout::from_config(&config);
        let separator = Separator::new(&config.separation);
        let coordinator = JobCoordinator::new(
            layout.clone(),
            separator.clone(),
            catalog.clone(),
            config.separation.purge_failed_jobs,
        );

        Self {
            downloads: DownloadResolver::new(layout.clone()),
            deletions: DeletionManager::new(layout.clone(), catalog.clone()),
            config: Arc::new(config),
            catalog,
            layout,
            separator,
            coordinator,
            startup_time: Utc::now(),
        }
    }
}

/// Version, commit, build time and profile, as captured by the build script
pub fn build_identification() -> String {
    format!(
        "v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    )
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{delete, get, post};

    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/library", get(api::list_library))
        .route("/upload", post(api::upload_and_separate))
        .route("/upload/", post(api::upload_and_separate))
        .route("/songs/:song_id", delete(api::delete_song))
        .route(
            "/download/:model_name/:job_id/:stem_name",
            get(api::download_stem),
        )
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
