//! stemdeck-server - stem separation service
//!
//! Accepts audio uploads, runs the configured separation tool (Demucs by default) and
//! serves the resulting stems until they are deleted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use stemdeck_common::config::{
    load_toml_config, resolve_root_folder, ServiceConfig, ROOT_FOLDER_ENV,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stemdeck_server::pipeline::{audit, StorageLayout};
use stemdeck_server::{build_identification, build_router, AppState};

/// Command-line arguments for stemdeck-server
#[derive(Parser, Debug)]
#[command(name = "stemdeck-server")]
#[command(about = "Audio stem separation service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder for uploads, stems and the catalog database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "STEMDECK_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &toml_config);
    let mut config = ServiceConfig::new(root_folder, &toml_config);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // RUST_LOG overrides the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "stemdeck_server={level},stemdeck_common={level},tower_http={level}",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting StemDeck server {}", build_identification());

    config.validate()?;

    info!("Root folder: {}", config.root_folder.display());
    info!(
        "Separation tool: {} {} (default model {}, {} concurrent)",
        config.separation.program,
        config.separation.args.join(" "),
        config.separation.default_model,
        config.separation.max_concurrent_jobs
    );

    let layout = StorageLayout::from_config(&config);
    layout
        .ensure_directories()
        .await
        .context("Failed to create upload/output directories")?;
    info!(
        "Uploads: {}, stems: {}",
        layout.upload_dir().display(),
        layout.output_dir().display()
    );

    info!("Database: {}", config.database_path.display());
    let db_pool = stemdeck_common::db::init_database_pool(&config.database_path)
        .await
        .context("Failed to open catalog database")?;

    let bind_address = config.bind_address();
    let state = AppState::new(config, db_pool);

    match audit::audit_catalog(&state.catalog).await {
        Ok(0) => {}
        Ok(n) => warn!("{} catalog record(s) reference missing stems directories", n),
        Err(e) => warn!("Catalog audit failed: {}", e),
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
