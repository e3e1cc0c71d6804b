//! Catalog consistency check
//!
//! Finds records whose stems directory no longer exists, e.g. after a deletion was
//! interrupted between removing the directory and removing the record.

use std::path::Path;
use stemdeck_common::db::{Catalog, SongRecord};
use stemdeck_common::Result;

/// Records whose `stems_path` is not an existing directory
pub async fn find_dangling_records(catalog: &Catalog) -> Result<Vec<SongRecord>> {
    let songs = catalog.session().await?.list().await?;

    let mut dangling = Vec::new();
    for song in songs {
        let is_dir = tokio::fs::metadata(Path::new(&song.stems_path))
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            dangling.push(song);
        }
    }

    Ok(dangling)
}

/// Log a warning per dangling record; returns how many were found
pub async fn audit_catalog(catalog: &Catalog) -> Result<usize> {
    let dangling = find_dangling_records(catalog).await?;

    for song in &dangling {
        tracing::warn!(
            song_id = song.id,
            filename = %song.filename,
            path = %song.stems_path,
            "Catalog record points at a missing stems directory"
        );
    }

    if dangling.is_empty() {
        tracing::info!("Catalog audit: all stems directories present");
    }

    Ok(dangling.len())
}
