//! Job deletion
//!
//! The stems directory is removed before the catalog record. An interruption between the
//! two steps leaves a record pointing at a missing directory (reported by
//! [`super::audit`]) rather than an unreferenced directory.

use std::path::Path;
use stemdeck_common::db::{Catalog, SongRecord};
use stemdeck_common::Result;
use tracing::{info, warn};

use super::layout::StorageLayout;

/// Removes a catalog record together with its stems directory
#[derive(Clone)]
pub struct DeletionManager {
    layout: StorageLayout,
    catalog: Catalog,
}

impl DeletionManager {
    pub fn new(layout: StorageLayout, catalog: Catalog) -> Self {
        Self { layout, catalog }
    }

    /// Delete one job by catalog id
    ///
    /// NotFound if the id is not catalogued. A stems directory that is already gone is
    /// not an error.
    pub async fn delete(&self, id: i64) -> Result<SongRecord> {
        let mut session = self.catalog.session().await?;
        let record = session.get(id).await?;

        let removed = self.layout.remove_tree(Path::new(&record.stems_path)).await?;
        if !removed {
            warn!(
                song_id = id,
                path = %record.stems_path,
                "Stems directory already absent"
            );
        }

        session.delete(id).await?;

        info!(song_id = id, filename = %record.filename, "Song deleted");
        Ok(record)
    }
}
