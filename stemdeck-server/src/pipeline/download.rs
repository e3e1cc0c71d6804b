//! Stem download resolution
//!
//! Resolution looks only at the filesystem. A deleted or never-completed job resolves to
//! NotFound because its directory is absent; the catalog is not consulted.

use std::path::PathBuf;
use stemdeck_common::{Error, Result};

use super::job::JobId;
use super::layout::{is_safe_component, StorageLayout};

/// Maps (model, job, stem) to a stem file on disk
#[derive(Debug, Clone)]
pub struct DownloadResolver {
    layout: StorageLayout,
}

impl DownloadResolver {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Path of an existing stem file
    ///
    /// Segments that are not plain path components, and job ids that are not UUIDs,
    /// resolve to NotFound without touching the filesystem.
    pub async fn resolve(&self, model: &str, job_id: &str, stem: &str) -> Result<PathBuf> {
        let not_found = || Error::NotFound(format!("stem {}/{}/{}", model, job_id, stem));

        if !is_safe_component(model) || !is_safe_component(stem) {
            return Err(not_found());
        }
        let job_id: JobId = job_id.parse().map_err(|_| not_found())?;

        let path = self.layout.stem_path(model, job_id, stem);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(not_found()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }
}
