//! On-disk layout for uploads and separated stems
//!
//! ```text
//! <upload_dir>/<job_id>_<filename>                         raw upload
//! <output_dir>/<model>/<job_id>_<upload stem>/<stem>.wav   written by the separation tool
//! <output_dir>/<model>/<job_id>/<stem>.wav                 canonical, after relocation
//! ```
//!
//! The tool derives its directory name from the input file name, so that directory is treated
//! as untrusted: it is checked before the single rename that moves it into place.

use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use stemdeck_common::config::ServiceConfig;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::job::JobId;

/// Extension of every stem file served for download
pub const STEM_EXTENSION: &str = "wav";

/// Media type of every stem file served for download
pub const STEM_MEDIA_TYPE: &str = "audio/wav";

/// Prefix of directories that are being removed
const TOMBSTONE_PREFIX: &str = ".deleting-";

/// Layout errors
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Expected path does not exist
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Incoming upload stream failed part way through
    #[error("Upload stream failed: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// True if `segment` is usable as a single path component
///
/// Rejects empty values, separators, NUL, `.`/`..` and hidden names.
pub fn is_safe_component(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= 255
        && !segment.starts_with('.')
        && !segment.contains(['/', '\\', '\0'])
}

/// Final path component of a client-supplied filename
///
/// Browsers on some platforms send full paths; only the last component is kept.
pub fn upload_file_name(original: &str) -> Option<String> {
    let last = original.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." || last.contains('\0') {
        return None;
    }
    Some(last.to_string())
}

/// Owner of the upload and output directory naming scheme
#[derive(Debug, Clone)]
pub struct StorageLayout {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.upload_dir.clone(), config.output_dir.clone())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create upload and output roots if missing
    pub async fn ensure_directories(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    /// `<upload_dir>/<job_id>_<file_name>`
    pub fn upload_path(&self, job_id: JobId, file_name: &str) -> PathBuf {
        self.upload_dir.join(format!("{}_{}", job_id, file_name))
    }

    /// Directory the separation tool creates for `upload_path`
    ///
    /// The tool names it after the input file without its extension.
    pub fn tool_output_dir(&self, model: &str, upload_path: &Path) -> PathBuf {
        let stem = upload_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output_dir.join(model).join(stem)
    }

    /// Canonical stems directory: `<output_dir>/<model>/<job_id>`
    pub fn job_dir(&self, model: &str, job_id: JobId) -> PathBuf {
        self.output_dir.join(model).join(job_id.to_string())
    }

    /// Canonical stem file: `<output_dir>/<model>/<job_id>/<stem>.wav`
    pub fn stem_path(&self, model: &str, job_id: JobId, stem: &str) -> PathBuf {
        self.job_dir(model, job_id)
            .join(format!("{}.{}", stem, STEM_EXTENSION))
    }

    /// Write an upload stream verbatim to its job-namespaced path
    ///
    /// The file is created exclusively; an existing file at that path is an error rather
    /// than being overwritten. A stream failure leaves the partial file in place.
    pub async fn store_upload<S, B, E>(
        &self,
        stream: S,
        job_id: JobId,
        file_name: &str,
    ) -> Result<PathBuf, LayoutError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let path = self.upload_path(job_id, file_name);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        tokio::pin!(stream);
        let mut bytes_written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LayoutError::Stream(e.to_string()))?;
            let chunk = chunk.as_ref();
            file.write_all(chunk).await?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(
            job_id = %job_id,
            path = %path.display(),
            bytes = bytes_written,
            "Upload stored"
        );

        Ok(path)
    }

    /// Move a directory with a single rename
    ///
    /// Fails with [`LayoutError::NotFound`] if `from` is not an existing directory.
    pub async fn relocate(&self, from: &Path, to: &Path) -> Result<(), LayoutError> {
        match tokio::fs::metadata(from).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(LayoutError::NotFound(from.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LayoutError::NotFound(from.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        }

        tokio::fs::rename(from, to).await?;
        Ok(())
    }

    /// Regular files in `dir`, keyed by file name without extension
    pub async fn list_stems(&self, dir: &Path) -> io::Result<BTreeMap<String, PathBuf>> {
        let mut stems = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.insert(stem.to_string(), path.clone());
            }
        }

        Ok(stems)
    }

    /// Remove a directory tree so that it disappears in one step
    ///
    /// The directory is first renamed to a hidden sibling, then deleted recursively.
    /// Returns `false` if the directory was already absent.
    pub async fn remove_tree(&self, path: &Path) -> io::Result<bool> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let tombstone = parent.join(format!("{}{}", TOMBSTONE_PREFIX, Uuid::new_v4()));

        match tokio::fs::rename(path, &tombstone).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        }

        if let Err(e) = tokio::fs::remove_dir_all(&tombstone).await {
            tracing::warn!(
                path = %tombstone.display(),
                error = %e,
                "Failed to remove renamed directory; it is no longer reachable"
            );
        }

        Ok(true)
    }
}
