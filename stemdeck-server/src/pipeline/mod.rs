//! Job pipeline: upload → separate → relocate → catalog → stem descriptors
//!
//! Components, leaf first:
//! - [`layout::StorageLayout`]: upload/output naming and the relocation rename
//! - [`separator::Separator`]: blocking external tool run on the blocking pool
//! - [`coordinator::JobCoordinator`]: one upload end to end
//! - [`download::DownloadResolver`]: (model, job, stem) → file
//! - [`deletion::DeletionManager`]: directory tree + catalog record removal
//! - [`audit`]: startup check for records whose directory is gone

pub mod audit;
pub mod coordinator;
pub mod deletion;
pub mod download;
pub mod job;
pub mod layout;
pub mod separator;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::JobCoordinator;
pub use deletion::DeletionManager;
pub use download::DownloadResolver;
pub use job::{CompletedJob, JobId, JobStage, StemDescriptor, UploadedJob};
pub use layout::{StorageLayout, STEM_EXTENSION, STEM_MEDIA_TYPE};
pub use separator::{SeparationError, Separator};

use std::path::PathBuf;
use thiserror::Error;

use layout::LayoutError;

/// Reasons a job stops before producing a catalog record
#[derive(Debug, Error)]
pub enum JobError {
    /// Client-supplied filename has no usable final component
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    /// Model name is not a safe single path component
    #[error("Invalid model name: {0:?}")]
    InvalidModel(String),

    /// Raw upload could not be written
    #[error("Failed to store upload: {0}")]
    Upload(#[source] LayoutError),

    /// External tool exited non-zero or could not be launched
    #[error("Processing failed: {0}")]
    ProcessingFailed(#[source] SeparationError),

    /// Tool reported success but its output directory is absent
    #[error("Processed stems directory not found: {}", .0.display())]
    OutputMissing(PathBuf),

    /// Catalog already holds a record for this stems directory
    #[error("Stems path already catalogued: {0}")]
    DuplicatePath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(stemdeck_common::Error),
}

impl JobError {
    /// Terminal stage this error leaves the job in, if it is one of the pipeline failures
    pub fn failed_stage(&self) -> Option<JobStage> {
        match self {
            JobError::ProcessingFailed(_) => Some(JobStage::InvokeFailed),
            JobError::OutputMissing(_) => Some(JobStage::RelocateFailed),
            _ => None,
        }
    }
}

impl From<stemdeck_common::Error> for JobError {
    fn from(err: stemdeck_common::Error) -> Self {
        match err {
            stemdeck_common::Error::DuplicatePath(path) => JobError::DuplicatePath(path),
            other => JobError::Catalog(other),
        }
    }
}

impl From<LayoutError> for JobError {
    fn from(err: LayoutError) -> Self {
        match err {
            LayoutError::Io(e) => JobError::Io(e),
            other => JobError::Upload(other),
        }
    }
}
