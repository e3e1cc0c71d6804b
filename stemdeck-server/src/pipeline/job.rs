//! Job identity, lifecycle stages and results

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use stemdeck_common::db::SongRecord;
use uuid::Uuid;

/// Identifier scoping every path a job touches
///
/// Random v4 UUID rendered in hyphenated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Per-job state machine
///
/// `Created → Uploaded → Invoked → Relocated → Persisted → Exposed`; `InvokeFailed` and
/// `RelocateFailed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Created,
    Uploaded,
    Invoked,
    Relocated,
    Persisted,
    Exposed,
    InvokeFailed,
    RelocateFailed,
}

impl JobStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStage::Exposed | JobStage::InvokeFailed | JobStage::RelocateFailed
        )
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Created => "created",
            JobStage::Uploaded => "uploaded",
            JobStage::Invoked => "invoked",
            JobStage::Relocated => "relocated",
            JobStage::Persisted => "persisted",
            JobStage::Exposed => "exposed",
            JobStage::InvokeFailed => "invoke_failed",
            JobStage::RelocateFailed => "relocate_failed",
        };
        f.write_str(name)
    }
}

/// Everything a caller needs to request one stem later
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StemDescriptor {
    pub model: String,
    pub job_id: JobId,
    pub stem: String,
}

impl StemDescriptor {
    /// Request path for the download endpoint (`/download/<model>/<job>/<stem>`)
    pub fn download_path(&self) -> String {
        format!("/download/{}/{}/{}", self.model, self.job_id, self.stem)
    }
}

/// A job whose raw upload is on disk
#[derive(Debug, Clone)]
pub struct UploadedJob {
    pub job_id: JobId,
    /// Filename exactly as submitted; stored in the catalog
    pub original_filename: String,
    pub upload_path: PathBuf,
}

/// A job that made it all the way to a catalog record
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub job_id: JobId,
    pub record: SongRecord,
    /// Keyed by stem name (file name without extension)
    pub stems: BTreeMap<String, StemDescriptor>,
}
