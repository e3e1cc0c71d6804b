//! Job coordinator
//!
//! Drives one upload through the pipeline:
//!
//! ```text
//! Created → Uploaded → Invoked → Relocated → Persisted → Exposed
//!              │           │
//!              ▼           ▼
//!        InvokeFailed  RelocateFailed
//! ```
//!
//! Everything after `Uploaded` runs on its own task, so a job that has started separating
//! is relocated and catalogued even if the client that submitted it goes away.
//!
//! A catalog record is written only after the tool's output has been moved into the
//! canonical layout and its stems enumerated. Failed jobs are not retried. Their raw upload
//! stays on disk unless `purge_failed_jobs` is enabled, in which case the upload and any
//! partial output are removed.

use futures::Stream;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use stemdeck_common::db::Catalog;
use tracing::{debug, error, info, warn};

use super::job::{CompletedJob, JobId, JobStage, StemDescriptor, UploadedJob};
use super::layout::{is_safe_component, upload_file_name, LayoutError, StorageLayout};
use super::separator::{SeparationError, Separator};
use super::JobError;

/// Orchestrates upload → separation → relocation → catalog
#[derive(Clone)]
pub struct JobCoordinator {
    layout: StorageLayout,
    separator: Separator,
    catalog: Catalog,
    purge_failed_jobs: bool,
}

impl JobCoordinator {
    pub fn new(
        layout: StorageLayout,
        separator: Separator,
        catalog: Catalog,
        purge_failed_jobs: bool,
    ) -> Self {
        Self {
            layout,
            separator,
            catalog,
            purge_failed_jobs,
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Run the whole pipeline for one upload
    pub async fn process<S, B, E>(
        &self,
        stream: S,
        original_filename: &str,
        model: &str,
    ) -> Result<CompletedJob, JobError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        let job = self.accept_upload(original_filename, stream).await?;
        self.separate(job, model).await
    }

    /// Created → Uploaded: assign a job id and store the raw upload
    pub async fn accept_upload<S, B, E>(
        &self,
        original_filename: &str,
        stream: S,
    ) -> Result<UploadedJob, JobError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        let file_name = upload_file_name(original_filename)
            .ok_or_else(|| JobError::InvalidFilename(original_filename.to_string()))?;

        let job_id = JobId::new();
        stage(job_id, JobStage::Created);

        let upload_path = match self.layout.store_upload(stream, job_id, &file_name).await {
            Ok(path) => path,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to store upload");
                if self.purge_failed_jobs {
                    remove_file_if_present(&self.layout.upload_path(job_id, &file_name)).await;
                }
                return Err(JobError::Upload(e));
            }
        };
        stage(job_id, JobStage::Uploaded);

        info!(
            job_id = %job_id,
            filename = %original_filename,
            path = %upload_path.display(),
            "Upload received"
        );

        Ok(UploadedJob {
            job_id,
            original_filename: original_filename.to_string(),
            upload_path,
        })
    }

    /// Uploaded → … → Exposed: separate, relocate, enumerate, catalog
    ///
    /// The work runs on a spawned task. Dropping the returned future stops waiting for the
    /// result but not the job itself.
    pub async fn separate(&self, job: UploadedJob, model: &str) -> Result<CompletedJob, JobError> {
        let job_id = job.job_id;
        let coordinator = self.clone();
        let model = model.to_string();

        tokio::spawn(async move { coordinator.run_job(job, &model).await })
            .await
            .unwrap_or_else(|e| {
                error!(job_id = %job_id, error = %e, "Separation job task failed");
                Err(JobError::ProcessingFailed(SeparationError::Worker(format!(
                    "Job task failed: {}",
                    e
                ))))
            })
    }

    /// Give up on a stored upload that will not be separated
    ///
    /// Applies the failure-cleanup policy to the raw upload.
    pub async fn abandon(&self, job: UploadedJob) {
        warn!(
            job_id = %job.job_id,
            path = %job.upload_path.display(),
            "Upload abandoned before separation"
        );
        self.purge_failed(&job, &[]).await;
    }

    async fn run_job(&self, job: UploadedJob, model: &str) -> Result<CompletedJob, JobError> {
        let job_id = job.job_id;

        if !is_safe_component(model) {
            self.purge_failed(&job, &[]).await;
            return Err(JobError::InvalidModel(model.to_string()));
        }

        info!(job_id = %job_id, model = %model, "Starting separation");

        let tool_dir = self.layout.tool_output_dir(model, &job.upload_path);
        let stems_dir = self.layout.job_dir(model, job_id);

        if let Err(e) = self
            .separator
            .run(model, self.layout.output_dir(), &job.upload_path)
            .await
        {
            stage(job_id, JobStage::InvokeFailed);
            error!(job_id = %job_id, model = %model, error = %e, "Separation failed");
            self.purge_failed(&job, &[tool_dir]).await;
            return Err(JobError::ProcessingFailed(e));
        }
        stage(job_id, JobStage::Invoked);

        match self.layout.relocate(&tool_dir, &stems_dir).await {
            Ok(()) => {}
            Err(LayoutError::NotFound(missing)) => {
                stage(job_id, JobStage::RelocateFailed);
                error!(
                    job_id = %job_id,
                    expected = %missing.display(),
                    "Separation reported success but produced no output directory"
                );
                self.purge_failed(&job, &[tool_dir]).await;
                return Err(JobError::OutputMissing(missing));
            }
            Err(e) => {
                stage(job_id, JobStage::RelocateFailed);
                error!(job_id = %job_id, error = %e, "Failed to relocate stems");
                self.purge_failed(&job, &[tool_dir]).await;
                return Err(e.into());
            }
        }
        stage(job_id, JobStage::Relocated);

        let stem_names = match self.layout.list_stems(&stems_dir).await {
            Ok(stems) if stems.is_empty() => {
                stage(job_id, JobStage::RelocateFailed);
                error!(
                    job_id = %job_id,
                    path = %stems_dir.display(),
                    "Separation output directory holds no stems"
                );
                self.purge_failed(&job, &[stems_dir.clone()]).await;
                return Err(JobError::OutputMissing(stems_dir));
            }
            Ok(stems) => stems.into_keys().collect::<Vec<_>>(),
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to enumerate stems");
                self.purge_failed(&job, &[stems_dir]).await;
                return Err(e.into());
            }
        };

        let stems_path = stems_dir.to_string_lossy().into_owned();
        let inserted = {
            let mut session = self.catalog.session().await?;
            session.insert(&job.original_filename, &stems_path).await
        };
        let record = match inserted {
            Ok(record) => record,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to catalog stems");
                self.purge_failed(&job, &[stems_dir]).await;
                return Err(e.into());
            }
        };
        stage(job_id, JobStage::Persisted);

        let stems: BTreeMap<String, StemDescriptor> = stem_names
            .into_iter()
            .map(|stem| {
                let descriptor = StemDescriptor {
                    model: model.to_string(),
                    job_id,
                    stem: stem.clone(),
                };
                (stem, descriptor)
            })
            .collect();
        stage(job_id, JobStage::Exposed);

        info!(
            job_id = %job_id,
            song_id = record.id,
            stems = stems.len(),
            "Separation job complete"
        );

        Ok(CompletedJob {
            job_id,
            record,
            stems,
        })
    }

    /// Apply the failure-cleanup policy to a job that stopped before the catalog
    async fn purge_failed(&self, job: &UploadedJob, partial_dirs: &[PathBuf]) {
        if !self.purge_failed_jobs {
            debug!(
                job_id = %job.job_id,
                path = %job.upload_path.display(),
                "Leaving raw upload in place after failure"
            );
            return;
        }

        remove_file_if_present(&job.upload_path).await;

        for dir in partial_dirs {
            if let Err(e) = self.layout.remove_tree(dir).await {
                warn!(
                    job_id = %job.job_id,
                    path = %dir.display(),
                    error = %e,
                    "Failed to remove partial separation output"
                );
            }
        }
    }
}

fn stage(job_id: JobId, stage: JobStage) {
    debug!(job_id = %job_id, stage = %stage, "Job stage");
}

async fn remove_file_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed raw upload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove raw upload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{
        fake_separation, EMPTY_TOOL, FAILING_TOOL, FAKE_TOOL, PARTIAL_TOOL, SILENT_TOOL,
        SLOW_TOOL,
    };
    use std::convert::Infallible;
    use stemdeck_common::db::init_database_pool;
    use tempfile::TempDir;

    async fn test_coordinator(dir: &TempDir, script: &str, purge: bool) -> JobCoordinator {
        let layout = StorageLayout::new(dir.path().join("uploads"), dir.path().join("separated"));
        layout.ensure_directories().await.unwrap();
        let separator = Separator::new(&fake_separation(dir.path(), script, purge));
        let pool = init_database_pool(&dir.path().join("library.db"))
            .await
            .unwrap();
        JobCoordinator::new(layout, separator, Catalog::new(pool), purge)
    }

    fn upload(bytes: &'static [u8]) -> impl Stream<Item = Result<&'static [u8], Infallible>> {
        futures::stream::iter(vec![Ok(bytes)])
    }

    async fn catalog_len(coordinator: &JobCoordinator) -> usize {
        let mut session = coordinator.catalog.session().await.unwrap();
        session.list().await.unwrap().len()
    }

    fn upload_dir_len(coordinator: &JobCoordinator) -> usize {
        std::fs::read_dir(coordinator.layout().upload_dir())
            .unwrap()
            .count()
    }

    #[tokio::test]
    async fn test_process_success() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, FAKE_TOOL, false).await;

        let job = coordinator
            .process(upload(b"audio bytes"), "My Song.mp3", "htdemucs_6s")
            .await
            .unwrap();

        let stems_dir = coordinator.layout().job_dir("htdemucs_6s", job.job_id);
        assert_eq!(job.record.filename, "My Song.mp3");
        assert_eq!(job.record.stems_path, stems_dir.to_string_lossy());
        assert!(stems_dir.is_dir());

        let names: Vec<&str> = job.stems.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["bass", "drums", "other", "vocals"]);
        for (name, descriptor) in &job.stems {
            assert_eq!(descriptor.model, "htdemucs_6s");
            assert_eq!(descriptor.job_id, job.job_id);
            let file = coordinator
                .layout()
                .stem_path("htdemucs_6s", job.job_id, name);
            assert!(std::fs::metadata(file).unwrap().len() > 0);
        }

        // Tool-named directory is gone; raw upload is retained
        let upload_path = coordinator.layout().upload_path(job.job_id, "My Song.mp3");
        assert!(!coordinator
            .layout()
            .tool_output_dir("htdemucs_6s", &upload_path)
            .exists());
        assert_eq!(std::fs::read(upload_path).unwrap(), b"audio bytes");
        assert_eq!(catalog_len(&coordinator).await, 1);
    }

    #[tokio::test]
    async fn test_processing_failure_keeps_upload_and_catalog_empty() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, FAILING_TOOL, false).await;

        let job = coordinator
            .accept_upload("song.wav", upload(b"raw"))
            .await
            .unwrap();
        let upload_path = job.upload_path.clone();

        let err = coordinator.separate(job, "htdemucs_6s").await.unwrap_err();

        assert!(matches!(err, JobError::ProcessingFailed(_)));
        assert_eq!(err.failed_stage(), Some(JobStage::InvokeFailed));
        assert!(upload_path.exists());
        assert_eq!(catalog_len(&coordinator).await, 0);
    }

    #[tokio::test]
    async fn test_missing_output_is_distinct_failure() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, SILENT_TOOL, false).await;

        let err = coordinator
            .process(upload(b"raw"), "song.wav", "htdemucs_6s")
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::OutputMissing(_)));
        assert_eq!(err.failed_stage(), Some(JobStage::RelocateFailed));
        assert_eq!(catalog_len(&coordinator).await, 0);
    }

    #[tokio::test]
    async fn test_purge_policy_removes_upload_and_partial_output() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, PARTIAL_TOOL, true).await;

        let job = coordinator
            .accept_upload("song.wav", upload(b"raw"))
            .await
            .unwrap();
        let upload_path = job.upload_path.clone();
        let tool_dir = coordinator
            .layout()
            .tool_output_dir("htdemucs_6s", &upload_path);

        let err = coordinator.separate(job, "htdemucs_6s").await.unwrap_err();

        assert!(matches!(err, JobError::ProcessingFailed(_)));
        assert!(!upload_path.exists());
        assert!(!tool_dir.exists());
    }

    #[tokio::test]
    async fn test_invalid_model_rejected_before_tool_runs() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, FAKE_TOOL, false).await;

        let err = coordinator
            .process(upload(b"raw"), "song.wav", "../escape")
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::InvalidModel(_)));
        assert!(!dir.path().join("escape").exists());
        assert_eq!(catalog_len(&coordinator).await, 0);
    }

    #[tokio::test]
    async fn test_invalid_filename_rejected() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, FAKE_TOOL, false).await;

        let err = coordinator
            .accept_upload("uploads/", upload(b"raw"))
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::InvalidFilename(_)));
    }

    #[tokio::test]
    async fn test_concurrent_identical_uploads_are_isolated() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, FAKE_TOOL, false).await;

        let (a, b) = tokio::join!(
            coordinator.process(upload(b"one"), "same.mp3", "htdemucs_6s"),
            coordinator.process(upload(b"two"), "same.mp3", "htdemucs_6s"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.job_id, b.job_id);
        assert_ne!(a.record.id, b.record.id);
        assert_ne!(a.record.stems_path, b.record.stems_path);
        assert!(Path::new(&a.record.stems_path).is_dir());
        assert!(Path::new(&b.record.stems_path).is_dir());
        assert_eq!(catalog_len(&coordinator).await, 2);
    }

    #[tokio::test]
    async fn test_job_completes_after_caller_stops_waiting() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, SLOW_TOOL, false).await;
        let total_slots = coordinator.separator.available_slots();

        let gave_up = tokio::time::timeout(
            std::time::Duration::from_millis(300),
            coordinator.process(upload(b"audio"), "late.mp3", "htdemucs_6s"),
        )
        .await;
        assert!(gave_up.is_err());

        // The separation still occupies its slot while the tool runs
        assert_eq!(coordinator.separator.available_slots(), total_slots - 1);

        let mut waited = 0;
        while catalog_len(&coordinator).await == 0 && waited < 200 {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            waited += 1;
        }

        let mut session = coordinator.catalog.session().await.unwrap();
        let songs = session.list().await.unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].filename, "late.mp3");
        assert!(Path::new(&songs[0].stems_path).join("vocals.wav").is_file());
        assert_eq!(coordinator.separator.available_slots(), total_slots);
    }

    #[tokio::test]
    async fn test_stream_failure_purges_partial_upload() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, FAKE_TOOL, true).await;

        let broken = futures::stream::iter(vec![
            Ok(b"first chunk".as_slice()),
            Err("connection reset"),
        ]);
        let err = coordinator
            .accept_upload("song.wav", broken)
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Upload(LayoutError::Stream(_))));
        assert_eq!(upload_dir_len(&coordinator), 0);
    }

    #[tokio::test]
    async fn test_stream_failure_keeps_partial_upload_without_purge() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, FAKE_TOOL, false).await;

        let broken = futures::stream::iter(vec![
            Ok(b"first chunk".as_slice()),
            Err("connection reset"),
        ]);
        assert!(coordinator.accept_upload("song.wav", broken).await.is_err());
        assert_eq!(upload_dir_len(&coordinator), 1);
    }

    #[tokio::test]
    async fn test_abandon_follows_purge_policy() {
        let dir = TempDir::new().unwrap();
        let purging = test_coordinator(&dir, FAKE_TOOL, true).await;

        let job = purging.accept_upload("a.wav", upload(b"raw")).await.unwrap();
        let upload_path = job.upload_path.clone();
        purging.abandon(job).await;
        assert!(!upload_path.exists());

        let keep_dir = TempDir::new().unwrap();
        let keeping = test_coordinator(&keep_dir, FAKE_TOOL, false).await;
        let job = keeping.accept_upload("a.wav", upload(b"raw")).await.unwrap();
        let upload_path = job.upload_path.clone();
        keeping.abandon(job).await;
        assert!(upload_path.exists());
    }

    #[tokio::test]
    async fn test_relocate_error_is_purged() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, FAKE_TOOL, true).await;

        let job = coordinator
            .accept_upload("song.wav", upload(b"raw"))
            .await
            .unwrap();
        let upload_path = job.upload_path.clone();
        let tool_dir = coordinator
            .layout()
            .tool_output_dir("htdemucs_6s", &upload_path);

        // A non-empty directory already in the way makes the rename fail
        let blocker = coordinator.layout().job_dir("htdemucs_6s", job.job_id);
        std::fs::create_dir_all(&blocker).unwrap();
        std::fs::write(blocker.join("stale.wav"), b"x").unwrap();

        let err = coordinator.separate(job, "htdemucs_6s").await.unwrap_err();

        assert!(matches!(err, JobError::Io(_)));
        assert!(!upload_path.exists());
        assert!(!tool_dir.exists());
        assert_eq!(catalog_len(&coordinator).await, 0);
    }

    #[tokio::test]
    async fn test_empty_output_is_missing_and_not_catalogued() {
        let dir = TempDir::new().unwrap();
        let coordinator = test_coordinator(&dir, EMPTY_TOOL, false).await;

        let err = coordinator
            .process(upload(b"raw"), "song.wav", "htdemucs_6s")
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::OutputMissing(_)));
        assert_eq!(err.failed_stage(), Some(JobStage::RelocateFailed));
        assert_eq!(catalog_len(&coordinator).await, 0);
    }
}
