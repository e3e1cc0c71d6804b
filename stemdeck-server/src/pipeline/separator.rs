//! External source-separation tool invocation
//!
//! Runs `<program> <args...> -n <model> -o <output_root> <input>` as a child process. The
//! call blocks for as long as the tool runs (seconds to minutes), so it executes on tokio's
//! blocking thread pool behind a semaphore that caps how many separations run at once.
//! Request handling threads stay free while a job is in flight.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use stemdeck_common::config::SeparationConfig;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Bytes of stderr kept for diagnostics when the tool fails
const STDERR_TAIL_BYTES: usize = 2048;

/// Separation failures
#[derive(Debug, Error)]
pub enum SeparationError {
    /// Process could not be started (missing binary, permissions, ...)
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Process ran and reported failure
    #[error("Separation tool failed ({status}): {stderr_tail}")]
    Exited { status: String, stderr_tail: String },

    /// Worker task or concurrency limiter failed
    #[error("Separation worker failed: {0}")]
    Worker(String),
}

/// Launcher for the external separation tool
#[derive(Debug, Clone)]
pub struct Separator {
    program: String,
    args: Vec<String>,
    permits: Arc<Semaphore>,
}

impl Separator {
    pub fn new(config: &SeparationConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
        }
    }

    /// Full argument list passed to the program
    pub fn command_args(&self, model: &str, output_root: &Path, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.push("-n".into());
        args.push(model.into());
        args.push("-o".into());
        args.push(output_root.as_os_str().to_owned());
        args.push(input.as_os_str().to_owned());
        args
    }

    /// Separation slots not currently in use
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one separation to completion
    ///
    /// Waits for a free slot, then runs the tool on the blocking pool. Non-zero exit and
    /// launch failure are both errors; output is not interpreted beyond that. The slot is
    /// held until the process exits, even if the returned future is dropped first.
    pub async fn run(
        &self,
        model: &str,
        output_root: &Path,
        input: &Path,
    ) -> Result<(), SeparationError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SeparationError::Worker(format!("Concurrency limiter closed: {}", e)))?;

        let program = self.program.clone();
        let args = self.command_args(model, output_root, input);

        tracing::debug!(
            program = %program,
            model = %model,
            input = %input.display(),
            "Launching separation tool"
        );
        let started = std::time::Instant::now();

        // The permit travels with the child process: dropping this future does not stop the
        // tool, so the slot must stay taken until it exits.
        let output = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .output()
        })
        .await
        .map_err(|e| SeparationError::Worker(format!("Task join error: {}", e)))?
        .map_err(|source| SeparationError::Launch {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(SeparationError::Exited {
                status: output.status.to_string(),
                stderr_tail: stderr_tail(&output.stderr),
            });
        }

        tracing::info!(
            model = %model,
            input = %input.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Separation tool finished"
        );

        Ok(())
    }
}

/// Last few KiB of stderr, lossily decoded and trimmed
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
