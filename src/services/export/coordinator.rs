//! Chunk fan-out across worker processes.
//!
//! The coordinator splits the project list into contiguous chunks, spawns
//! one `zonatlas-worker` per chunk and streams their per-project outcome
//! lines back as they arrive. Workers are isolated by process: a crash
//! loses nothing beyond the unreported projects of its own chunk, and those
//! come back as synthesized failures.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::models::catalog::EngineConfig;
use crate::models::job::{ChunkJob, ExportConfig, ExportSummary, ProjectOutcome};
use crate::services::engine::driver::EXE_SUFFIX;
use crate::services::partition::partition;

/// Worker executable name, expected next to the main binary.
pub const WORKER_EXE_STEM: &str = "zonatlas-worker";

/// Callback fired once per finished project, from whichever chunk finishes
/// it. Runs on worker reader tasks, so it must be cheap and thread-safe.
pub type ProgressFn = Arc<dyn Fn(&ProjectOutcome) + Send + Sync>;

#[derive(Debug, Error)]
pub enum CoordError {
    #[error("worker executable not found at {0}")]
    WorkerMissing(Utf8PathBuf),

    #[error("current executable path is not valid UTF-8")]
    ExePath,

    #[error("could not resolve current executable: {0}")]
    CurrentExe(#[from] std::io::Error),

    #[error("could not create output directory {path}: {source}")]
    OutputDir {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
}

/// Spawns and supervises the batch of worker processes for one export run.
pub struct ExportCoordinator {
    worker_exe: Utf8PathBuf,
}

impl ExportCoordinator {
    /// Resolve the worker executable next to the running binary.
    pub fn from_current_exe() -> Result<Self, CoordError> {
        let current = std::env::current_exe()?;
        let sibling = current.with_file_name(format!("{WORKER_EXE_STEM}{EXE_SUFFIX}"));
        let worker_exe = Utf8PathBuf::from_path_buf(sibling).map_err(|_| CoordError::ExePath)?;
        if !worker_exe.is_file() {
            return Err(CoordError::WorkerMissing(worker_exe));
        }
        Ok(Self { worker_exe })
    }

    /// Use an explicit worker executable.
    pub fn with_worker_exe(worker_exe: Utf8PathBuf) -> Self {
        Self { worker_exe }
    }

    /// Run the whole batch and return the merged summary.
    ///
    /// `workers` is clamped to the number of projects by the partitioner.
    /// `on_progress` fires once per project, in completion order across all
    /// chunks. The run itself only fails on setup problems; render and
    /// worker failures land in the summary instead.
    pub async fn run(
        &self,
        export: &ExportConfig,
        engine: &EngineConfig,
        projects: Vec<Utf8PathBuf>,
        workers: usize,
        on_progress: ProgressFn,
    ) -> Result<ExportSummary, CoordError> {
        let started = Instant::now();
        std::fs::create_dir_all(export.output_dir.as_std_path()).map_err(|source| {
            CoordError::OutputDir {
                path: export.output_dir.clone(),
                source,
            }
        })?;

        let chunks = partition(&projects, workers);
        info!(
            projects = projects.len(),
            chunks = chunks.len(),
            worker = %self.worker_exe,
            "Starting export batch"
        );

        let mut handles = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.into_iter().enumerate() {
            let job = ChunkJob {
                engine: engine.clone(),
                export: export.clone(),
                projects: chunk.clone(),
            };
            let worker_exe = self.worker_exe.clone();
            let progress = Arc::clone(&on_progress);
            let handle =
                tokio::spawn(async move { run_chunk(index, worker_exe, job, progress).await });
            handles.push((chunk, handle));
        }

        let mut summary = ExportSummary::default();
        for (chunk, handle) in handles {
            match handle.await {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        summary.absorb(outcome);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Worker supervision task aborted");
                    for project in &chunk {
                        let outcome = ProjectOutcome::all_failed(
                            project,
                            export.mode,
                            "worker supervision aborted",
                        );
                        on_progress(&outcome);
                        summary.absorb(outcome);
                    }
                }
            }
        }
        summary.elapsed = started.elapsed();
        info!(
            exported = summary.exported,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_secs = summary.elapsed.as_secs(),
            "Export batch finished"
        );
        Ok(summary)
    }
}

/// Drive one worker process through its chunk.
///
/// Returns one outcome per project of the chunk, reported or synthesized.
async fn run_chunk(
    index: usize,
    worker_exe: Utf8PathBuf,
    job: ChunkJob,
    on_progress: ProgressFn,
) -> Vec<ProjectOutcome> {
    let payload = match serde_json::to_string(&job) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(chunk = index, error = %err, "Chunk job could not be encoded");
            return fail_remaining(
                &job,
                &HashSet::new(),
                &format!("job encoding failed: {err}"),
                &on_progress,
            );
        }
    };

    debug!(chunk = index, projects = job.projects.len(), "Spawning worker");
    let mut child = match Command::new(worker_exe.as_std_path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(chunk = index, error = %err, "Worker failed to spawn");
            return fail_remaining(
                &job,
                &HashSet::new(),
                &format!("worker failed to spawn: {err}"),
                &on_progress,
            );
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        let mut line = payload;
        line.push('\n');
        if let Err(err) = stdin.write_all(line.as_bytes()).await {
            warn!(chunk = index, error = %err, "Could not send job to worker");
        }
        if let Err(err) = stdin.shutdown().await {
            debug!(chunk = index, error = %err, "Worker stdin shutdown failed");
        }
    }

    // Drain stderr concurrently so worker logging cannot fill the pipe and
    // stall a render mid-chunk.
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(chunk = index, "worker: {line}");
            }
        });
    }

    let mut reported = HashSet::new();
    let mut outcomes = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ProjectOutcome>(line) {
                        Ok(outcome) => {
                            reported.insert(outcome.project.clone());
                            on_progress(&outcome);
                            outcomes.push(outcome);
                        }
                        Err(err) => {
                            warn!(chunk = index, error = %err, "Unparseable worker line: {line}");
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(chunk = index, error = %err, "Worker stdout read failed");
                    break;
                }
            }
        }
    }

    let status_text = match child.wait().await {
        Ok(status) if status.success() => None,
        Ok(status) => Some(format!("worker exited with {status}")),
        Err(err) => Some(format!("worker could not be reaped: {err}")),
    };

    if reported.len() < job.projects.len() {
        let reason = status_text.unwrap_or_else(|| "worker closed its output early".to_string());
        warn!(
            chunk = index,
            missing = job.projects.len() - reported.len(),
            reason = %reason,
            "Worker finished without reporting every project"
        );
        outcomes.extend(fail_remaining(&job, &reported, &reason, &on_progress));
    } else if let Some(reason) = status_text {
        debug!(chunk = index, reason = %reason, "Worker exit status after full report");
    }

    outcomes
}

/// One failed outcome per chunk project that never got reported.
fn fail_remaining(
    job: &ChunkJob,
    reported: &HashSet<Utf8PathBuf>,
    message: &str,
    on_progress: &ProgressFn,
) -> Vec<ProjectOutcome> {
    let mut synthesized = Vec::new();
    for project in &job.projects {
        if reported.contains(project) {
            continue;
        }
        let outcome = ProjectOutcome::all_failed(project, job.export.mode, message);
        on_progress(&outcome);
        synthesized.push(outcome);
    }
    synthesized
}
