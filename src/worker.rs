//! Zonatlas worker - renders one chunk of projects through the GIS engine
//!
//! The GUI spawns one of these per chunk. The job arrives as a JSON line on
//! stdin; one outcome line per project leaves on stdout as soon as that
//! project is done, so the coordinator can fold progress in completion order.
//! Logging goes to stderr to keep stdout clean for the outcome stream.
//!
//! The process exits 0 even when individual projects fail: render failures
//! are data, carried inside the outcome lines. A non-zero exit means the
//! worker itself could not run (unreadable job, engine missing, double
//! acquisition).
//!
//! The engine bindings are synchronous, so this binary carries no async
//! runtime at all. Concurrency lives in the GUI process, which runs several
//! workers side by side.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use zonatlas::models::ChunkJob;
use zonatlas::services::bootstrap;
use zonatlas::services::engine::EngineSession;
use zonatlas::services::export::export_project;

fn main() -> Result<()> {
    zonatlas::logging::setup_worker_logging(false);

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Job could not be read from stdin")?;
    let job: ChunkJob =
        serde_json::from_str(input.trim()).context("Job is not a valid chunk description")?;

    tracing::info!(
        projects = job.projects.len(),
        output_dir = %job.export.output_dir,
        "Worker starting"
    );

    bootstrap::prepare_engine_env(&job.engine).context("Engine environment setup failed")?;

    let mut session =
        EngineSession::acquire(&job.engine).context("Engine session could not be started")?;

    let stdout = std::io::stdout();
    for project in &job.projects {
        let outcome = export_project(session.engine(), &job.export, project);

        // One line per project, flushed immediately: the coordinator streams
        // these for live progress.
        let line =
            serde_json::to_string(&outcome).context("Outcome could not be serialized")?;
        let mut handle = stdout.lock();
        writeln!(handle, "{line}").context("Outcome could not be written")?;
        handle.flush().context("Outcome stream could not be flushed")?;
    }

    tracing::info!("Worker finished");
    Ok(())
}
