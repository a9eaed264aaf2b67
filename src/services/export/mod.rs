//! Batch map export pipeline.
//!
//! `coordinator` fans a run out across worker processes, `project` is the
//! routine each worker runs per project. The two halves meet at the
//! JSON-lines job/outcome types in [`crate::models::job`].

pub mod coordinator;
pub mod project;

pub use coordinator::{CoordError, ExportCoordinator, ProgressFn, WORKER_EXE_STEM};
pub use project::export_project;
