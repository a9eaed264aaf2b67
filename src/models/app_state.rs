use camino::Utf8PathBuf;
use chrono::{DateTime, Local};
use std::time::Duration;

use crate::models::job::CropMode;
use crate::services::discovery::DiscoveredProject;

/// Default number of export worker processes.
///
/// Each worker owns its own render engine instance, so this bounds both CPU
/// and memory use. Three keeps a typical office laptop responsive while an
/// export runs in the background; the count is adjustable in the settings
/// tab and [`crate::services::partition`] splits the project list to match.
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// Lifecycle of an export run.
///
/// Transitions are one-way within a run: `Idle` -> `Running` -> `Done`.
/// Starting a new run from `Done` goes back through `Running`. There is no
/// cancelled state; a run always plays out to its summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportPhase {
    Idle,
    Running,
    Done,
}

/// One finished export run, kept for the session's history panel.
#[derive(Clone, Debug)]
pub struct RunRecord {
    pub finished_at: DateTime<Local>,
    pub exported: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
    pub output_dir: Utf8PathBuf,
}

/// Single source of truth for everything the window shows.
///
/// Plain data on purpose. All access goes through
/// [`StateManager`](crate::state::StateManager), which holds the lock, diffs
/// mutations, and broadcasts [`StateChange`](crate::state::StateChange)
/// events; nothing else should ever see this struct mutably. The persisted
/// subset lives in [`Preferences`](crate::models::Preferences) and is folded
/// in at startup.
#[derive(Clone, Debug)]
pub struct AppState {
    // Mission configuration
    pub mission_root: Option<Utf8PathBuf>,
    pub output_dir: Option<Utf8PathBuf>,
    pub projects: Vec<DiscoveredProject>,
    pub is_root_configured: bool,

    // Export parameters
    pub crop_mode: CropMode,
    pub worker_count: usize,
    pub overwrite_existing: bool,
    pub dpi: u32,

    // Export progress
    pub phase: ExportPhase,
    pub current_project: Option<String>,
    pub current_operation: String,
    pub projects_done: usize,
    pub total_projects: usize,

    // Crop tallies for the current (or last) run
    pub crops_exported: usize,
    pub crops_failed: usize,
    pub crops_skipped: usize,
    pub last_elapsed: Option<Duration>,

    // Zoning analysis
    pub study_source: Option<Utf8PathBuf>,
    pub study_radius_m: f64,
    pub zoning_running: bool,
    pub last_workbook: Option<Utf8PathBuf>,

    // Historical imagery
    pub capture_running: bool,

    // Session run history, newest last
    pub history: Vec<RunRecord>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            // Mission configuration
            mission_root: None,
            output_dir: None,
            projects: Vec::new(),
            is_root_configured: false,

            // Export parameters
            crop_mode: CropMode::Both,
            worker_count: DEFAULT_WORKER_COUNT,
            overwrite_existing: false,
            dpi: 300,

            // Export progress
            phase: ExportPhase::Idle,
            current_project: None,
            current_operation: String::new(),
            projects_done: 0,
            total_projects: 0,

            // Crop tallies
            crops_exported: 0,
            crops_failed: 0,
            crops_skipped: 0,
            last_elapsed: None,

            // Zoning analysis
            study_source: None,
            study_radius_m: 5000.0,
            zoning_running: false,
            last_workbook: None,

            // Historical imagery
            capture_running: false,

            // Run history
            history: Vec::new(),
        }
    }
}

impl AppState {
    /// Check whether an export can be started right now.
    pub fn is_ready_for_export(&self) -> bool {
        self.is_root_configured && !self.projects.is_empty() && self.phase != ExportPhase::Running
    }

    /// Get current export tallies.
    ///
    /// Returns a tuple of (exported, failed, skipped, total projects).
    pub fn export_stats(&self) -> (usize, usize, usize, usize) {
        (
            self.crops_exported,
            self.crops_failed,
            self.crops_skipped,
            self.total_projects,
        )
    }

    /// Reset all per-run progress before a new export starts.
    pub fn reset_export_progress(&mut self) {
        self.current_project = None;
        self.current_operation.clear();
        self.projects_done = 0;
        self.total_projects = 0;
        self.crops_exported = 0;
        self.crops_failed = 0;
        self.crops_skipped = 0;
        self.last_elapsed = None;
    }

    /// Fold one finished project into the running tallies.
    pub fn add_project_result(&mut self, exported: usize, failed: usize, skipped: usize) {
        self.crops_exported += exported;
        self.crops_failed += failed;
        self.crops_skipped += skipped;
        self.projects_done += 1;
    }

    /// Formatted summary of the current tallies, empty before any result.
    pub fn tally_summary(&self) -> String {
        if self.crops_exported == 0 && self.crops_failed == 0 && self.crops_skipped == 0 {
            return String::new();
        }

        let mut parts = Vec::new();
        if self.crops_exported > 0 {
            parts.push(format!("{} exportées", self.crops_exported));
        }
        if self.crops_failed > 0 {
            parts.push(format!("{} en échec", self.crops_failed));
        }
        if self.crops_skipped > 0 {
            parts.push(format!("{} ignorées", self.crops_skipped));
        }
        parts.join(", ")
    }
}
