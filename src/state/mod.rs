// Shared application state behind a diff-and-notify facade.
//
// StateManager owns the single AppState instance. Every mutation goes through
// update(), which diffs old against new and broadcasts StateChange events, so
// the GUI reacts to changes instead of polling.

use crate::models::{
    AppState, ExportPhase, ExportSummary, Preferences, ProjectOutcome, RunRecord,
};
use crate::services::discovery::DiscoveredProject;
use camino::Utf8PathBuf;
use chrono::Local;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Events broadcast after a state mutation.
///
/// Subscribers (in practice the GUI controller) react to these; each event
/// carries just enough data to refresh the widgets it concerns.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Mission root has been set or cleared
    RootChanged {
        configured: bool,
    },

    /// The project list under the mission root has been rescanned
    ProjectsDiscovered {
        count: usize,
    },

    /// An export run has started
    ExportStarted {
        total_projects: usize,
    },

    /// The export run has finished
    ExportFinished {
        exported: usize,
        failed: usize,
        skipped: usize,
    },

    /// A project has been fully processed by a worker
    ProjectCompleted {
        project: String,
        exported: usize,
        failed: usize,
        skipped: usize,
    },

    /// Progress has been updated during an export run
    ProgressUpdated {
        current: usize,
        total: usize,
        current_project: Option<String>,
    },

    /// The operation label under the progress bar has changed
    OperationChanged {
        operation: String,
    },

    /// A zoning analysis has started or finished
    ZoningStateChanged {
        running: bool,
    },

    /// A historical imagery capture has started or finished
    CaptureStateChanged {
        running: bool,
    },

    /// One of the export settings has changed
    SettingsChanged,
}

/// Owner of the shared [`AppState`].
///
/// Keeps the state in `Arc<RwLock>` and pushes [`StateChange`] events through
/// a tokio broadcast channel whenever a mutation changes something observable.
/// Export start has its own guarded entry point,
/// [`try_begin_export`](Self::try_begin_export), so two triggers can never
/// race a second run into existence.
///
/// Cloning is cheap and every clone sees the same state, which is how the
/// workflows on the tokio runtime and the
/// [`GuiController`](crate::ui::controller::GuiController) share it.
pub struct StateManager {
    state: Arc<RwLock<AppState>>,

    /// Fan-out for change events; sending with no subscribers is fine.
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Fresh manager with default state and a 100-event broadcast buffer.
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Clone of the full current state.
    ///
    /// No lock is held once this returns. Prefer [`read`](Self::read) when a
    /// single field is enough.
    pub fn snapshot(&self) -> AppState {
        self.state.read().unwrap().clone()
    }

    /// Run a closure against the state under the read lock.
    ///
    /// ```ignore
    /// let ready = state.read(|s| s.is_ready_for_export());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Mutate the state and broadcast whatever changed.
    ///
    /// The closure runs under the write lock. Afterwards the new state is
    /// diffed against the old one and one event per observable difference is
    /// sent to subscribers and returned to the caller.
    ///
    /// ```ignore
    /// state.update(|s| s.zoning_running = true);
    /// ```
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap();
        let old_state = state.clone();

        update_fn(&mut state);
        crate::metrics::global().record_state_update();

        let changes = self.detect_changes(&old_state, &state);
        for change in &changes {
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// New receiver for all future change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Diff two states into the events subscribers care about.
    fn detect_changes(&self, old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        // Mission root changes
        if old.mission_root != new.mission_root || old.is_root_configured != new.is_root_configured
        {
            changes.push(StateChange::RootChanged {
                configured: new.is_root_configured,
            });
        }

        // Project list changes
        if old.projects != new.projects {
            changes.push(StateChange::ProjectsDiscovered {
                count: new.projects.len(),
            });
        }

        // Export phase transitions
        if old.phase != new.phase {
            if new.phase == ExportPhase::Running {
                changes.push(StateChange::ExportStarted {
                    total_projects: new.total_projects,
                });
            } else if old.phase == ExportPhase::Running {
                changes.push(StateChange::ExportFinished {
                    exported: new.crops_exported,
                    failed: new.crops_failed,
                    skipped: new.crops_skipped,
                });
            }
        }

        // Batch progress
        if old.projects_done != new.projects_done
            || old.total_projects != new.total_projects
            || old.current_project != new.current_project
        {
            changes.push(StateChange::ProgressUpdated {
                current: new.projects_done,
                total: new.total_projects,
                current_project: new.current_project.clone(),
            });
        }

        // Operation label
        if old.current_operation != new.current_operation {
            changes.push(StateChange::OperationChanged {
                operation: new.current_operation.clone(),
            });
        }

        // Zoning and capture activity changes
        if old.zoning_running != new.zoning_running {
            changes.push(StateChange::ZoningStateChanged {
                running: new.zoning_running,
            });
        }
        if old.capture_running != new.capture_running {
            changes.push(StateChange::CaptureStateChanged {
                running: new.capture_running,
            });
        }

        // Export settings
        if old.crop_mode != new.crop_mode
            || old.worker_count != new.worker_count
            || old.overwrite_existing != new.overwrite_existing
            || old.dpi != new.dpi
            || old.study_radius_m != new.study_radius_m
        {
            changes.push(StateChange::SettingsChanged);
        }

        changes
    }

    // Named mutations used by the controller and the workflows

    /// Set the mission root and update configuration status
    pub fn set_mission_root(&self, root: Option<Utf8PathBuf>) -> Vec<StateChange> {
        self.update(|state| {
            state.mission_root = root.clone();
            state.is_root_configured = root.is_some();
            if root.is_none() {
                state.projects.clear();
                state.output_dir = None;
            }
        })
    }

    /// Replace the discovered project list
    pub fn set_projects(&self, projects: Vec<DiscoveredProject>) -> Vec<StateChange> {
        self.update(|state| {
            state.projects = projects;
        })
    }

    /// Begin an export run, unless one is already running
    ///
    /// This is the double-start guard: the check and the transition to
    /// [`ExportPhase::Running`] happen under a single write lock, so two
    /// concurrent callers can never both start a run.
    ///
    /// # Returns
    /// The emitted events, or `None` when an export is already in progress.
    pub fn try_begin_export(&self, total_projects: usize) -> Option<Vec<StateChange>> {
        let mut state = self.state.write().unwrap();
        if state.phase == ExportPhase::Running {
            return None;
        }

        let old_state = state.clone();
        state.reset_export_progress();
        state.phase = ExportPhase::Running;
        state.total_projects = total_projects;
        state.current_operation = "Démarrage de l'export...".to_string();
        crate::metrics::global().record_state_update();

        let changes = self.detect_changes(&old_state, &state);
        for change in &changes {
            let _ = self.state_tx.send(change.clone());
        }

        Some(changes)
    }

    /// Finish the current export run and record it in the session history
    pub fn finish_export(&self, summary: &ExportSummary) -> Vec<StateChange> {
        self.update(|state| {
            state.phase = ExportPhase::Done;
            state.current_project = None;
            state.current_operation.clear();
            state.last_elapsed = Some(summary.elapsed);
            state.history.push(RunRecord {
                finished_at: Local::now(),
                exported: summary.exported,
                failed: summary.failed,
                skipped: summary.skipped,
                elapsed: summary.elapsed,
                output_dir: state.output_dir.clone().unwrap_or_default(),
            });
        })
    }

    /// Set the project and operation labels shown during a run
    pub fn update_progress(&self, project: String, operation: String) -> Vec<StateChange> {
        self.update(|state| {
            state.current_project = Some(project);
            state.current_operation = operation;
        })
    }

    /// Record the outcome of one fully processed project
    ///
    /// Folds the per-crop tallies into the running totals and emits a
    /// [`StateChange::ProjectCompleted`] event with the project's name.
    pub fn record_outcome(&self, outcome: &ProjectOutcome) -> Vec<StateChange> {
        let exported = outcome.exported();
        let failed = outcome.failed();
        let skipped = outcome.skipped();

        let mut changes = self.update(|state| {
            state.current_project = Some(outcome.name.clone());
            state.add_project_result(exported, failed, skipped);
        });

        let project_event = StateChange::ProjectCompleted {
            project: outcome.name.clone(),
            exported,
            failed,
            skipped,
        };

        let _ = self.state_tx.send(project_event.clone());
        changes.push(project_event);

        changes
    }

    /// Toggle the zoning analysis activity flag
    pub fn set_zoning_running(&self, running: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.zoning_running = running;
        })
    }

    /// Finish a zoning analysis, remembering the workbook it produced
    pub fn finish_zoning(&self, workbook: Option<Utf8PathBuf>) -> Vec<StateChange> {
        self.update(|state| {
            state.zoning_running = false;
            if workbook.is_some() {
                state.last_workbook = workbook.clone();
            }
        })
    }

    /// Toggle the historical imagery capture activity flag
    pub fn set_capture_running(&self, running: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.capture_running = running;
        })
    }

    /// Apply a settings mutation through the usual diff path
    pub fn update_settings<F>(&self, settings_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        self.update(settings_fn)
    }

    /// Seed the state from the per-user preferences file.
    ///
    /// Restores the last mission root when one was saved, plus the export
    /// parameters. Worker count is clamped to at least one.
    pub fn apply_preferences(&self, preferences: &Preferences) -> Vec<StateChange> {
        self.update(|state| {
            if !preferences.mission_root.is_empty() {
                state.mission_root = Some(Utf8PathBuf::from(&preferences.mission_root));
                state.is_root_configured = true;
            }

            state.crop_mode = preferences.crop_mode;
            state.worker_count = preferences.worker_count.max(1);
            state.overwrite_existing = preferences.overwrite_existing;
            state.dpi = preferences.dpi;
            state.study_radius_m = preferences.study_radius_m;

            tracing::info!(
                "Loaded preferences: root={}, crops={:?}, workers={}, overwrite={}, dpi={}",
                state.is_root_configured,
                state.crop_mode,
                state.worker_count,
                state.overwrite_existing,
                state.dpi
            );
        })
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same state and broadcast channel.
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
