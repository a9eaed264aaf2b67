// Glue between the Slint window and everything behind it.
//
// The controller wires MainWindow callbacks to the export, zoning and
// capture workflows, subscribes to StateManager events to keep the widgets
// current, and owns the native file pickers. All UI text is French; logs
// stay English.

use crate::config::ConfigManager;
use crate::models::{
    AppState, CatalogConfig, CropMode, EngineConfig, ExportConfig, ExportPhase, ExportSummary,
};
use crate::services::coords::CoordinateParser;
use crate::services::discovery::ProjectDiscoverer;
use crate::services::export::{ExportCoordinator, ProgressFn};
use crate::services::geoservices::GeoClient;
use crate::services::imagery::{ImageryBrowser, parse_years};
use crate::services::report::{write_history_document, write_zoning_workbook};
use crate::services::zoning::{resolve_study_source, run_zoning};
use crate::state::{StateChange, StateManager};
use crate::ui::bridge::{UiBridge, UiHandle};
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use slint::Model;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

slint::include_modules!();

/// Coordinator for the GUI layer.
///
/// Construction wires everything (initial widget values, callbacks, the
/// state subscription); [`run`](Self::run) then just hands the main thread
/// to Slint. Fields are kept only to pin lifetimes: the window must outlive
/// its callbacks and the bridge must outlive its pump thread.
///
/// ```ignore
/// let controller = GuiController::new(state, config, catalog, runtime.handle().clone())?;
/// controller.run()?;  // blocks until the window closes
/// ```
pub struct GuiController {
    ui: MainWindow,
    _bridge: UiBridge<MainWindow>,
    _state_manager: Arc<StateManager>,
    _config_manager: Arc<ConfigManager>,
    _catalog: Arc<CatalogConfig>,
}

impl GuiController {
    /// Build the window and wire callbacks, initial values, and the state
    /// subscription.
    pub fn new(
        state_manager: Arc<StateManager>,
        config_manager: Arc<ConfigManager>,
        catalog: Arc<CatalogConfig>,
        tokio_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Slint window creation failed")?;
        let bridge = UiBridge::new(&ui, tokio_handle);

        Self::sync_ui_with_state(&ui, &state_manager, &config_manager);
        Self::setup_callbacks(&ui, &bridge, &state_manager, &config_manager, &catalog);
        Self::setup_state_subscription(&bridge, &state_manager);

        tracing::info!("GUI controller ready");

        Ok(Self {
            ui,
            _bridge: bridge,
            _state_manager: state_manager,
            _config_manager: config_manager,
            _catalog: catalog,
        })
    }

    /// Hand the main thread to Slint until the user closes the window.
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Entering Slint event loop");
        self.ui.run()
    }

    /// One-time widget initialization from the restored state.
    fn sync_ui_with_state(
        ui: &MainWindow,
        state_manager: &StateManager,
        config_manager: &ConfigManager,
    ) {
        let state = state_manager.snapshot();

        // Mission and project list
        ui.set_mission_root(
            state
                .mission_root
                .as_ref()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default()
                .into(),
        );
        let names: Vec<slint::SharedString> = state
            .projects
            .iter()
            .map(|p| p.name.as_str().into())
            .collect();
        ui.set_project_names(Rc::new(slint::VecModel::from(names)).into());
        ui.set_project_count(state.projects.len() as i32);

        // Export settings
        ui.set_crop_mode_index(state.crop_mode.index());
        ui.set_worker_count(state.worker_count as i32);
        ui.set_overwrite_existing(state.overwrite_existing);
        ui.set_dpi(state.dpi as i32);

        // Runtime state
        ui.set_is_exporting(state.phase == ExportPhase::Running);
        ui.set_export_ready(state.is_ready_for_export());
        ui.set_progress_current(state.projects_done as i32);
        ui.set_progress_total(state.total_projects as i32);
        ui.set_current_project(state.current_project.clone().unwrap_or_default().into());

        // Results
        ui.set_exported_count(state.crops_exported as i32);
        ui.set_failed_count(state.crops_failed as i32);
        ui.set_skipped_count(state.crops_skipped as i32);

        // Zoning tab
        ui.set_radius_m(state.study_radius_m as i32);
        ui.set_zoning_running(state.zoning_running);
        ui.set_workbook_path(
            state
                .last_workbook
                .as_ref()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default()
                .into(),
        );

        // Capture tab
        ui.set_capture_running(state.capture_running);

        // Preferences tab
        ui.set_data_dir(config_manager.data_dir().as_str().into());
        ui.set_preferences_path(config_manager.preferences_path().as_str().into());
        let preferences = config_manager.load_preferences();
        ui.set_plantnet_key(preferences.plantnet_api_key.into());

        ui.set_status_message(Self::ready_status(&state).into());

        tracing::debug!("Widgets seeded from restored state");
    }

    /// Connect every window callback to its workflow or mutation.
    fn setup_callbacks(
        ui: &MainWindow,
        bridge: &UiBridge<MainWindow>,
        state_manager: &Arc<StateManager>,
        config_manager: &Arc<ConfigManager>,
        catalog: &Arc<CatalogConfig>,
    ) {
        // One discoverer shared by the browse and refresh callbacks so the
        // scan cache survives between clicks.
        let discoverer = Arc::new(ProjectDiscoverer::new(
            &catalog.data.engine.project_extensions,
        ));

        let state = state_manager.clone();
        let discoverer_clone = Arc::clone(&discoverer);

        // Browse mission root callback
        ui.on_browse_mission_root(move || {
            tracing::debug!("Browse mission root clicked");

            if let Some(root) = Self::show_folder_picker("Choisir le dossier de mission") {
                tracing::info!("Mission root selected: {}", root);
                state.set_mission_root(Some(root.clone()));

                let projects = discoverer_clone.discover(&root);
                state.set_projects(projects);
            }
        });

        let state = state_manager.clone();
        let discoverer_clone = Arc::clone(&discoverer);

        // Refresh projects callback - bypasses the scan cache
        ui.on_refresh_projects(move || {
            tracing::debug!("Refresh projects clicked");

            let root = state.read(|s| s.mission_root.clone());
            match root {
                Some(root) => {
                    let projects = discoverer_clone.refresh(&root);
                    state.set_projects(projects);
                }
                None => {
                    tracing::debug!("No mission root configured - nothing to refresh");
                }
            }
        });

        let bridge_handle = bridge.handle();
        let state_manager_clone = state_manager.clone();
        let catalog_clone = Arc::clone(catalog);
        let ui_weak_for_start = ui.as_weak();

        // Start export callback
        ui.on_start_export(move || {
            tracing::info!("Start export button clicked");

            let ui = match ui_weak_for_start.upgrade() {
                Some(ui) => ui,
                None => return,
            };

            // Pull the widget values into state before anything else so the
            // run uses what is on screen, not what was last saved.
            let mode = CropMode::from_index(ui.get_crop_mode_index());
            let workers = ui.get_worker_count().max(1) as usize;
            let overwrite = ui.get_overwrite_existing();
            let dpi = ui.get_dpi().max(1) as u32;
            state_manager_clone.update_settings(|s| {
                s.crop_mode = mode;
                s.worker_count = workers;
                s.overwrite_existing = overwrite;
                s.dpi = dpi;
            });

            let (root, projects) =
                state_manager_clone.read(|s| (s.mission_root.clone(), s.projects.clone()));

            let root = match root {
                Some(root) => root,
                None => {
                    Self::show_error_dialog(
                        &ui_weak_for_start,
                        "Mission non configurée",
                        "Sélectionnez d'abord un dossier de mission.",
                        "",
                    );
                    return;
                }
            };

            if projects.is_empty() {
                Self::show_error_dialog(
                    &ui_weak_for_start,
                    "Aucun projet",
                    "Aucun projet cartographique n'a été trouvé dans ce dossier.",
                    "",
                );
                return;
            }

            // Single-flight guard: a second click while a run is in progress
            // is ignored
            if state_manager_clone.try_begin_export(projects.len()).is_none() {
                tracing::warn!("Export already running - ignoring start request");
                return;
            }

            let defaults = &catalog_clone.data.export;
            let output_dir = root.join(&defaults.output_subdir);
            let export = ExportConfig {
                output_dir: output_dir.clone(),
                mode,
                overwrite,
                dpi,
                margin_wide: defaults.margin_wide,
                margin_core: defaults.margin_core,
                study_layer: catalog_clone.data.layers.study_area.clone(),
                core_layer: catalog_clone.data.layers.core_area.clone(),
            };
            state_manager_clone.update(|s| {
                s.output_dir = Some(output_dir);
            });

            let engine = catalog_clone.data.engine.clone();
            let paths: Vec<Utf8PathBuf> = projects.iter().map(|p| p.path.clone()).collect();

            let bridge = bridge_handle.clone();
            let state = state_manager_clone.clone();

            // Spawn async export workflow
            bridge_handle.spawn_async(move || async move {
                match Self::run_export_workflow(Arc::clone(&state), engine, export, paths, workers)
                    .await
                {
                    Ok(summary) => {
                        tracing::info!(
                            exported = summary.exported,
                            failed = summary.failed,
                            skipped = summary.skipped,
                            "Export batch finished"
                        );
                    }
                    Err(e) => {
                        tracing::error!("Export workflow error: {:#}", e);

                        // Unstick the UI: leaving the Running phase emits the
                        // finished event the subscription thread listens for
                        state.update(|s| {
                            s.phase = ExportPhase::Idle;
                            s.current_project = None;
                            s.current_operation.clear();
                        });

                        Self::show_error_dialog_deferred(
                            &bridge,
                            "Échec de l'export",
                            "L'export des cartes n'a pas pu aboutir.",
                            format!("{:?}", e),
                        );
                    }
                }
            });
        });

        let state = state_manager.clone();
        let ui_weak = ui.as_weak();

        // Browse study source callback
        ui.on_browse_study_source(move || {
            tracing::debug!("Browse study source clicked");

            if let Some(path) = Self::show_file_picker(
                "Choisir la couche d'étude",
                vec![("Couches géographiques", &["shp", "geojson", "json"])],
            ) {
                tracing::info!("Study source selected: {}", path);
                state.update_settings(|s| {
                    s.study_source = Some(path.clone());
                });
                if let Some(ui) = ui_weak.upgrade() {
                    ui.set_study_source(path.as_str().into());
                }
            }
        });

        let bridge_handle = bridge.handle();
        let state_manager_clone = state_manager.clone();
        let catalog_clone = Arc::clone(catalog);
        let ui_weak_for_zoning = ui.as_weak();

        // Run zoning analysis callback
        ui.on_run_zoning(move || {
            tracing::info!("Run zoning button clicked");

            let ui = match ui_weak_for_zoning.upgrade() {
                Some(ui) => ui,
                None => return,
            };

            if state_manager_clone.read(|s| s.zoning_running) {
                tracing::warn!("Zoning already running - ignoring start request");
                return;
            }

            let source_text = ui.get_study_source().to_string();
            if source_text.trim().is_empty() {
                Self::show_error_dialog(
                    &ui_weak_for_zoning,
                    "Zone d'étude manquante",
                    "Indiquez un fichier de zone d'étude ou un point (lat, lon).",
                    "",
                );
                return;
            }

            let radius_m = f64::from(ui.get_radius_m().max(1));
            state_manager_clone.update_settings(|s| {
                s.study_radius_m = radius_m;
            });

            let output_dir = state_manager_clone.read(|s| s.mission_root.clone());

            state_manager_clone.set_zoning_running(true);
            ui.set_zoning_status("Analyse en cours...".into());

            let bridge = bridge_handle.clone();
            let state = state_manager_clone.clone();
            let catalog = Arc::clone(&catalog_clone);

            bridge_handle.spawn_async(move || async move {
                match Self::run_zoning_workflow(
                    Arc::clone(&state),
                    catalog,
                    source_text,
                    radius_m,
                    output_dir,
                )
                .await
                {
                    Ok((path, hits)) => {
                        tracing::info!(workbook = %path, hits, "Zoning workbook written");
                        let status =
                            format!("Classeur écrit : {} ({} zonages recensés)", path, hits);
                        bridge.update_ui(move |ui| {
                            ui.set_zoning_status(status.as_str().into());
                        });
                    }
                    Err(e) => {
                        tracing::error!("Zoning workflow error: {:#}", e);
                        state.finish_zoning(None);
                        bridge.update_ui(|ui| {
                            ui.set_zoning_status("Échec de l'analyse.".into());
                        });
                        Self::show_error_dialog_deferred(
                            &bridge,
                            "Échec de l'analyse",
                            "L'analyse des zonages n'a pas pu aboutir.",
                            format!("{:?}", e),
                        );
                    }
                }
            });
        });

        let state = state_manager.clone();

        // Open workbook callback - hand the file to the system shell
        ui.on_open_workbook(move || {
            tracing::debug!("Open workbook clicked");

            match state.read(|s| s.last_workbook.clone()) {
                Some(path) => Self::open_in_shell(&path),
                None => tracing::debug!("No workbook written yet - nothing to open"),
            }
        });

        let bridge_handle = bridge.handle();
        let state_manager_clone = state_manager.clone();
        let catalog_clone = Arc::clone(catalog);
        let ui_weak_for_capture = ui.as_weak();

        // Build history document callback
        ui.on_build_history(move || {
            tracing::info!("Build history button clicked");

            let ui = match ui_weak_for_capture.upgrade() {
                Some(ui) => ui,
                None => return,
            };

            if state_manager_clone.read(|s| s.capture_running) {
                tracing::warn!("Capture already running - ignoring start request");
                return;
            }

            // Parse the inputs up front so a typo fails before the browser
            // ever launches
            let parser = CoordinateParser::new();
            let (lat, lon) = match parser.parse_point(&ui.get_site_coordinates()) {
                Ok(point) => point,
                Err(e) => {
                    Self::show_error_dialog(
                        &ui_weak_for_capture,
                        "Coordonnées invalides",
                        "Le point du site n'a pas pu être lu.",
                        e.to_string(),
                    );
                    return;
                }
            };

            let years = parse_years(&ui.get_capture_years());
            if years.is_empty() {
                Self::show_error_dialog(
                    &ui_weak_for_capture,
                    "Années invalides",
                    "Aucune année exploitable dans la liste.",
                    "",
                );
                return;
            }

            let output_dir = match state_manager_clone.read(|s| s.mission_root.clone()) {
                Some(root) => root,
                None => {
                    Self::show_error_dialog(
                        &ui_weak_for_capture,
                        "Mission non configurée",
                        "Sélectionnez d'abord un dossier de mission pour y écrire le document.",
                        "",
                    );
                    return;
                }
            };

            state_manager_clone.set_capture_running(true);
            ui.set_capture_status("Préparation de la capture...".into());

            let bridge = bridge_handle.clone();
            let state = state_manager_clone.clone();
            let catalog = Arc::clone(&catalog_clone);

            bridge_handle.spawn_async(move || async move {
                let result =
                    Self::run_capture_workflow(bridge.clone(), catalog, lat, lon, years, output_dir)
                        .await;

                state.set_capture_running(false);

                match result {
                    Ok((path, captured)) => {
                        tracing::info!(document = %path, captured, "History document written");
                        let status =
                            format!("Document écrit : {} ({} vues capturées)", path, captured);
                        bridge.update_ui(move |ui| {
                            ui.set_capture_status(status.as_str().into());
                        });
                    }
                    Err(e) => {
                        tracing::error!("Capture workflow error: {:#}", e);
                        bridge.update_ui(|ui| {
                            ui.set_capture_status("Échec de la capture.".into());
                        });
                        Self::show_error_dialog_deferred(
                            &bridge,
                            "Échec de la capture",
                            "Le document de comparaison n'a pas pu être produit.",
                            format!("{:?}", e),
                        );
                    }
                }
            });
        });

        let state = state_manager.clone();
        let config = Arc::clone(config_manager);
        let ui_weak = ui.as_weak();

        // Save preferences callback
        ui.on_save_preferences(move || {
            tracing::info!("Save preferences button clicked");

            let ui = match ui_weak.upgrade() {
                Some(ui) => ui,
                None => return,
            };

            // Load first so unknown keys in the file survive the rewrite
            let mut preferences = config.load_preferences();
            preferences.crop_mode = CropMode::from_index(ui.get_crop_mode_index());
            preferences.worker_count = ui.get_worker_count().max(1) as usize;
            preferences.overwrite_existing = ui.get_overwrite_existing();
            preferences.dpi = ui.get_dpi().max(1) as u32;
            preferences.study_radius_m = f64::from(ui.get_radius_m().max(1));
            preferences.plantnet_api_key = ui.get_plantnet_key().to_string();
            preferences.mission_root = state
                .read(|s| s.mission_root.clone())
                .map(|p| p.to_string())
                .unwrap_or_default();

            match config.save_preferences(&preferences) {
                Ok(()) => {
                    state.apply_preferences(&preferences);
                    ui.set_status_message("Préférences enregistrées.".into());
                }
                Err(e) => {
                    tracing::error!("Failed to save preferences: {:#}", e);
                    Self::show_error_dialog(
                        &ui_weak,
                        "Échec de l'enregistrement",
                        "Les préférences n'ont pas pu être écrites.",
                        format!("{:?}", e),
                    );
                }
            }
        });

        let ui_weak = ui.as_weak();

        ui.on_error_dialog_dismissed(move || {
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_error_dialog(false);
            }
        });

        let ui_weak = ui.as_weak();

        // The user confirmed quitting while work is in progress. There is no
        // mid-run cancellation: the window hides, the process winds down, and
        // any engine workers die with it.
        ui.on_close_confirmation_proceed(move || {
            tracing::info!("Exit confirmed during a running operation");

            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_close_confirmation(false);
                ui.window().hide().ok();
            }
        });

        let ui_weak = ui.as_weak();

        ui.on_close_confirmation_cancelled(move || {
            tracing::info!("Exit cancelled, work continues");

            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_close_confirmation(false);
            }
        });

        // Intercept the title-bar close while anything is running.
        let state = state_manager.clone();
        let ui_weak = ui.as_weak();

        ui.window().on_close_requested(move || {
            let busy = state.read(|s| {
                s.phase == ExportPhase::Running || s.zoning_running || s.capture_running
            });

            if busy {
                tracing::info!("Close requested mid-run, asking for confirmation");

                if let Some(ui) = ui_weak.upgrade() {
                    ui.set_show_close_confirmation(true);
                }
                slint::CloseRequestResponse::KeepWindowShown
            } else {
                tracing::info!("Close requested, window may go");
                slint::CloseRequestResponse::HideWindow
            }
        });

        tracing::debug!("Callbacks wired");
    }

    /// Listen for state events on a background thread and mirror them into
    /// the widgets through the bridge.
    fn setup_state_subscription(
        bridge: &UiBridge<MainWindow>,
        state_manager: &Arc<StateManager>,
    ) {
        let bridge_handle = bridge.handle();
        let state_manager_clone = Arc::clone(state_manager);
        let mut rx = state_manager.subscribe();

        std::thread::spawn(move || {
            tracing::debug!("State listener thread up");

            loop {
                match rx.blocking_recv() {
                    Ok(change) => {
                        tracing::trace!(?change, "State event");

                        match change {
                            StateChange::RootChanged { configured } => {
                                tracing::debug!("Mission root changed: configured={}", configured);

                                let state_snapshot = state_manager_clone.snapshot();
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_mission_root(
                                        state_snapshot
                                            .mission_root
                                            .as_ref()
                                            .map(|p| p.as_str().to_string())
                                            .unwrap_or_default()
                                            .into(),
                                    );
                                    ui.set_export_ready(state_snapshot.is_ready_for_export());
                                    ui.set_status_message(
                                        Self::ready_status(&state_snapshot).into(),
                                    );
                                });
                            }

                            StateChange::ProjectsDiscovered { count } => {
                                tracing::info!("Projects discovered: {}", count);

                                let state_snapshot = state_manager_clone.snapshot();
                                bridge_handle.update_ui(move |ui| {
                                    // The shared model has to be built on the
                                    // event loop thread; only the plain names
                                    // cross the channel
                                    let names: Vec<slint::SharedString> = state_snapshot
                                        .projects
                                        .iter()
                                        .map(|p| p.name.as_str().into())
                                        .collect();
                                    ui.set_project_names(
                                        Rc::new(slint::VecModel::from(names)).into(),
                                    );
                                    ui.set_project_count(count as i32);
                                    ui.set_export_ready(state_snapshot.is_ready_for_export());
                                    ui.set_status_message(
                                        Self::ready_status(&state_snapshot).into(),
                                    );
                                });
                            }

                            StateChange::ExportStarted { total_projects } => {
                                tracing::info!("Export started: {} projects", total_projects);
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_is_exporting(true);
                                    ui.set_export_ready(false);
                                    ui.set_progress_current(0);
                                    ui.set_progress_total(total_projects as i32);
                                    ui.set_exported_count(0);
                                    ui.set_failed_count(0);
                                    ui.set_skipped_count(0);
                                    ui.set_elapsed_text("".into());
                                    ui.set_status_message("Démarrage de l'export...".into());
                                });
                            }

                            StateChange::ProjectCompleted {
                                project,
                                exported,
                                failed,
                                skipped,
                            } => {
                                tracing::debug!(
                                    "Project completed: {} ({} exported, {} failed, {} skipped)",
                                    project,
                                    exported,
                                    failed,
                                    skipped
                                );

                                let (total_exported, total_failed, total_skipped) =
                                    state_manager_clone.read(|s| {
                                        (s.crops_exported, s.crops_failed, s.crops_skipped)
                                    });
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_exported_count(total_exported as i32);
                                    ui.set_failed_count(total_failed as i32);
                                    ui.set_skipped_count(total_skipped as i32);
                                    Self::append_log_line(
                                        &ui,
                                        format!(
                                            "{} : {} exportée(s), {} en échec, {} ignorée(s)",
                                            project, exported, failed, skipped
                                        ),
                                    );
                                });
                            }

                            StateChange::ProgressUpdated {
                                current,
                                total,
                                current_project,
                            } => {
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_progress_current(current as i32);
                                    ui.set_progress_total(total as i32);

                                    if let Some(ref project) = current_project {
                                        ui.set_current_project(project.clone().into());
                                    }
                                });
                            }

                            StateChange::ExportFinished {
                                exported,
                                failed,
                                skipped,
                            } => {
                                tracing::info!(
                                    "Export finished: exported={}, failed={}, skipped={}",
                                    exported,
                                    failed,
                                    skipped
                                );

                                let state_snapshot = state_manager_clone.snapshot();
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_is_exporting(false);
                                    ui.set_exported_count(exported as i32);
                                    ui.set_failed_count(failed as i32);
                                    ui.set_skipped_count(skipped as i32);
                                    ui.set_export_ready(state_snapshot.is_ready_for_export());

                                    let elapsed = state_snapshot
                                        .last_elapsed
                                        .map(Self::format_elapsed)
                                        .unwrap_or_default();
                                    if !elapsed.is_empty() {
                                        ui.set_elapsed_text(
                                            format!("Terminé en {}", elapsed).into(),
                                        );
                                    }

                                    let status = state_snapshot.tally_summary();
                                    Self::append_log_line(
                                        &ui,
                                        format!("Export terminé : {}", status),
                                    );
                                    ui.set_status_message(status.into());
                                });
                            }

                            StateChange::OperationChanged { operation } => {
                                bridge_handle.update_ui(move |ui| {
                                    if !operation.is_empty() {
                                        ui.set_status_message(operation.into());
                                    }
                                });
                            }

                            StateChange::ZoningStateChanged { running } => {
                                tracing::debug!("Zoning running: {}", running);

                                let workbook = state_manager_clone.read(|s| {
                                    s.last_workbook
                                        .as_ref()
                                        .map(|p| p.as_str().to_string())
                                        .unwrap_or_default()
                                });
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_zoning_running(running);
                                    if !running {
                                        ui.set_workbook_path(workbook.as_str().into());
                                    }
                                });
                            }

                            StateChange::CaptureStateChanged { running } => {
                                tracing::debug!("Capture running: {}", running);
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_capture_running(running);
                                });
                            }

                            StateChange::SettingsChanged => {
                                tracing::debug!("Settings changed");
                                // Settings are written from the widgets, so the
                                // screen is already current
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        tracing::info!("State channel closed, listener thread exiting");
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        // Recoverable: keep receiving after noting the gap
                        tracing::warn!(skipped, "State listener lagged behind");
                    }
                }
            }

            tracing::debug!("State listener thread done");
        });
    }

    // ===== Workflows =====

    /// Run the complete export workflow
    ///
    /// Spawns the engine workers through the coordinator, folds each project
    /// outcome into state as it arrives, and records the final summary.
    async fn run_export_workflow(
        state: Arc<StateManager>,
        engine: EngineConfig,
        export: ExportConfig,
        projects: Vec<Utf8PathBuf>,
        workers: usize,
    ) -> Result<ExportSummary> {
        tracing::info!("Starting export workflow");

        let coordinator =
            ExportCoordinator::from_current_exe().context("Worker executable not found")?;

        let progress_state = Arc::clone(&state);
        let on_progress: ProgressFn = Arc::new(move |outcome| {
            crate::metrics::global().record_project_outcome(
                outcome.exported(),
                outcome.failed(),
                outcome.skipped(),
            );
            progress_state.record_outcome(outcome);
        });

        let summary = coordinator
            .run(&export, &engine, projects, workers, on_progress)
            .await
            .context("Export batch failed")?;

        crate::metrics::global().record_export_time(summary.elapsed);
        state.finish_export(&summary);

        tracing::info!("Export workflow completed");
        Ok(summary)
    }

    /// Run the complete zoning workflow
    ///
    /// Resolves the study source, scans every catalog layer, writes the
    /// workbook, and records its path in state. Returns the workbook path and
    /// the number of zonages found.
    async fn run_zoning_workflow(
        state: Arc<StateManager>,
        catalog: Arc<CatalogConfig>,
        source_text: String,
        radius_m: f64,
        output_dir: Option<Utf8PathBuf>,
    ) -> Result<(Utf8PathBuf, usize)> {
        tracing::info!("Starting zoning workflow");

        let parser = CoordinateParser::new();
        let study = resolve_study_source(&source_text, &parser)
            .context("Study source could not be resolved")?;

        let client = GeoClient::new(catalog.data.services.clone())
            .context("Web client could not be built")?;

        let report = run_zoning(&study, &catalog.data.zonages, radius_m, &client).await;
        let hits = report.total_hits();

        // Without a mission root the workbook lands next to the source file
        let dir = match output_dir {
            Some(dir) => dir,
            None => {
                let source_path = Utf8Path::new(source_text.trim());
                source_path
                    .parent()
                    .filter(|_| source_path.is_file())
                    .map(Utf8Path::to_path_buf)
                    .ok_or_else(|| {
                        anyhow!("no output folder: configure a mission root or use a file source")
                    })?
            }
        };

        let path = write_zoning_workbook(&report, &dir).context("Workbook could not be written")?;
        state.finish_zoning(Some(path.clone()));

        tracing::info!("Zoning workflow completed");
        Ok((path, hits))
    }

    /// Run the complete capture workflow
    ///
    /// Looks the site up (address, elevation), drives the headless browser
    /// over the requested years, and writes the comparison document. Years
    /// whose capture fails are skipped; the document needs at least one view.
    async fn run_capture_workflow(
        bridge: UiHandle<MainWindow>,
        catalog: Arc<CatalogConfig>,
        lat: f64,
        lon: f64,
        years: Vec<u16>,
        output_dir: Utf8PathBuf,
    ) -> Result<(Utf8PathBuf, usize)> {
        tracing::info!("Starting capture workflow");

        let parser = CoordinateParser::new();
        let client = GeoClient::new(catalog.data.services.clone())
            .context("Web client could not be built")?;

        // Site label for the document header: address if the geocoder knows
        // the spot, always the DMS coordinates, elevation when available
        let mut label = parser.format_dms(lat, lon);
        match client.reverse_geocode(lat, lon).await {
            Ok(Some(address)) => {
                label = format!("{} ({})", address.label, label);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Reverse geocoding failed"),
        }
        match client.elevation(lat, lon).await {
            Ok(Some(z)) => {
                label = format!("{}, alt. {:.0} m", label, z);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Elevation lookup failed"),
        }

        bridge.update_ui(|ui| {
            ui.set_capture_status("Lancement du navigateur...".into());
        });

        let browser = ImageryBrowser::launch(catalog.data.services.imagery_viewer.clone())
            .await
            .context("Headless browser could not be launched")?;

        let mut images = Vec::new();
        for year in years {
            let status = format!("Capture de la vue {}...", year);
            bridge.update_ui(move |ui| {
                ui.set_capture_status(status.as_str().into());
            });

            match browser.capture_year(lon, lat, year).await {
                Ok(image) => images.push(image),
                Err(e) => {
                    tracing::warn!(year, error = %e, "Capture failed for this year");
                }
            }
        }
        browser.close().await;

        if images.is_empty() {
            return Err(anyhow!("no view could be captured"));
        }

        let captured = images.len();
        let path = write_history_document(&label, &images, &output_dir)
            .context("Document could not be written")?;

        tracing::info!("Capture workflow completed");
        Ok((path, captured))
    }

    // ===== Helpers =====

    /// Status line for the idle screen
    fn ready_status(state: &AppState) -> String {
        if !state.is_root_configured {
            "Sélectionnez un dossier de mission pour commencer.".to_string()
        } else if state.projects.is_empty() {
            "Aucun projet trouvé dans le dossier de mission.".to_string()
        } else if state.projects.len() == 1 {
            "1 projet prêt à exporter.".to_string()
        } else {
            format!("{} projets prêts à exporter.", state.projects.len())
        }
    }

    /// Human form of a run duration, e.g. "42 s" or "3 min 05 s"
    fn format_elapsed(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        if secs >= 60 {
            format!("{} min {:02} s", secs / 60, secs % 60)
        } else {
            format!("{} s", secs)
        }
    }

    /// Append one line to the journal shown on the export tab
    ///
    /// The model starts out as the empty default from the markup; the first
    /// line swaps in a VecModel we can push to afterwards.
    fn append_log_line(ui: &MainWindow, line: String) {
        let model = ui.get_log_lines();
        match model
            .as_any()
            .downcast_ref::<slint::VecModel<slint::SharedString>>()
        {
            Some(lines) => lines.push(line.into()),
            None => {
                let lines: Vec<slint::SharedString> = vec![line.into()];
                ui.set_log_lines(Rc::new(slint::VecModel::from(lines)).into());
            }
        }
    }

    /// Fill and show the error modal. Details may be empty.
    ///
    /// Only valid on the event loop thread; workflows use
    /// [`show_error_dialog_deferred`](Self::show_error_dialog_deferred).
    fn show_error_dialog(
        ui_weak: &slint::Weak<MainWindow>,
        title: impl Into<slint::SharedString>,
        message: impl Into<slint::SharedString>,
        details: impl Into<slint::SharedString>,
    ) {
        if let Some(ui) = ui_weak.upgrade() {
            ui.set_error_title(title.into());
            ui.set_error_message(message.into());
            ui.set_error_details(details.into());
            ui.set_show_error_dialog(true);
        }
    }

    /// Error modal from outside the event loop thread.
    ///
    /// A weak handle only upgrades on the thread that created the window, so
    /// async workflows route the dialog through the bridge instead.
    fn show_error_dialog_deferred(
        bridge: &UiHandle<MainWindow>,
        title: &str,
        message: &str,
        details: String,
    ) {
        let title: slint::SharedString = title.into();
        let message: slint::SharedString = message.into();
        let details: slint::SharedString = details.as_str().into();
        bridge.update_ui(move |ui| {
            ui.set_error_title(title);
            ui.set_error_message(message);
            ui.set_error_details(details);
            ui.set_show_error_dialog(true);
        });
    }

    /// Native file picker, `None` when cancelled or the pick is not UTF-8.
    fn show_file_picker(title: &str, filters: Vec<(&str, &[&str])>) -> Option<Utf8PathBuf> {
        use rfd::FileDialog;

        let mut dialog = FileDialog::new().set_title(title);
        for (name, extensions) in filters {
            dialog = dialog.add_filter(name, extensions);
        }

        dialog.pick_file().and_then(Self::utf8_pick)
    }

    /// Native folder picker, `None` when cancelled or the pick is not UTF-8.
    fn show_folder_picker(title: &str) -> Option<Utf8PathBuf> {
        use rfd::FileDialog;

        FileDialog::new()
            .set_title(title)
            .pick_folder()
            .and_then(Self::utf8_pick)
    }

    fn utf8_pick(path: std::path::PathBuf) -> Option<Utf8PathBuf> {
        match Utf8PathBuf::try_from(path) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!("Picked path is not UTF-8: {e}");
                None
            }
        }
    }

    /// Open a file with the platform file handler
    fn open_in_shell(path: &Utf8Path) {
        #[cfg(target_os = "windows")]
        const OPENER: &str = "explorer";
        #[cfg(target_os = "macos")]
        const OPENER: &str = "open";
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        const OPENER: &str = "xdg-open";

        tracing::info!("Opening {} with {}", path, OPENER);
        if let Err(e) = std::process::Command::new(OPENER).arg(path.as_str()).spawn() {
            tracing::error!("Failed to open {}: {}", path, e);
        }
    }
}
