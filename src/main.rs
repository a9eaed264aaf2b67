//! Zonatlas - batch map export and zoning analysis for ecological studies.
//!
//! GUI entry point. Everything long-running happens off the main thread:
//! Slint keeps the main thread for its event loop, a four-worker tokio
//! runtime drives the engine subprocesses, web lookups and browser captures,
//! and a pump thread carries state updates back into the UI.
//!
//! Startup order matters in two places. Preferences are read before logging
//! because the debug flag decides the log filter, and the catalog is loaded
//! before the controller because its layer bindings feed the export defaults.
//!
//! On disk the application touches three locations:
//! - `Zonatlas Data/Zonatlas Catalog.yaml`, engine paths, layer bindings,
//!   zonage layers and service endpoints (defaults written on first run)
//! - `~/.zonatlas.json`, per-user preferences (last mission root, export
//!   settings)
//! - `logs/zonatlas.<date>.log`, daily-rotated log files
//!
//! Primary platform is Windows 10/11 x86_64, where the GIS engine lives;
//! Slint and tokio keep the rest portable.

use anyhow::Result;
use std::sync::Arc;
use zonatlas::services::ProjectDiscoverer;
use zonatlas::ui::GuiController;
use zonatlas::{APP_NAME, ConfigManager, StateManager, VERSION};

/// Builds the runtime pieces in dependency order, hands them to the
/// controller, then blocks in the Slint event loop until the window closes.
///
/// Fails when logging cannot be set up, the tokio runtime cannot start, the
/// catalog file exists but is invalid YAML, or the Slint window cannot be
/// created.
fn main() -> Result<()> {
    // Preferences come first: the debug flag decides the log filter. Nothing
    // is logged before the subscriber is up.
    let config_manager = Arc::new(ConfigManager::new("Zonatlas Data")?);
    let preferences = config_manager.load_preferences();

    // The guard keeps the non-blocking file writer alive until exit.
    let _guard = zonatlas::logging::setup_logging_with_console(
        "logs",
        "zonatlas",
        preferences.debug_mode,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    // Engine workers, web lookups and browser captures all run here.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("zonatlas-runtime")
        .build()?;

    tracing::info!(workers = 4, "Tokio runtime started");

    let state_manager = Arc::new(StateManager::new());

    // Load the catalog; a missing file falls back to defaults, a malformed
    // one is a startup error
    let catalog = Arc::new(config_manager.load_catalog()?);
    tracing::info!(
        "Loaded catalog - engine: {}, zonage layers: {}",
        catalog.data.engine.install_root,
        catalog.data.zonages.len()
    );

    // Restore the last session: export settings and mission root
    state_manager.apply_preferences(&preferences);

    // Seed the project list when a mission root was restored
    let restored_root = state_manager.read(|s| s.mission_root.clone());
    if let Some(root) = restored_root {
        let discoverer = ProjectDiscoverer::new(&catalog.data.engine.project_extensions);
        let projects = discoverer.discover(&root);
        tracing::info!(
            "Restored mission root {} with {} projects",
            root,
            projects.len()
        );
        state_manager.set_projects(projects);
    }

    let gui_controller = GuiController::new(
        Arc::clone(&state_manager),
        Arc::clone(&config_manager),
        Arc::clone(&catalog),
        runtime.handle().clone(),
    )?;

    tracing::info!("Launching main window");

    // Blocks for the life of the window while the runtime keeps serving tasks.
    let result = gui_controller.run();

    tracing::info!("Window closed, shutting down");

    // A batch left in flight gets five seconds to wind down; engine workers
    // beyond that are abandoned.
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    zonatlas::metrics::global().log_summary();
    tracing::info!("Shutdown complete");

    if let Err(e) = &result {
        tracing::error!("GUI error: {e}");
    }
    result.map_err(|e| anyhow::anyhow!("GUI error: {e}"))
}
