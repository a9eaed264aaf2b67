//! Per-project export routine.
//!
//! One call of [`export_project`] drives the engine through the whole life
//! of a project: open, find the print layout, rebind the mission layers,
//! render each requested crop, close. Every failure is folded into the
//! returned outcome so a broken project can never take down the rest of the
//! worker's chunk.

use camino::Utf8Path;
use tracing::{debug, info, warn};

use crate::models::job::{CropKind, CropStatus, ExportConfig, ProjectOutcome};
use crate::services::engine::{EngineError, LayoutInfo, MapEngine};
use crate::services::paths;

/// Export one project's crops according to `cfg`.
///
/// The project is closed on every path that opened it. A project that
/// cannot be opened, or has no print layout, yields one failed crop per
/// crop the mode expects.
pub fn export_project<E: MapEngine>(
    engine: &mut E,
    cfg: &ExportConfig,
    project: &Utf8Path,
) -> ProjectOutcome {
    let mut outcome = ProjectOutcome::new(project);
    info!(project = %project, "Exporting project");

    if let Err(err) = open_with_fallback(engine, project) {
        warn!(project = %project, error = %err, "Project could not be opened");
        return ProjectOutcome::all_failed(project, cfg.mode, &format!("open failed: {err}"));
    }

    let layout = match engine.first_layout() {
        Ok(Some(layout)) => layout,
        Ok(None) => {
            close_quietly(engine, project);
            return ProjectOutcome::all_failed(project, cfg.mode, "project has no print layout");
        }
        Err(err) => {
            close_quietly(engine, project);
            return ProjectOutcome::all_failed(
                project,
                cfg.mode,
                &format!("layout lookup failed: {err}"),
            );
        }
    };

    rebind_layers(engine, cfg, project);

    for kind in cfg.mode.crops() {
        export_crop(engine, cfg, project, &layout, *kind, &mut outcome);
    }

    close_quietly(engine, project);
    outcome
}

/// Try each access form of the project path until one opens.
fn open_with_fallback<E: MapEngine>(engine: &mut E, project: &Utf8Path) -> Result<(), EngineError> {
    let mut last_err = None;
    for candidate in paths::access_candidates(project) {
        match engine.open_project(&candidate) {
            Ok(()) => return Ok(()),
            Err(err) => {
                debug!(candidate = %candidate, error = %err, "Open attempt failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| EngineError::Operation("no path candidates".to_string())))
}

/// Point the two mission layers at their configured sources.
///
/// Rebinding is tolerant: a layer the project does not contain, or an engine
/// error while rebinding, is logged and the export continues with whatever
/// the project saved.
fn rebind_layers<E: MapEngine>(engine: &mut E, cfg: &ExportConfig, project: &Utf8Path) {
    for binding in [&cfg.study_layer, &cfg.core_layer] {
        if binding.source.is_empty() {
            continue;
        }
        match engine.rebind_layer(&binding.name, &binding.source) {
            Ok(true) => debug!(project = %project, layer = %binding.name, "Layer rebound"),
            Ok(false) => {
                warn!(project = %project, layer = %binding.name, "Layer absent, rebind skipped");
            }
            Err(err) => {
                warn!(
                    project = %project,
                    layer = %binding.name,
                    error = %err,
                    "Rebind failed, continuing with saved source"
                );
            }
        }
    }
}

fn export_crop<E: MapEngine>(
    engine: &mut E,
    cfg: &ExportConfig,
    project: &Utf8Path,
    layout: &LayoutInfo,
    kind: CropKind,
    outcome: &mut ProjectOutcome,
) {
    let output = cfg.output_path(project, kind);

    // Existing images are kept unless the run asks to overwrite. The check
    // happens before any engine call, so a skipped crop costs no render time.
    if !cfg.overwrite && paths::any_exists(&output) {
        debug!(output = %output, "Crop already exported, skipped");
        outcome.record(kind, CropStatus::Skipped, "already exported", Some(output));
        return;
    }

    let binding = cfg.binding_for(kind);
    let geo = match engine.layer_extent(&binding.name) {
        Ok(geo) => geo,
        Err(err) => {
            outcome.record(
                kind,
                CropStatus::Failed,
                format!("extent of '{}' unavailable: {err}", binding.name),
                None,
            );
            return;
        }
    };

    let extent = if geo.crs.is_empty() || geo.crs == layout.crs {
        geo.extent
    } else {
        match engine.reproject_extent(&geo.extent, &geo.crs, &layout.crs) {
            Ok(extent) => extent,
            Err(err) => {
                warn!(
                    project = %project,
                    from = %geo.crs,
                    to = %layout.crs,
                    error = %err,
                    "Reprojection failed, source extent kept"
                );
                geo.extent
            }
        }
    };

    let framed = extent
        .adjusted_to_ratio(layout.aspect_ratio())
        .with_margin(cfg.margin_for(kind));

    match engine.export_layout(&layout.name, &framed, cfg.dpi, &output) {
        Ok(()) => {
            info!(output = %output, "Crop exported");
            outcome.record(kind, CropStatus::Exported, "", Some(output));
        }
        Err(err) => {
            outcome.record(kind, CropStatus::Failed, format!("render failed: {err}"), None);
        }
    }
}

fn close_quietly<E: MapEngine>(engine: &mut E, project: &Utf8Path) {
    if let Err(err) = engine.close_project() {
        warn!(project = %project, error = %err, "Project close reported an error");
    }
}
