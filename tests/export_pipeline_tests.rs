//! Integration tests for the batch export pipeline
//!
//! These tests verify:
//! - The per-project routine never renders crops that already exist
//! - The coordinator isolates worker failures per chunk
//! - Unreported projects come back as synthesized failures
//! - Progress callbacks fire once per project across all chunks

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use zonatlas::models::{CropMode, EngineConfig, ExportConfig, LayerBinding};
use zonatlas::services::engine::{EngineError, GeoExtent, LayoutInfo, MapEngine};
use zonatlas::services::export::{ExportCoordinator, ProgressFn, export_project};
use zonatlas::services::extent::MapExtent;

/// Engine fake that renders by writing a marker file, counting every call.
#[derive(Default)]
struct ScriptedEngine {
    opens: usize,
    renders: usize,
    extent_lookups: usize,
}

impl MapEngine for ScriptedEngine {
    fn open_project(&mut self, _path: &Utf8Path) -> Result<(), EngineError> {
        self.opens += 1;
        Ok(())
    }

    fn first_layout(&mut self) -> Result<Option<LayoutInfo>, EngineError> {
        Ok(Some(LayoutInfo {
            name: "Carte A3".to_string(),
            width_mm: 420.0,
            height_mm: 297.0,
            crs: "EPSG:2154".to_string(),
        }))
    }

    fn rebind_layer(&mut self, _layer_name: &str, _source: &str) -> Result<bool, EngineError> {
        Ok(true)
    }

    fn layer_extent(&mut self, _layer_name: &str) -> Result<GeoExtent, EngineError> {
        self.extent_lookups += 1;
        Ok(GeoExtent {
            extent: MapExtent::new(900_000.0, 6_400_000.0, 905_000.0, 6_403_000.0),
            crs: "EPSG:2154".to_string(),
        })
    }

    fn reproject_extent(
        &mut self,
        extent: &MapExtent,
        _from_crs: &str,
        _to_crs: &str,
    ) -> Result<MapExtent, EngineError> {
        Ok(*extent)
    }

    fn export_layout(
        &mut self,
        _layout_name: &str,
        _extent: &MapExtent,
        _dpi: u32,
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        self.renders += 1;
        std::fs::write(output.as_std_path(), b"png")?;
        Ok(())
    }

    fn close_project(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

fn export_config(output_dir: &Utf8Path) -> ExportConfig {
    ExportConfig {
        output_dir: output_dir.to_path_buf(),
        mode: CropMode::Both,
        overwrite: false,
        dpi: 300,
        margin_wide: 1.1,
        margin_core: 1.2,
        study_layer: LayerBinding {
            name: "Aire d'étude élargie".to_string(),
            source: String::new(),
        },
        core_layer: LayerBinding {
            name: "Zone d'emprise".to_string(),
            source: String::new(),
        },
    }
}

fn temp_output_dir() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, path)
}

fn counting_progress() -> (ProgressFn, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let count_in = Arc::clone(&count);
    let progress: ProgressFn = Arc::new(move |_| {
        count_in.fetch_add(1, Ordering::SeqCst);
    });
    (progress, count)
}

#[test]
fn test_second_run_skips_everything_without_rendering() {
    let (_dir, out) = temp_output_dir();
    let cfg = export_config(&out);
    let project = Utf8Path::new("/missions/Accès site.qgz");

    let mut engine = ScriptedEngine::default();
    let first = export_project(&mut engine, &cfg, project);
    assert_eq!(first.exported(), 2);
    assert_eq!(engine.renders, 2);
    assert!(out.join("Accès site__AE.png").as_std_path().exists());
    assert!(out.join("Accès site__ZE.png").as_std_path().exists());

    // The rerun must not touch the engine beyond opening and closing.
    let second = export_project(&mut engine, &cfg, project);
    assert_eq!(second.skipped(), 2);
    assert_eq!(second.exported(), 0);
    assert_eq!(engine.renders, 2, "no new render calls on a rerun");
    assert_eq!(engine.extent_lookups, 2, "skip happens before any extent lookup");
    assert_eq!(engine.opens, 2);
}

#[test]
fn test_overwrite_rerun_renders_again() {
    let (_dir, out) = temp_output_dir();
    let mut cfg = export_config(&out);
    let project = Utf8Path::new("/missions/Hydrologie.qgz");

    let mut engine = ScriptedEngine::default();
    export_project(&mut engine, &cfg, project);

    cfg.overwrite = true;
    let rerun = export_project(&mut engine, &cfg, project);
    assert_eq!(rerun.exported(), 2);
    assert_eq!(engine.renders, 4);
}

#[tokio::test]
async fn test_missing_worker_fails_every_project_without_aborting() {
    let (_dir, out) = temp_output_dir();
    let cfg = export_config(&out);
    let projects: Vec<Utf8PathBuf> = ["Accès", "Hydrologie", "Trame verte"]
        .iter()
        .map(|name| Utf8PathBuf::from(format!("/missions/{name}.qgz")))
        .collect();

    let coordinator =
        ExportCoordinator::with_worker_exe(Utf8PathBuf::from("/nonexistent/zonatlas-worker"));
    let (progress, fired) = counting_progress();

    let summary = coordinator
        .run(&cfg, &EngineConfig::default(), projects.clone(), 2, progress)
        .await
        .expect("setup must still succeed");

    // Spawn failures are isolated per chunk and synthesized per project.
    assert_eq!(summary.total_projects(), 3);
    assert_eq!(summary.exported, 0);
    assert_eq!(summary.failed, 6, "two failed crops per Both-mode project");
    assert_eq!(fired.load(Ordering::SeqCst), 3);
    for outcome in &summary.outcomes {
        assert!(
            outcome
                .crops
                .iter()
                .all(|c| c.message.contains("worker failed to spawn")),
            "unexpected message: {:?}",
            outcome.crops
        );
    }
}

#[tokio::test]
async fn test_broken_engine_install_surfaces_as_per_project_failures() {
    let (_dir, out) = temp_output_dir();
    let cfg = export_config(&out);

    // The worker binary boots for real but its bootstrap must fail: the
    // catalog points at an engine install that does not exist.
    let mut engine = EngineConfig::default();
    engine.install_root = out.join("missing engine");

    let projects = vec![
        Utf8PathBuf::from("/missions/Accès.qgz"),
        Utf8PathBuf::from("/missions/Hydrologie.qgz"),
    ];
    let coordinator = ExportCoordinator::with_worker_exe(Utf8PathBuf::from(env!(
        "CARGO_BIN_EXE_zonatlas-worker"
    )));
    let (progress, fired) = counting_progress();

    let summary = coordinator
        .run(&cfg, &engine, projects, 1, progress)
        .await
        .expect("a dying worker is not a setup error");

    assert_eq!(summary.total_projects(), 2);
    assert_eq!(summary.failed, 4);
    assert_eq!(summary.exported, 0);
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert!(
        summary.outcomes[0].crops[0].message.contains("worker"),
        "synthesized message should name the worker: {}",
        summary.outcomes[0].crops[0].message
    );
}

#[tokio::test]
async fn test_output_directory_is_created_before_workers_spawn() {
    let (_dir, out) = temp_output_dir();
    let nested = out.join("Export cartes").join("2026");
    let mut cfg = export_config(&out);
    cfg.output_dir = nested.clone();

    let coordinator =
        ExportCoordinator::with_worker_exe(Utf8PathBuf::from("/nonexistent/zonatlas-worker"));
    let (progress, _) = counting_progress();

    coordinator
        .run(
            &cfg,
            &EngineConfig::default(),
            vec![Utf8PathBuf::from("/missions/Accès.qgz")],
            1,
            progress,
        )
        .await
        .unwrap();

    assert!(nested.as_std_path().is_dir());
}
