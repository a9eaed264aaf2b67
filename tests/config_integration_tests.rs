//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Catalog loading, saving and the hand-edited YAML dialect
//! - Default catalog generation when no file exists
//! - Lenient preferences loading and unknown-key preservation
//! - Integration with StateManager

use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;
use zonatlas::models::{CatalogConfig, CropMode, LayerSource};
use zonatlas::{ConfigManager, Preferences, StateManager};

fn create_test_config_manager() -> (ConfigManager, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    let preferences = data_dir.join("preferences.json");
    let manager = ConfigManager::new(&data_dir)
        .unwrap()
        .with_preferences_path(preferences);
    (manager, temp_dir)
}

#[test]
fn test_create_config_manager() {
    let (manager, temp_dir) = create_test_config_manager();

    let data_dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    assert_eq!(manager.data_dir(), &data_dir);
    assert_eq!(
        manager.catalog_path(),
        data_dir.join("Zonatlas Catalog.yaml")
    );
}

#[test]
fn test_missing_catalog_yields_working_defaults() {
    let (manager, _temp_dir) = create_test_config_manager();

    let catalog = manager.load_catalog().unwrap();

    assert!(!catalog.data.zonages.is_empty());
    assert!(
        catalog
            .data
            .zonages
            .iter()
            .any(|layer| layer.key == "znieff1")
    );
    assert_eq!(catalog.data.layers.study_area.name, "Aire d'étude élargie");
    assert_eq!(catalog.data.layers.core_area.name, "Zone d'emprise");
    assert!(catalog.data.services.wfs.starts_with("https://"));
    assert_eq!(catalog.data.export.output_subdir, "Export cartes");
}

#[test]
fn test_hand_written_catalog_parses() {
    let (manager, _temp_dir) = create_test_config_manager();

    // The on-site dialect: capitalized keys, partial sections, mixed layer
    // source types.
    let yaml = r#"
Zonatlas_Data:
  Version: "1.2.0"
  Engine:
    Install_Root: "D:/Outils/QGIS 3.34"
    Toolkit_Dir: "apps/qgis-ltr"
  Zonage_Layers:
    - Key: "znieff1"
      Title: "ZNIEFF de type I"
      Source:
        Type: "wfs"
        TypeName: "PROTECTEDAREAS.ZNIEFF1:znieff1"
    - Key: "zonages_communaux"
      Title: "Zonages communaux"
      Source:
        Type: "shapefile"
        Path: "D:/SIG/Zonages communaux.shp"
      Name_Field: "LIB"
      Category: "inventaire"
  Export:
    Dpi: 150
"#;
    fs::write(manager.catalog_path(), yaml).unwrap();

    let catalog = manager.load_catalog().unwrap();

    assert_eq!(catalog.data.engine.install_root.as_str(), "D:/Outils/QGIS 3.34");
    // Unlisted engine fields come from the built-in defaults.
    assert!(!catalog.data.engine.path_dirs.is_empty());
    assert!(!catalog.data.engine.project_extensions.is_empty());

    assert_eq!(catalog.data.zonages.len(), 2);
    let communal = &catalog.data.zonages[1];
    assert_eq!(communal.name_field, "LIB");
    assert_eq!(communal.category, "inventaire");
    match &communal.source {
        LayerSource::Shapefile { path } => {
            assert_eq!(path.as_str(), "D:/SIG/Zonages communaux.shp");
        }
        other => panic!("Expected a shapefile source, got: {:?}", other),
    }

    assert_eq!(catalog.data.export.dpi, 150);
    assert_eq!(catalog.data.export.margin_wide, 1.1);
}

#[test]
fn test_catalog_round_trip_preserves_layer_sources() {
    let (manager, _temp_dir) = create_test_config_manager();

    let mut catalog = CatalogConfig::default();
    catalog.data.engine.install_root = Utf8PathBuf::from("E:/QGIS");
    catalog.data.zonages.truncate(3);
    manager.save_catalog(&catalog).unwrap();

    let loaded = manager.load_catalog().unwrap();
    assert_eq!(loaded.data.engine.install_root.as_str(), "E:/QGIS");
    assert_eq!(loaded.data.zonages.len(), 3);
    for (saved, read) in catalog.data.zonages.iter().zip(&loaded.data.zonages) {
        assert_eq!(saved.source, read.source);
    }
}

#[test]
fn test_malformed_catalog_is_an_error_not_a_fallback() {
    let (manager, _temp_dir) = create_test_config_manager();

    let broken = "Zonatlas_Data: [not, a, mapping";
    fs::write(manager.catalog_path(), broken).unwrap();

    assert!(manager.load_catalog().is_err());
    // The broken file stays on disk for the user to fix.
    let on_disk = fs::read_to_string(manager.catalog_path()).unwrap();
    assert_eq!(on_disk, broken);
}

#[test]
fn test_preferences_round_trip() {
    let (manager, _temp_dir) = create_test_config_manager();

    let mut preferences = Preferences::default();
    preferences.worker_count = 5;
    preferences.crop_mode = CropMode::Wide;
    preferences.mission_root = "D:/Missions/2026 Ain".to_string();
    preferences.plantnet_api_key = "2b10abcdef".to_string();
    manager.save_preferences(&preferences).unwrap();

    let loaded = manager.load_preferences();
    assert_eq!(loaded.worker_count, 5);
    assert_eq!(loaded.crop_mode, CropMode::Wide);
    assert_eq!(loaded.mission_root, "D:/Missions/2026 Ain");
    assert_eq!(loaded.plantnet_api_key, "2b10abcdef");
}

#[test]
fn test_unknown_preference_keys_survive_resave() {
    let (manager, _temp_dir) = create_test_config_manager();

    // A newer build wrote a key this build does not know.
    fs::write(
        manager.preferences_path(),
        r#"{"worker_count": 4, "future_flag": {"nested": true}}"#,
    )
    .unwrap();

    let mut preferences = manager.load_preferences();
    preferences.dpi = 150;
    manager.save_preferences(&preferences).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(manager.preferences_path()).unwrap()).unwrap();
    assert_eq!(raw["worker_count"], 4);
    assert_eq!(raw["dpi"], 150);
    assert_eq!(raw["future_flag"]["nested"], serde_json::Value::Bool(true));
}

#[test]
fn test_corrupt_preferences_never_block_startup() {
    let (manager, _temp_dir) = create_test_config_manager();

    fs::write(manager.preferences_path(), "not json at all").unwrap();

    let loaded = manager.load_preferences();
    assert_eq!(loaded.worker_count, Preferences::default().worker_count);
    assert_eq!(loaded.dpi, Preferences::default().dpi);

    // The corrupt file is left alone until the user saves.
    let on_disk = fs::read_to_string(manager.preferences_path()).unwrap();
    assert_eq!(on_disk, "not json at all");
}

#[test]
fn test_atomic_write_leaves_no_temp_file() {
    let (manager, _temp_dir) = create_test_config_manager();

    manager.save_preferences(&Preferences::default()).unwrap();
    manager.save_catalog(&CatalogConfig::default()).unwrap();

    assert!(manager.preferences_path().exists());
    assert!(!manager.preferences_path().with_extension("tmp").exists());
    assert!(manager.catalog_path().exists());
    assert!(!manager.catalog_path().with_extension("tmp").exists());
}

#[test]
fn test_preferences_feed_state_manager() {
    let (manager, _temp_dir) = create_test_config_manager();

    let mut preferences = Preferences::default();
    preferences.mission_root = "D:/Missions/2026 Ain".to_string();
    preferences.crop_mode = CropMode::Core;
    preferences.worker_count = 6;
    preferences.overwrite_existing = true;
    preferences.study_radius_m = 10_000.0;
    manager.save_preferences(&preferences).unwrap();

    let state = StateManager::new();
    state.apply_preferences(&manager.load_preferences());

    let snapshot = state.snapshot();
    assert!(snapshot.is_root_configured);
    assert_eq!(
        snapshot.mission_root,
        Some(Utf8PathBuf::from("D:/Missions/2026 Ain"))
    );
    assert_eq!(snapshot.crop_mode, CropMode::Core);
    assert_eq!(snapshot.worker_count, 6);
    assert!(snapshot.overwrite_existing);
    assert_eq!(snapshot.study_radius_m, 10_000.0);
}
