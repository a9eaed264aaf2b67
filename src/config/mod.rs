use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use std::fs;

use crate::models::{CatalogConfig, Preferences};

/// Configuration manager for the two on-disk files.
///
/// - Catalog (`Zonatlas Catalog.yaml`): engine location, layer bindings,
///   zoning layer sources, service endpoints. Edited by hand, loaded
///   strictly.
/// - Preferences (`~/.zonatlas.json`): per-user GUI settings. Loaded
///   leniently, a broken file never blocks startup.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    data_dir: Utf8PathBuf,
    catalog_path: Utf8PathBuf,
    preferences_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager rooted at the given data directory.
    ///
    /// The directory is created if missing. Preferences go to the user's
    /// home directory when one can be resolved, next to the catalog
    /// otherwise.
    pub fn new<P: AsRef<Utf8Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();

        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)
                .with_context(|| format!("Failed to create data directory: {}", data_dir))?;
        }

        Ok(Self {
            catalog_path: data_dir.join("Zonatlas Catalog.yaml"),
            preferences_path: default_preferences_path(&data_dir),
            data_dir,
        })
    }

    /// Redirect the preferences file, used by tests and portable installs.
    pub fn with_preferences_path(mut self, path: Utf8PathBuf) -> Self {
        self.preferences_path = path;
        self
    }

    /// Load the catalog.
    ///
    /// A missing file yields the built-in defaults. An existing but
    /// unparseable file is an error: silently falling back would point the
    /// pipeline at the wrong engine or the wrong layers.
    pub fn load_catalog(&self) -> Result<CatalogConfig> {
        if !self.catalog_path.exists() {
            tracing::warn!(
                "Catalog not found at {}, using built-in defaults",
                self.catalog_path
            );
            return Ok(CatalogConfig::default());
        }

        let file_contents = fs::read_to_string(&self.catalog_path)
            .with_context(|| format!("Failed to read catalog: {}", self.catalog_path))?;

        let catalog: CatalogConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse catalog: {}", self.catalog_path))?;

        tracing::info!("Loaded catalog from {}", self.catalog_path);
        Ok(catalog)
    }

    /// Save the catalog.
    pub fn save_catalog(&self, catalog: &CatalogConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(catalog).context("Failed to serialize catalog to YAML")?;

        write_atomic(&self.catalog_path, &yaml_string)?;

        tracing::info!("Saved catalog to {}", self.catalog_path);
        Ok(())
    }

    /// Load the user preferences, never failing.
    pub fn load_preferences(&self) -> Preferences {
        if !self.preferences_path.exists() {
            tracing::info!(
                "No preferences at {}, starting with defaults",
                self.preferences_path
            );
            return Preferences::default();
        }

        match fs::read_to_string(&self.preferences_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(preferences) => {
                    tracing::info!("Loaded preferences from {}", self.preferences_path);
                    preferences
                }
                Err(err) => {
                    tracing::warn!(
                        "Unparseable preferences at {}: {}, using defaults",
                        self.preferences_path,
                        err
                    );
                    Preferences::default()
                }
            },
            Err(err) => {
                tracing::warn!(
                    "Unreadable preferences at {}: {}, using defaults",
                    self.preferences_path,
                    err
                );
                Preferences::default()
            }
        }
    }

    /// Save the user preferences.
    pub fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        let json_string = serde_json::to_string_pretty(preferences)
            .context("Failed to serialize preferences to JSON")?;

        write_atomic(&self.preferences_path, &json_string)?;

        tracing::info!("Saved preferences to {}", self.preferences_path);
        Ok(())
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn catalog_path(&self) -> &Utf8Path {
        &self.catalog_path
    }

    pub fn preferences_path(&self) -> &Utf8Path {
        &self.preferences_path
    }
}

/// Write through a sibling temp file so a crash mid-write cannot leave a
/// truncated config behind.
fn write_atomic(path: &Utf8Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place at {}", tmp, path))?;
    Ok(())
}

fn default_preferences_path(data_dir: &Utf8Path) -> Utf8PathBuf {
    if let Some(base) = BaseDirs::new() {
        if let Ok(home) = Utf8PathBuf::from_path_buf(base.home_dir().to_path_buf()) {
            return home.join(".zonatlas.json");
        }
    }
    data_dir.join("zonatlas.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

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
    fn test_missing_catalog_yields_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        let catalog = manager.load_catalog().unwrap();
        assert!(!catalog.data.zonages.is_empty());
        assert_eq!(
            catalog.data.engine.install_root.as_str(),
            "C:/Program Files/QGIS 3.28.11"
        );
    }

    #[test]
    fn test_catalog_round_trip() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut catalog = CatalogConfig::default();
        catalog.data.export.dpi = 150;
        manager.save_catalog(&catalog).unwrap();

        let loaded = manager.load_catalog().unwrap();
        assert_eq!(loaded.data.export.dpi, 150);
        assert_eq!(loaded.data.zonages.len(), catalog.data.zonages.len());
    }

    #[test]
    fn test_malformed_catalog_is_an_error() {
        let (manager, _temp_dir) = create_test_config_manager();

        fs::write(manager.catalog_path(), "Zonatlas_Data: [not, a, mapping").unwrap();
        assert!(manager.load_catalog().is_err());
    }

    #[test]
    fn test_preferences_round_trip() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut preferences = Preferences::default();
        preferences.worker_count = 5;
        preferences.mission_root = "D:/Missions/2025".to_string();
        manager.save_preferences(&preferences).unwrap();

        let loaded = manager.load_preferences();
        assert_eq!(loaded.worker_count, 5);
        assert_eq!(loaded.mission_root, "D:/Missions/2025");
    }

    #[test]
    fn test_corrupt_preferences_fall_back_to_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        fs::write(manager.preferences_path(), "not json at all").unwrap();
        let loaded = manager.load_preferences();
        assert_eq!(loaded.worker_count, Preferences::default().worker_count);
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let (manager, _temp_dir) = create_test_config_manager();

        manager.save_preferences(&Preferences::default()).unwrap();
        assert!(manager.preferences_path().exists());
        assert!(!manager.preferences_path().with_extension("tmp").exists());
    }
}
