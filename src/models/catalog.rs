//! Structures for the `Zonatlas Catalog.yaml` data file.
//!
//! The catalog describes everything the application knows about the outside
//! world: where the map engine is installed, which layers the export rebinds,
//! which protected-area layers the zoning analysis scans, and the geoservice
//! endpoints. It ships with working defaults and is meant to be hand-edited
//! on site when an office uses a non-standard engine install.

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(rename = "Zonatlas_Data")]
    pub data: CatalogData,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            data: CatalogData::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(rename = "Version", default = "default_version")]
    pub version: String,

    #[serde(rename = "Version_Date", default = "default_version_date")]
    pub version_date: String,

    #[serde(rename = "Engine", default)]
    pub engine: EngineConfig,

    #[serde(rename = "Map_Layers", default)]
    pub layers: MapLayers,

    #[serde(rename = "Zonage_Layers", default = "default_zonage_layers")]
    pub zonages: Vec<ZonageLayer>,

    #[serde(rename = "Services", default)]
    pub services: ServiceEndpoints,

    #[serde(rename = "Export", default)]
    pub export: ExportDefaults,
}

impl Default for CatalogData {
    fn default() -> Self {
        Self {
            version: default_version(),
            version_date: default_version_date(),
            engine: EngineConfig::default(),
            layers: MapLayers::default(),
            zonages: default_zonage_layers(),
            services: ServiceEndpoints::default(),
            export: ExportDefaults::default(),
        }
    }
}

/// Where the map engine lives and how a worker process prepares its
/// environment before the first native call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine installation root. All relative entries below resolve against it.
    #[serde(rename = "Install_Root", default = "default_install_root")]
    pub install_root: Utf8PathBuf,

    /// Directory that must exist under the install root for the install to be
    /// considered usable. Bootstrap fails fast when it is missing.
    #[serde(rename = "Toolkit_Dir", default = "default_toolkit_dir")]
    pub toolkit_dir: Utf8PathBuf,

    /// Directories prepended to PATH, relative to the install root.
    #[serde(rename = "Path_Dirs", default = "default_path_dirs")]
    pub path_dirs: Vec<Utf8PathBuf>,

    /// Extra environment variables. `${root}` expands to the install root.
    #[serde(rename = "Environment", default = "default_engine_env")]
    pub env: IndexMap<String, String>,

    /// Override for the render driver executable. When absent the driver is
    /// looked up next to the running binary.
    #[serde(rename = "Driver_Exe", default)]
    pub driver_exe: Option<Utf8PathBuf>,

    /// Project file extensions recognised during discovery.
    #[serde(rename = "Project_Extensions", default = "default_project_extensions")]
    pub project_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            install_root: default_install_root(),
            toolkit_dir: default_toolkit_dir(),
            path_dirs: default_path_dirs(),
            env: default_engine_env(),
            driver_exe: None,
            project_extensions: default_project_extensions(),
        }
    }
}

/// The two layers every mission project is expected to contain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapLayers {
    #[serde(rename = "Study_Area", default = "default_study_area")]
    pub study_area: LayerBinding,

    #[serde(rename = "Core_Area", default = "default_core_area")]
    pub core_area: LayerBinding,
}

impl Default for MapLayers {
    fn default() -> Self {
        Self {
            study_area: default_study_area(),
            core_area: default_core_area(),
        }
    }
}

/// A named map layer and the data source it should point at.
///
/// An empty source means "leave the layer as saved in the project".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerBinding {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Source", default)]
    pub source: String,
}

/// One protected-area layer in the zoning catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZonageLayer {
    /// Stable identifier used in logs and tests.
    #[serde(rename = "Key")]
    pub key: String,

    /// Human title, also the worksheet name in the zoning workbook.
    #[serde(rename = "Title")]
    pub title: String,

    #[serde(rename = "Source")]
    pub source: LayerSource,

    /// Attribute holding the feature display name.
    #[serde(rename = "Name_Field", default = "default_name_field")]
    pub name_field: String,

    /// Free grouping label ("protection", "inventaire", ...).
    #[serde(rename = "Category", default)]
    pub category: String,
}

/// Where a zoning layer's features come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "snake_case")]
pub enum LayerSource {
    Shapefile {
        #[serde(rename = "Path")]
        path: Utf8PathBuf,
    },
    GeoJson {
        #[serde(rename = "Path")]
        path: Utf8PathBuf,
    },
    Wfs {
        #[serde(rename = "TypeName")]
        typename: String,
    },
}

/// Remote service endpoints used by the lookup features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    #[serde(rename = "Species_Api", default = "default_species_api")]
    pub species_api: String,

    #[serde(rename = "Reverse_Geocode", default = "default_reverse_geocode")]
    pub reverse_geocode: String,

    #[serde(rename = "Elevation", default = "default_elevation")]
    pub elevation: String,

    #[serde(rename = "Wfs", default = "default_wfs")]
    pub wfs: String,

    #[serde(rename = "Imagery_Viewer", default = "default_imagery_viewer")]
    pub imagery_viewer: String,

    #[serde(rename = "Encyclopedia", default = "default_encyclopedia")]
    pub encyclopedia: String,

    /// Fixed per-request timeout in seconds. No retries are attempted.
    #[serde(rename = "Timeout_Secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            species_api: default_species_api(),
            reverse_geocode: default_reverse_geocode(),
            elevation: default_elevation(),
            wfs: default_wfs(),
            imagery_viewer: default_imagery_viewer(),
            encyclopedia: default_encyclopedia(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Export parameters the GUI seeds its controls with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    #[serde(rename = "Dpi", default = "default_dpi")]
    pub dpi: u32,

    #[serde(rename = "Margin_Wide", default = "default_margin_wide")]
    pub margin_wide: f64,

    #[serde(rename = "Margin_Core", default = "default_margin_core")]
    pub margin_core: f64,

    /// Subdirectory of the mission root receiving the exported maps.
    #[serde(rename = "Output_Subdir", default = "default_output_subdir")]
    pub output_subdir: String,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            margin_wide: default_margin_wide(),
            margin_core: default_margin_core(),
            output_subdir: default_output_subdir(),
        }
    }
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_version_date() -> String {
    "25.06.10".to_string()
}

fn default_install_root() -> Utf8PathBuf {
    Utf8PathBuf::from("C:/Program Files/QGIS 3.28.11")
}

fn default_toolkit_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("apps/qgis-ltr")
}

fn default_path_dirs() -> Vec<Utf8PathBuf> {
    vec![
        Utf8PathBuf::from("bin"),
        Utf8PathBuf::from("apps/qgis-ltr/bin"),
        Utf8PathBuf::from("apps/Qt5/bin"),
    ]
}

fn default_engine_env() -> IndexMap<String, String> {
    let mut env = IndexMap::new();
    env.insert("QGIS_PREFIX_PATH".to_string(), "${root}/apps/qgis-ltr".to_string());
    env.insert("GDAL_DATA".to_string(), "${root}/apps/gdal/share/gdal".to_string());
    env.insert("PROJ_LIB".to_string(), "${root}/apps/proj/share/proj".to_string());
    env.insert("QT_QPA_PLATFORM".to_string(), "offscreen".to_string());
    env
}

fn default_project_extensions() -> Vec<String> {
    vec!["qgz".to_string(), "qgs".to_string()]
}

fn default_study_area() -> LayerBinding {
    LayerBinding {
        name: "Aire d'étude élargie".to_string(),
        source: String::new(),
    }
}

fn default_core_area() -> LayerBinding {
    LayerBinding {
        name: "Zone d'emprise".to_string(),
        source: String::new(),
    }
}

fn default_name_field() -> String {
    "NOM".to_string()
}

fn default_zonage_layers() -> Vec<ZonageLayer> {
    let wfs = |key: &str, title: &str, typename: &str, category: &str| ZonageLayer {
        key: key.to_string(),
        title: title.to_string(),
        source: LayerSource::Wfs {
            typename: typename.to_string(),
        },
        name_field: default_name_field(),
        category: category.to_string(),
    };

    vec![
        wfs(
            "znieff1",
            "ZNIEFF de type I",
            "PROTECTEDAREAS.ZNIEFF1:znieff1",
            "inventaire",
        ),
        wfs(
            "znieff2",
            "ZNIEFF de type II",
            "PROTECTEDAREAS.ZNIEFF2:znieff2",
            "inventaire",
        ),
        wfs(
            "natura_sic",
            "Natura 2000 ZSC (habitats)",
            "PROTECTEDAREAS.SIC:sic",
            "protection",
        ),
        wfs(
            "natura_zps",
            "Natura 2000 ZPS (oiseaux)",
            "PROTECTEDAREAS.ZPS:zps",
            "protection",
        ),
        wfs(
            "apb",
            "Arrêtés de protection de biotope",
            "PROTECTEDAREAS.APB:apb",
            "protection",
        ),
        wfs(
            "rnn",
            "Réserves naturelles nationales",
            "PROTECTEDAREAS.RNN:rnn",
            "protection",
        ),
        wfs(
            "rnr",
            "Réserves naturelles régionales",
            "PROTECTEDAREAS.RNR:rnr",
            "protection",
        ),
        wfs(
            "pnr",
            "Parcs naturels régionaux",
            "PROTECTEDAREAS.PNR:pnr",
            "protection",
        ),
    ]
}

fn default_species_api() -> String {
    "https://my-api.plantnet.org/v2/identify/all".to_string()
}

fn default_reverse_geocode() -> String {
    "https://api-adresse.data.gouv.fr/reverse/".to_string()
}

fn default_elevation() -> String {
    "https://data.geopf.fr/altimetrie/1.0/calcul/alti/rest/elevation.json".to_string()
}

fn default_wfs() -> String {
    "https://data.geopf.fr/wfs/ows".to_string()
}

fn default_imagery_viewer() -> String {
    "https://remonterletemps.ign.fr/comparer/basic".to_string()
}

fn default_encyclopedia() -> String {
    "https://fr.wikipedia.org".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_dpi() -> u32 {
    300
}

fn default_margin_wide() -> f64 {
    1.1
}

fn default_margin_core() -> f64 {
    1.2
}

fn default_output_subdir() -> String {
    "Export cartes".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_zonage_layers() {
        let catalog = CatalogConfig::default();
        assert!(!catalog.data.zonages.is_empty());
        assert!(catalog.data.zonages.iter().all(|z| !z.key.is_empty()));
    }

    #[test]
    fn partial_yaml_fills_missing_sections() {
        let yaml = r#"
Zonatlas_Data:
  Version: "9.9.9"
"#;
        let catalog: CatalogConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(catalog.data.version, "9.9.9");
        assert_eq!(catalog.data.export.dpi, 300);
        assert_eq!(catalog.data.services.timeout_secs, 30);
        assert_eq!(catalog.data.layers.study_area.name, "Aire d'étude élargie");
    }

    #[test]
    fn layer_source_yaml_shape() {
        let yaml = r#"
Key: "znieff1"
Title: "ZNIEFF de type I"
Source:
  Type: "wfs"
  TypeName: "PROTECTEDAREAS.ZNIEFF1:znieff1"
"#;
        let layer: ZonageLayer = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(layer.name_field, "NOM");
        match layer.source {
            LayerSource::Wfs { ref typename } => {
                assert_eq!(typename, "PROTECTEDAREAS.ZNIEFF1:znieff1");
            }
            _ => panic!("expected a WFS source"),
        }
    }
}
