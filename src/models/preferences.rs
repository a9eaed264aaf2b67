//! Per-user preferences stored as `~/.zonatlas.json`.
//!
//! The file is loaded leniently: a missing or unreadable file falls back to
//! defaults, so settings corruption never blocks startup. Keys written by
//! newer builds are preserved across a load + save cycle.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::job::CropMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_crop_mode")]
    pub crop_mode: CropMode,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default)]
    pub overwrite_existing: bool,

    #[serde(default = "default_dpi")]
    pub dpi: u32,

    /// Last mission root the user worked in, restored at startup.
    #[serde(default)]
    pub mission_root: String,

    #[serde(default = "default_study_radius_m")]
    pub study_radius_m: f64,

    #[serde(default)]
    pub plantnet_api_key: String,

    #[serde(default)]
    pub debug_mode: bool,

    /// Unknown keys round-trip untouched.
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            crop_mode: default_crop_mode(),
            worker_count: default_worker_count(),
            overwrite_existing: false,
            dpi: default_dpi(),
            mission_root: String::new(),
            study_radius_m: default_study_radius_m(),
            plantnet_api_key: String::new(),
            debug_mode: false,
            extra: IndexMap::new(),
        }
    }
}

fn default_crop_mode() -> CropMode {
    CropMode::Both
}

fn default_worker_count() -> usize {
    3
}

fn default_dpi() -> u32 {
    300
}

fn default_study_radius_m() -> f64 {
    5000.0
}
