//! Export job types shared between the coordinator and worker processes.
//!
//! A [`ChunkJob`] is written as a single JSON document on a worker's stdin.
//! The worker answers with one [`ProjectOutcome`] JSON line per finished
//! project so the coordinator can stream progress while the run is live.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::catalog::{EngineConfig, LayerBinding};

/// Which layout crops an export run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    /// Wide and core crop for every project (the default).
    Both,
    /// Wide crop only.
    Wide,
    /// Core crop only.
    Core,
}

impl CropMode {
    pub fn crops(&self) -> &'static [CropKind] {
        match self {
            CropMode::Both => &[CropKind::Wide, CropKind::Core],
            CropMode::Wide => &[CropKind::Wide],
            CropMode::Core => &[CropKind::Core],
        }
    }

    /// Number of map images a single project is expected to yield.
    pub fn expected_exports(&self) -> usize {
        self.crops().len()
    }

    pub fn from_index(index: i32) -> Self {
        match index {
            1 => CropMode::Wide,
            2 => CropMode::Core,
            _ => CropMode::Both,
        }
    }

    pub fn index(&self) -> i32 {
        match self {
            CropMode::Both => 0,
            CropMode::Wide => 1,
            CropMode::Core => 2,
        }
    }
}

/// A single crop of the print layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropKind {
    /// Framed on the wide study area layer.
    Wide,
    /// Framed on the core area layer.
    Core,
}

impl CropKind {
    /// Suffix appended to the project stem in the output file name.
    pub fn suffix(&self) -> &'static str {
        match self {
            CropKind::Wide => "__AE",
            CropKind::Core => "__ZE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CropKind::Wide => "AE",
            CropKind::Core => "ZE",
        }
    }
}

/// Everything a worker needs to export one project, independent of GUI state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub output_dir: Utf8PathBuf,
    pub mode: CropMode,
    pub overwrite: bool,
    pub dpi: u32,
    pub margin_wide: f64,
    pub margin_core: f64,
    pub study_layer: LayerBinding,
    pub core_layer: LayerBinding,
}

impl ExportConfig {
    /// Layer whose extent frames the given crop.
    pub fn binding_for(&self, kind: CropKind) -> &LayerBinding {
        match kind {
            CropKind::Wide => &self.study_layer,
            CropKind::Core => &self.core_layer,
        }
    }

    pub fn margin_for(&self, kind: CropKind) -> f64 {
        match kind {
            CropKind::Wide => self.margin_wide,
            CropKind::Core => self.margin_core,
        }
    }

    /// Output image path for a project and crop, e.g. `Accès__AE.png`.
    pub fn output_path(&self, project: &Utf8Path, kind: CropKind) -> Utf8PathBuf {
        let stem = project.file_stem().unwrap_or(project.as_str());
        self.output_dir.join(format!("{stem}{}.png", kind.suffix()))
    }
}

/// One worker's share of an export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkJob {
    pub engine: EngineConfig,
    pub export: ExportConfig,
    pub projects: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropStatus {
    Exported,
    Skipped,
    Failed,
}

/// Result of one crop of one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropOutcome {
    pub kind: CropKind,
    pub status: CropStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Utf8PathBuf>,
}

/// Result of one project, with one entry per crop the mode expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectOutcome {
    pub project: Utf8PathBuf,
    pub name: String,
    pub crops: Vec<CropOutcome>,
}

impl ProjectOutcome {
    pub fn new(project: &Utf8Path) -> Self {
        Self {
            project: project.to_path_buf(),
            name: project.file_stem().unwrap_or(project.as_str()).to_string(),
            crops: Vec::new(),
        }
    }

    /// Outcome where every crop the mode expects failed with the same message.
    ///
    /// Used when a project cannot be opened at all, and by the coordinator
    /// when a worker dies before reporting a project.
    pub fn all_failed(project: &Utf8Path, mode: CropMode, message: &str) -> Self {
        let mut outcome = Self::new(project);
        for kind in mode.crops() {
            outcome.crops.push(CropOutcome {
                kind: *kind,
                status: CropStatus::Failed,
                message: message.to_string(),
                output: None,
            });
        }
        outcome
    }

    pub fn record(
        &mut self,
        kind: CropKind,
        status: CropStatus,
        message: impl Into<String>,
        output: Option<Utf8PathBuf>,
    ) {
        self.crops.push(CropOutcome {
            kind,
            status,
            message: message.into(),
            output,
        });
    }

    pub fn exported(&self) -> usize {
        self.count(CropStatus::Exported)
    }

    pub fn failed(&self) -> usize {
        self.count(CropStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(CropStatus::Skipped)
    }

    fn count(&self, status: CropStatus) -> usize {
        self.crops.iter().filter(|c| c.status == status).count()
    }
}

/// Aggregated totals for a whole run.
///
/// Totals are sums over per-project outcomes, so merging chunk results in
/// any order yields the same summary.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub outcomes: Vec<ProjectOutcome>,
    pub exported: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl ExportSummary {
    pub fn absorb(&mut self, outcome: ProjectOutcome) {
        self.exported += outcome.exported();
        self.failed += outcome.failed();
        self.skipped += outcome.skipped();
        self.outcomes.push(outcome);
    }

    pub fn total_projects(&self) -> usize {
        self.outcomes.len()
    }
}
