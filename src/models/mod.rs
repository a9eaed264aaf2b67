//! Data models for the Zonatlas application.
//!
//! This module contains all the core data structures used throughout the application:
//! - [`AppState`]: The central state container holding runtime data, settings, and run tallies
//! - [`CatalogConfig`]: Engine location, layer bindings, zoning catalog, and service endpoints loaded from `Zonatlas Catalog.yaml`
//! - [`Preferences`]: Per-user settings loaded from `~/.zonatlas.json`
//! - [`ChunkJob`] / [`ProjectOutcome`]: The JSON wire format between coordinator and worker processes
//! - [`DEFAULT_WORKER_COUNT`]: Starting size of the export worker pool
//!
//! # Architecture Note
//!
//! The models are designed to be:
//! - **Serializable**: Config and job structs derive `Serialize`/`Deserialize` for YAML/JSON persistence
//! - **Cloneable**: AppState is wrapped in `Arc<RwLock<>>` by [`StateManager`](crate::state::StateManager) for thread-safe access
//! - **Immutable**: State updates go through StateManager's `update()` method to ensure consistency

pub mod app_state;
pub mod catalog;
pub mod job;
pub mod preferences;

pub use app_state::{AppState, DEFAULT_WORKER_COUNT, ExportPhase, RunRecord};
pub use catalog::{
    CatalogConfig, CatalogData, EngineConfig, LayerBinding, LayerSource, MapLayers,
    ServiceEndpoints, ZonageLayer,
};
pub use job::{
    ChunkJob, CropKind, CropMode, CropOutcome, CropStatus, ExportConfig, ExportSummary,
    ProjectOutcome,
};
pub use preferences::Preferences;
