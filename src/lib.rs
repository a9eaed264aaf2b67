// Zonatlas - batch map export and zoning analysis for ecological studies.
//
// Library crate shared by the two binaries: main.rs owns the GUI, worker.rs
// renders one chunk of projects per process.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Short paths for the types nearly every caller needs
pub use config::ConfigManager;
pub use models::{AppState, CatalogConfig, Preferences};
pub use state::{StateChange, StateManager};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
