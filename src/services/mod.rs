//! Services module - business logic behind the GUI tabs.
//!
//! Everything here is framework-agnostic: no Slint types, no GUI state.
//! The GUI controller composes these services, and the worker binary uses
//! a subset of them without any GUI at all.
//!
//! # Components
//!
//! - [`export`]: the batch map pipeline. [`export::ExportCoordinator`] fans
//!   projects out across worker processes, [`export::export_project`] is
//!   the per-project routine a worker runs against the engine.
//! - [`engine`]: the map engine boundary. [`engine::MapEngine`] is the
//!   operation trait, [`engine::DriverEngine`] speaks JSON lines to the
//!   driver subprocess, [`engine::EngineSession`] enforces the single
//!   session per process.
//! - [`bootstrap`]: environment preparation a worker performs before the
//!   first native engine call.
//! - [`discovery`]: project discovery under the mission folder.
//! - [`zoning`]: protected-area analysis around a study site.
//! - [`report`]: the zoning workbook and imagery document writers.
//! - [`geoservices`]: HTTP clients for the public geodata services.
//! - [`imagery`]: headless-browser captures of historical aerial views.
//! - [`encyclopedia`]: species page summaries.
//! - [`coords`], [`extent`], [`partition`], [`paths`]: small pure helpers
//!   the pipeline leans on.

pub mod bootstrap;
pub mod coords;
pub mod discovery;
pub mod encyclopedia;
pub mod engine;
pub mod export;
pub mod extent;
pub mod geoservices;
pub mod imagery;
pub mod partition;
pub mod paths;
pub mod report;
pub mod zoning;

pub use coords::CoordinateParser;
pub use discovery::{DiscoveredProject, ProjectDiscoverer};
pub use engine::{DriverEngine, EngineError, EngineSession, MapEngine};
pub use export::{CoordError, ExportCoordinator, export_project};
pub use extent::MapExtent;
pub use geoservices::{GeoClient, WebError};
pub use partition::partition;
pub use zoning::{StudyArea, ZoningReport};
