//! The map engine seam.
//!
//! Everything the export routine needs from the GIS engine sits behind
//! [`MapEngine`], so the pipeline is testable against scripted fakes while
//! production talks to the render driver subprocess in [`driver`]. A process
//! hosts at most one engine at a time, enforced by [`EngineSession`].

pub mod driver;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::models::catalog::EngineConfig;
use crate::services::extent::MapExtent;

pub use driver::DriverEngine;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start render driver '{exe}': {source}")]
    Spawn {
        exe: Utf8PathBuf,
        source: std::io::Error,
    },
    #[error("driver i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("render driver closed its pipe unexpectedly")]
    DriverClosed,
    #[error("driver protocol error: {0}")]
    Protocol(String),
    #[error("engine operation failed: {0}")]
    Operation(String),
    #[error("an engine session is already active in this process")]
    SessionActive,
}

/// First print layout of an open project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub name: String,
    /// Page size in millimetres.
    pub width_mm: f64,
    pub height_mm: f64,
    /// CRS the layout's map item renders in.
    pub crs: String,
}

impl LayoutInfo {
    /// Page aspect ratio, square when the stored page size is unusable.
    pub fn aspect_ratio(&self) -> f64 {
        if self.width_mm > 0.0 && self.height_mm > 0.0 {
            self.width_mm / self.height_mm
        } else {
            1.0
        }
    }
}

/// A layer extent together with the CRS it is expressed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoExtent {
    pub extent: MapExtent,
    pub crs: String,
}

/// Stateful engine handle scoped to one open project at a time.
///
/// Methods take `&mut self` because the underlying engine is a stateful
/// subprocess; callers drive it strictly sequentially.
#[cfg_attr(test, mockall::automock)]
pub trait MapEngine {
    fn open_project(&mut self, path: &Utf8Path) -> Result<(), EngineError>;

    /// The project's first print layout, `None` when it has none.
    fn first_layout(&mut self) -> Result<Option<LayoutInfo>, EngineError>;

    /// Point the named layer at `source`. Ok(false) when the project has no
    /// layer of that name; that is not an error.
    fn rebind_layer(&mut self, layer_name: &str, source: &str) -> Result<bool, EngineError>;

    fn layer_extent(&mut self, layer_name: &str) -> Result<GeoExtent, EngineError>;

    fn reproject_extent(
        &mut self,
        extent: &MapExtent,
        from_crs: &str,
        to_crs: &str,
    ) -> Result<MapExtent, EngineError>;

    fn export_layout(
        &mut self,
        layout_name: &str,
        extent: &MapExtent,
        dpi: u32,
        output: &Utf8Path,
    ) -> Result<(), EngineError>;

    fn close_project(&mut self) -> Result<(), EngineError>;
}

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Exclusive handle on the one engine instance a process may host.
///
/// The engine's profile locks and native plugin state do not survive two
/// instances in the same process. Acquisition flips a process-global flag;
/// dropping the session shuts the driver down and releases the flag.
pub struct EngineSession {
    engine: DriverEngine,
}

impl EngineSession {
    pub fn acquire(cfg: &EngineConfig) -> Result<Self, EngineError> {
        if !try_activate(&SESSION_ACTIVE) {
            return Err(EngineError::SessionActive);
        }

        match DriverEngine::spawn(cfg) {
            Ok(engine) => Ok(Self { engine }),
            Err(err) => {
                SESSION_ACTIVE.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    pub fn engine(&mut self) -> &mut DriverEngine {
        &mut self.engine
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.engine.shutdown();
        SESSION_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// One-shot activation: true only for the caller that flips the flag.
fn try_activate(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}
