//! JSON-line protocol to the render driver subprocess.
//!
//! The driver executable wraps the engine's native API. It is spawned once
//! per worker and inherits the bootstrapped environment, which is what makes
//! the environment-before-first-native-call ordering hold. Each request is
//! one JSON line on the driver's stdin, each reply one JSON line on its
//! stdout. Its stderr passes straight through to the worker's, so driver
//! logs land in the chunk log the coordinator collects.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

use crate::models::catalog::EngineConfig;
use crate::services::engine::{EngineError, GeoExtent, LayoutInfo, MapEngine};
use crate::services::extent::MapExtent;

/// Driver executable name, resolved next to the running binary unless the
/// catalog overrides it.
pub const DRIVER_EXE_STEM: &str = "zonatlas-driver";

/// Platform executable suffix, shared with worker process resolution.
pub const EXE_SUFFIX: &str = if cfg!(windows) { ".exe" } else { "" };

#[derive(Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum DriverRequest<'a> {
    OpenProject {
        path: &'a str,
    },
    FirstLayout,
    RebindLayer {
        layer: &'a str,
        source: &'a str,
    },
    LayerExtent {
        layer: &'a str,
    },
    ReprojectExtent {
        extent: MapExtent,
        from: &'a str,
        to: &'a str,
    },
    ExportLayout {
        layout: &'a str,
        extent: MapExtent,
        dpi: u32,
        output: &'a str,
    },
    CloseProject,
    Shutdown,
}

#[derive(Debug, Deserialize)]
struct DriverReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    layout: Option<LayoutInfo>,
    #[serde(default)]
    extent: Option<MapExtent>,
    #[serde(default)]
    crs: Option<String>,
    #[serde(default)]
    layer_found: Option<bool>,
}

/// Production [`MapEngine`]: strict request/reply over the driver's pipes.
pub struct DriverEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl DriverEngine {
    /// Spawn the driver configured in the catalog.
    pub fn spawn(cfg: &EngineConfig) -> Result<Self, EngineError> {
        let exe = resolve_driver_exe(cfg)?;
        let mut child = Command::new(exe.as_std_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                exe: exe.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Protocol("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Protocol("driver stdout unavailable".to_string()))?;

        debug!(driver = %exe, "Render driver started");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn request(&mut self, request: &DriverRequest<'_>) -> Result<DriverReply, EngineError> {
        let mut line = serde_json::to_string(request)
            .map_err(|err| EngineError::Protocol(err.to_string()))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.flush()?;

        let mut reply_line = String::new();
        if self.stdout.read_line(&mut reply_line)? == 0 {
            return Err(EngineError::DriverClosed);
        }

        let reply: DriverReply = serde_json::from_str(reply_line.trim())
            .map_err(|err| EngineError::Protocol(format!("unparseable driver reply: {err}")))?;
        if reply.ok {
            Ok(reply)
        } else {
            Err(EngineError::Operation(
                reply
                    .error
                    .unwrap_or_else(|| "unspecified driver error".to_string()),
            ))
        }
    }

    /// Ask the driver to exit, then reap it. Called on session teardown; a
    /// driver that already died is simply reaped.
    pub(crate) fn shutdown(&mut self) {
        let _ = self.request(&DriverRequest::Shutdown);
        match self.child.wait() {
            Ok(status) => debug!(%status, "Render driver stopped"),
            Err(err) => warn!(error = %err, "Could not reap render driver"),
        }
    }
}

impl Drop for DriverEngine {
    fn drop(&mut self) {
        // Reap whatever is left; shutdown() normally already has.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl MapEngine for DriverEngine {
    fn open_project(&mut self, path: &Utf8Path) -> Result<(), EngineError> {
        self.request(&DriverRequest::OpenProject {
            path: path.as_str(),
        })?;
        Ok(())
    }

    fn first_layout(&mut self) -> Result<Option<LayoutInfo>, EngineError> {
        let reply = self.request(&DriverRequest::FirstLayout)?;
        Ok(reply.layout)
    }

    fn rebind_layer(&mut self, layer_name: &str, source: &str) -> Result<bool, EngineError> {
        let reply = self.request(&DriverRequest::RebindLayer {
            layer: layer_name,
            source,
        })?;
        Ok(reply.layer_found.unwrap_or(false))
    }

    fn layer_extent(&mut self, layer_name: &str) -> Result<GeoExtent, EngineError> {
        let reply = self.request(&DriverRequest::LayerExtent { layer: layer_name })?;
        let extent = reply
            .extent
            .ok_or_else(|| EngineError::Protocol("layer_extent reply missing extent".to_string()))?;
        Ok(GeoExtent {
            extent,
            crs: reply.crs.unwrap_or_default(),
        })
    }

    fn reproject_extent(
        &mut self,
        extent: &MapExtent,
        from_crs: &str,
        to_crs: &str,
    ) -> Result<MapExtent, EngineError> {
        let reply = self.request(&DriverRequest::ReprojectExtent {
            extent: *extent,
            from: from_crs,
            to: to_crs,
        })?;
        reply
            .extent
            .ok_or_else(|| EngineError::Protocol("reproject reply missing extent".to_string()))
    }

    fn export_layout(
        &mut self,
        layout_name: &str,
        extent: &MapExtent,
        dpi: u32,
        output: &Utf8Path,
    ) -> Result<(), EngineError> {
        self.request(&DriverRequest::ExportLayout {
            layout: layout_name,
            extent: *extent,
            dpi,
            output: output.as_str(),
        })?;
        Ok(())
    }

    fn close_project(&mut self) -> Result<(), EngineError> {
        self.request(&DriverRequest::CloseProject)?;
        Ok(())
    }
}

fn resolve_driver_exe(cfg: &EngineConfig) -> Result<Utf8PathBuf, EngineError> {
    if let Some(exe) = &cfg.driver_exe {
        if exe.is_absolute() {
            return Ok(exe.clone());
        }
        // Relative overrides resolve against the engine install.
        return Ok(cfg.install_root.join(exe));
    }

    let current = std::env::current_exe()?;
    let sibling = current.with_file_name(format!("{DRIVER_EXE_STEM}{EXE_SUFFIX}"));
    Utf8PathBuf::from_path_buf(sibling).map_err(|path| {
        EngineError::Protocol(format!("non-UTF-8 driver path: {}", path.display()))
    })
}
