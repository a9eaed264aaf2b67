//! Engine environment bootstrap for worker processes.
//!
//! The render engine resolves its native libraries through PATH and a
//! handful of engine-specific variables. All of them must be in place before
//! the first engine call in a process, so the worker binary applies this
//! bootstrap right after reading its job, while it is still single-threaded.

use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::models::catalog::EngineConfig;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("engine install root not found: {0}")]
    InstallRootMissing(Utf8PathBuf),
    #[error("engine toolkit directory not found: {0}")]
    ToolkitMissing(Utf8PathBuf),
    #[error("PATH could not be rebuilt: {0}")]
    PathRebuild(String),
}

/// Environment changes computed from the catalog, before anything is applied
/// to the process.
#[derive(Debug)]
pub struct ResolvedEnv {
    pub path: OsString,
    pub vars: Vec<(String, String)>,
}

/// Validate the engine install and compute the environment for it.
///
/// Fails fast when the install root or its toolkit directory is missing;
/// nothing is mutated in that case.
pub fn resolve(
    cfg: &EngineConfig,
    current_path: Option<OsString>,
) -> Result<ResolvedEnv, BootstrapError> {
    let root = &cfg.install_root;
    if !root.as_std_path().is_dir() {
        return Err(BootstrapError::InstallRootMissing(root.clone()));
    }
    let toolkit = root.join(&cfg.toolkit_dir);
    if !toolkit.as_std_path().is_dir() {
        return Err(BootstrapError::ToolkitMissing(toolkit));
    }

    let prepend: Vec<PathBuf> = cfg
        .path_dirs
        .iter()
        .map(|dir| root.join(dir).into_std_path_buf())
        .collect();

    Ok(ResolvedEnv {
        path: merged_path(current_path, &prepend)?,
        vars: cfg
            .env
            .iter()
            .map(|(key, value)| (key.clone(), expand(value, root)))
            .collect(),
    })
}

/// Prepend `prepend` to `current`, skipping entries already present.
///
/// Merging twice yields the same value, so a worker that re-runs the
/// bootstrap cannot grow PATH without bound.
pub fn merged_path(
    current: Option<OsString>,
    prepend: &[PathBuf],
) -> Result<OsString, BootstrapError> {
    let existing: Vec<PathBuf> = current
        .as_ref()
        .map(|path| env::split_paths(path).collect())
        .unwrap_or_default();

    let mut combined: Vec<PathBuf> = Vec::with_capacity(existing.len() + prepend.len());
    for dir in prepend {
        if !existing.contains(dir) && !combined.contains(dir) {
            combined.push(dir.clone());
        }
    }
    combined.extend(existing.iter().cloned());

    env::join_paths(combined).map_err(|err| BootstrapError::PathRebuild(err.to_string()))
}

/// Expand the `${root}` placeholder in a catalog environment value.
fn expand(value: &str, root: &Utf8Path) -> String {
    value.replace("${root}", root.as_str())
}

/// Resolve and apply the engine environment to this process.
///
/// Must be called before the process spawns any thread. On edition 2024
/// mutating the environment is `unsafe` precisely because a reader on
/// another thread would race the platform environment block.
pub fn prepare_engine_env(cfg: &EngineConfig) -> Result<(), BootstrapError> {
    let resolved = resolve(cfg, env::var_os("PATH"))?;

    // SAFETY: called from the worker's main before the async runtime or any
    // other thread exists, so nothing reads the environment concurrently.
    unsafe {
        env::set_var("PATH", &resolved.path);
        for (key, value) in &resolved.vars {
            env::set_var(key, value);
        }
    }

    info!(
        root = %cfg.install_root,
        vars = resolved.vars.len(),
        "Engine environment prepared"
    );
    Ok(())
}
