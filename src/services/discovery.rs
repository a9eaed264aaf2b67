//! Project discovery under a mission folder.
//!
//! Walks the configured cartography root for engine project files, with a
//! fallback to the conventional `Cartographie` sibling when the configured
//! folder does not exist. Results are cached briefly so tab switches do not
//! rescan a slow network share.

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Sibling directory tried when the configured root is absent.
const FALLBACK_SIBLING: &str = "Cartographie";

/// How long a scan result stays fresh.
const CACHE_TTL: Duration = Duration::from_secs(30);

/// Recursion guard against cyclic links on network shares.
const MAX_SCAN_DEPTH: usize = 16;

/// One engine project file found under the mission root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredProject {
    /// Display name: the file stem with normalised whitespace.
    pub name: String,
    pub path: Utf8PathBuf,
}

struct CachedScan {
    root: Utf8PathBuf,
    taken_at: Instant,
    projects: Vec<DiscoveredProject>,
}

pub struct ProjectDiscoverer {
    extensions: Vec<String>,
    whitespace: Regex,
    cache: Mutex<Option<CachedScan>>,
    ttl: Duration,
}

impl ProjectDiscoverer {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            // \s is Unicode-aware, so runs containing no-break (U+00A0) and
            // narrow no-break (U+202F) spaces collapse to one plain space.
            whitespace: Regex::new(r"\s+").expect("Invalid whitespace regex"),
            cache: Mutex::new(None),
            ttl: CACHE_TTL,
        }
    }

    #[cfg(test)]
    fn with_ttl(extensions: &[String], ttl: Duration) -> Self {
        let mut discoverer = Self::new(extensions);
        discoverer.ttl = ttl;
        discoverer
    }

    /// Clean a raw file stem for display.
    ///
    /// Copy-pasted project names from office documents arrive with no-break
    /// spaces; those collapse to single plain spaces and the ends are
    /// trimmed.
    pub fn normalize_name(&self, raw: &str) -> String {
        self.whitespace.replace_all(raw, " ").trim().to_string()
    }

    /// List the projects under `configured_root`, from cache when fresh.
    pub fn discover(&self, configured_root: &Utf8Path) -> Vec<DiscoveredProject> {
        self.discover_with(configured_root, false)
    }

    /// Rescan the mission root, ignoring the cache.
    pub fn refresh(&self, configured_root: &Utf8Path) -> Vec<DiscoveredProject> {
        self.discover_with(configured_root, true)
    }

    fn discover_with(&self, configured_root: &Utf8Path, force: bool) -> Vec<DiscoveredProject> {
        let root = match self.resolve_root(configured_root) {
            Some(root) => root,
            None => {
                warn!(
                    root = %configured_root,
                    "Mission root unreachable, no projects listed"
                );
                return Vec::new();
            }
        };

        if !force {
            if let Ok(guard) = self.cache.lock() {
                if let Some(cached) = guard.as_ref() {
                    if cached.root == root && cached.taken_at.elapsed() < self.ttl {
                        return cached.projects.clone();
                    }
                }
            }
        }

        let mut projects = Vec::new();
        self.scan_dir(&root, &mut projects, 0);
        projects.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
        debug!(root = %root, count = projects.len(), "Discovered projects");

        if let Ok(mut guard) = self.cache.lock() {
            *guard = Some(CachedScan {
                root,
                taken_at: Instant::now(),
                projects: projects.clone(),
            });
        }

        projects
    }

    /// The directory actually scanned: the configured root when it exists,
    /// otherwise the `Cartographie` sibling next to it.
    fn resolve_root(&self, configured_root: &Utf8Path) -> Option<Utf8PathBuf> {
        if configured_root.as_std_path().is_dir() {
            return Some(configured_root.to_path_buf());
        }

        let sibling = configured_root.parent()?.join(FALLBACK_SIBLING);
        if sibling.as_std_path().is_dir() {
            debug!(fallback = %sibling, "Configured root absent, using sibling");
            return Some(sibling);
        }
        None
    }

    fn scan_dir(&self, dir: &Utf8Path, out: &mut Vec<DiscoveredProject>, depth: usize) {
        if depth > MAX_SCAN_DEPTH {
            warn!(dir = %dir, "Scan depth limit reached, subtree skipped");
            return;
        }

        let entries = match fs::read_dir(dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir, error = %err, "Unreadable directory skipped");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = match Utf8PathBuf::from_path_buf(entry.path()) {
                Ok(path) => path,
                Err(_) => {
                    warn!("Non-UTF-8 path skipped under {dir}");
                    continue;
                }
            };

            if path.as_std_path().is_dir() {
                self.scan_dir(&path, out, depth + 1);
            } else if self.is_project_file(&path) {
                let stem = path.file_stem().unwrap_or(path.as_str());
                out.push(DiscoveredProject {
                    name: self.normalize_name(stem),
                    path,
                });
            }
        }
    }

    fn is_project_file(&self, path: &Utf8Path) -> bool {
        path.extension()
            .map(|ext| self.extensions.iter().any(|e| e == &ext.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn extensions() -> Vec<String> {
        vec!["qgz".to_string(), "qgs".to_string()]
    }

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn finds_projects_recursively_and_sorted() {
        let dir = TempDir::new().unwrap();
        let root = utf8(&dir);
        std::fs::create_dir_all(root.join("sous/dossier").as_std_path()).unwrap();
        std::fs::write(root.join("Zone humide.qgz").as_std_path(), b"").unwrap();
        std::fs::write(root.join("sous/dossier/Accès.qgs").as_std_path(), b"").unwrap();
        std::fs::write(root.join("notes.txt").as_std_path(), b"").unwrap();

        let discoverer = ProjectDiscoverer::new(&extensions());
        let projects = discoverer.discover(&root);

        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Accès", "Zone humide"]);
    }

    #[test]
    fn display_names_collapse_special_spaces() {
        let dir = TempDir::new().unwrap();
        let root = utf8(&dir);
        std::fs::write(
            root.join("Carte\u{202F}finale\u{00A0} V2.qgz").as_std_path(),
            b"",
        )
        .unwrap();

        let discoverer = ProjectDiscoverer::new(&extensions());
        let projects = discoverer.discover(&root);

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Carte finale V2");
        // The path itself keeps the original characters.
        assert!(projects[0].path.as_str().contains('\u{202F}'));
    }

    #[test]
    fn falls_back_to_cartographie_sibling() {
        let dir = TempDir::new().unwrap();
        let mission = utf8(&dir);
        let sibling = mission.join("Cartographie");
        std::fs::create_dir_all(sibling.as_std_path()).unwrap();
        std::fs::write(sibling.join("Trame verte.qgz").as_std_path(), b"").unwrap();

        let discoverer = ProjectDiscoverer::new(&extensions());
        let projects = discoverer.discover(&mission.join("Cartes"));

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Trame verte");
    }

    #[test]
    fn unreachable_root_yields_empty_list() {
        let dir = TempDir::new().unwrap();
        let root = utf8(&dir).join("nulle/part");

        let discoverer = ProjectDiscoverer::new(&extensions());
        assert!(discoverer.discover(&root).is_empty());
    }

    #[test]
    fn cache_serves_until_refresh() {
        let dir = TempDir::new().unwrap();
        let root = utf8(&dir);
        std::fs::write(root.join("a.qgz").as_std_path(), b"").unwrap();

        let discoverer = ProjectDiscoverer::with_ttl(&extensions(), Duration::from_secs(600));
        assert_eq!(discoverer.discover(&root).len(), 1);

        std::fs::write(root.join("b.qgz").as_std_path(), b"").unwrap();
        assert_eq!(discoverer.discover(&root).len(), 1, "cached result expected");
        assert_eq!(discoverer.refresh(&root).len(), 2);
    }
}
