//! Long-path handling for deep mission trees.
//!
//! Mission folders on office file servers nest deep enough to cross the
//! classic 260 character Windows path limit. File access therefore goes
//! through an ordered list of path forms: once a path is long, the
//! extended-length form (`\\?\`) comes first and the classic form stays as
//! a fallback for filesystems that reject the prefix.

use camino::{Utf8Path, Utf8PathBuf};

/// Classic Windows MAX_PATH limit, including the terminating NUL.
pub const CLASSIC_PATH_LIMIT: usize = 260;

const VERBATIM_PREFIX: &str = r"\\?\";
const UNC_PREFIX: &str = r"\\";

/// Extended-length form of an absolute Windows path.
///
/// Forward slashes are normalised to backslashes because the `\\?\` prefix
/// disables separator translation. Paths already carrying the prefix are
/// returned unchanged.
pub fn extended_length_form(path: &Utf8Path) -> Utf8PathBuf {
    let raw = path.as_str();
    if raw.starts_with(VERBATIM_PREFIX) {
        return path.to_path_buf();
    }

    let swapped = raw.replace('/', "\\");
    if let Some(share) = swapped.strip_prefix(UNC_PREFIX) {
        Utf8PathBuf::from(format!(r"\\?\UNC\{share}"))
    } else {
        Utf8PathBuf::from(format!(r"\\?\{swapped}"))
    }
}

/// Ordered path forms to try when accessing `path`.
///
/// Short paths get the classic form only. Paths at or beyond the classic
/// limit get the extended-length form first, classic second.
pub fn ordered_forms(path: &Utf8Path) -> Vec<Utf8PathBuf> {
    if path.as_str().len() < CLASSIC_PATH_LIMIT {
        vec![path.to_path_buf()]
    } else {
        vec![extended_length_form(path), path.to_path_buf()]
    }
}

/// Platform-aware candidates: the extended-length form only means something
/// on Windows, everywhere else the path is used as given.
pub fn access_candidates(path: &Utf8Path) -> Vec<Utf8PathBuf> {
    if cfg!(windows) {
        ordered_forms(path)
    } else {
        vec![path.to_path_buf()]
    }
}

/// Whether any access form of `path` names an existing filesystem entry.
pub fn any_exists(path: &Utf8Path) -> bool {
    access_candidates(path)
        .iter()
        .any(|candidate| candidate.as_std_path().exists())
}
