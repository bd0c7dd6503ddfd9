use std::fs;
use std::path::{Path, PathBuf};

use crate::debug_log::DebugLog;
use crate::error::{ResourceKind, SessionError};

/// Locate a model or sample file.
///
/// An explicit path that exists wins outright. An explicit path that does
/// not exist still falls back to the directory scan (with a notice in the
/// log), as does having no explicit path at all. Both fallback branches must
/// behave identically from here on; callers rely on that.
///
/// The scan picks the first entry `read_dir` yields, without sorting.
/// Enumeration order is whatever the filesystem provides, so with more than
/// one candidate the pick is not reproducible across platforms; tests seed a
/// single file.
pub fn resolve(
    explicit: Option<&Path>,
    fallback_dir: &Path,
    kind: ResourceKind,
    log: &DebugLog,
) -> Result<PathBuf, SessionError> {
    match explicit {
        Some(path) if path.exists() => {
            log.write(&format!("Using {} at {}", kind, path.display()));
            return Ok(path.to_path_buf());
        }
        Some(path) => {
            log.write(&format!(
                "Configured {} path {} does not exist, falling back to {}",
                kind,
                path.display(),
                fallback_dir.display()
            ));
        }
        None => {
            log.write(&format!(
                "No {} path configured, scanning {}",
                kind,
                fallback_dir.display()
            ));
        }
    }

    let not_found = || SessionError::ResourceNotFound {
        kind,
        searched: fallback_dir.display().to_string(),
    };

    let mut entries = fs::read_dir(fallback_dir).map_err(|_| not_found())?;
    let entry = entries
        .next()
        .and_then(|entry| entry.ok())
        .ok_or_else(not_found)?;

    let path = entry.path();
    log.write(&format!(
        "Found {} in {}: {}",
        kind,
        fallback_dir.display(),
        path.display()
    ));

    Ok(path)
}
