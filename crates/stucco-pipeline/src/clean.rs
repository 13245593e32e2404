//! Output cleaning.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::PipelineError;

/// Recursively delete `target` (relative paths are resolved against `root`).
///
/// Returns whether anything was removed. A missing target is not an error.
/// Targets that are the root itself or lie outside it are refused.
pub fn clean(root: &Path, target: &Path) -> Result<bool, PipelineError> {
    let target = root.join(target);

    if fs::symlink_metadata(&target).is_err() {
        return Ok(false);
    }

    let canonical_root = fs::canonicalize(root).map_err(|source| PipelineError::Read {
        path: root.to_path_buf(),
        source,
    })?;
    let canonical = fs::canonicalize(&target).map_err(|source| PipelineError::Read {
        path: target.clone(),
        source,
    })?;

    if canonical == canonical_root || !canonical.starts_with(&canonical_root) {
        return Err(PipelineError::UnsafeClean(target));
    }

    let result = if canonical.is_dir() {
        fs::remove_dir_all(&canonical)
    } else {
        fs::remove_file(&canonical)
    };

    match result {
        Ok(()) => {
            tracing::debug!("Deleted {}", target.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(PipelineError::Remove {
            path: target,
            source,
        }),
    }
}
