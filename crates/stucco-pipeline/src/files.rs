//! Filesystem helpers shared by the tasks.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::PipelineError;

pub fn read(path: &Path) -> Result<Vec<u8>, PipelineError> {
    fs::read(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_to_string(path: &Path) -> Result<String, PipelineError> {
    fs::read_to_string(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a file, creating parent directories as needed.
pub fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| PipelineError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy a file, creating parent directories as needed.
pub fn copy(from: &Path, to: &Path) -> Result<(), PipelineError> {
    let contents = read(from)?;
    write(to, contents)
}

/// All files below `dir`, sorted. A missing directory yields no files.
pub fn walk_files(dir: &Path) -> Vec<PathBuf> {
    walk(dir, usize::MAX)
}

/// Direct children of `dir` that are files, sorted.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    walk(dir, 1)
}

fn walk(dir: &Path, max_depth: usize) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    WalkDir::new(dir)
        .follow_links(true)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Files matching a glob pattern interpreted relative to `base`, sorted.
pub fn glob_files(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!(
            "{}/{}",
            glob::Pattern::escape(&base.to_string_lossy()),
            pattern
        )
    };

    let paths = glob::glob(&full).map_err(|e| PipelineError::Pattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = paths.filter_map(|p| p.ok()).filter(|p| p.is_file()).collect();
    files.sort();
    Ok(files)
}

pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// `path` relative to `base`, or its file name when it is not below `base`.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    match path.strip_prefix(base) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path.file_name().map(PathBuf::from).unwrap_or_default(),
    }
}
