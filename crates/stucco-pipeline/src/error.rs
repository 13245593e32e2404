//! Pipeline errors.

use std::io;
use std::path::PathBuf;

/// Errors that can occur while processing assets.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to remove {}: {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },

    #[error("Refusing to delete {}: not inside the project root", .0.display())]
    UnsafeClean(PathBuf),

    #[error("Script entry not found: {}", .0.display())]
    MissingEntry(PathBuf),

    #[error("Cannot resolve include '{target}' in {}", .from.display())]
    UnresolvedInclude { target: String, from: PathBuf },

    #[error("Include cycle: {}", format_cycle(.0))]
    IncludeCycle(Vec<PathBuf>),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("Failed to minify {}: {message}", .path.display())]
    Script { path: PathBuf, message: String },

    #[error("Failed to process stylesheet {name}: {message}")]
    Style { name: String, message: String },

    #[error("Failed to build source map: {0}")]
    SourceMap(String),

    #[error("Invalid browser query: {0}")]
    Browsers(String),

    #[error("Failed to optimize {}: {message}", .path.display())]
    Image { path: PathBuf, message: String },
}

fn format_cycle(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
