//! Font aggregation.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::files;

/// Copy project fonts and vendor fonts into the output fonts directory.
///
/// Project fonts keep their relative paths; vendor fonts are flattened.
pub fn copy_fonts(config: &PipelineConfig) -> Result<usize, PipelineError> {
    let src = config.fonts_src();
    let out = config.fonts_out();
    let mut count = 0;

    for path in files::walk_files(&src) {
        files::copy(&path, &out.join(files::relative_to(&path, &src)))?;
        count += 1;
    }

    for pattern in &config.fonts.vendor {
        let matches = files::glob_files(&config.root, pattern)?;
        if matches.is_empty() {
            tracing::warn!("No fonts match {}", pattern);
            continue;
        }

        for path in matches {
            if let Some(name) = path.file_name() {
                files::copy(&path, &out.join(name))?;
                count += 1;
            }
        }
    }

    Ok(count)
}
