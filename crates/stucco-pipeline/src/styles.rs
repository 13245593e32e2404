//! Stylesheet compilation.
//!
//! SCSS is compiled with grass. Plain and compiled CSS goes through
//! lightningcss, which adds vendor prefixes for the configured browsers and
//! minifies.

use std::path::{Path, PathBuf};

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::files;
use crate::sourcemap::Concat;

/// Output of [`StyleProcessor::process`].
#[derive(Debug, Clone)]
pub struct ProcessedCss {
    pub code: String,

    /// Source map JSON, when requested
    pub map: Option<String>,
}

/// Vendor-prefixes and minifies CSS.
#[derive(Debug, Clone)]
pub struct StyleProcessor {
    targets: Targets,
    strip_comments: bool,
}

impl StyleProcessor {
    /// Create a processor targeting the given browserslist queries.
    pub fn new(browsers: &[String], strip_comments: bool) -> Result<Self, PipelineError> {
        let browsers = Browsers::from_browserslist(browsers.iter().map(String::as_str))
            .map_err(|e| PipelineError::Browsers(e.to_string()))?;

        Ok(Self {
            targets: Targets {
                browsers,
                ..Targets::default()
            },
            strip_comments,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(&config.styles.browsers, config.styles.strip_comments)
    }

    /// Prefix and minify `source`, recording `name` as its source file.
    pub fn process(&self, source: &str, name: &str, source_map: bool) -> Result<ProcessedCss, PipelineError> {
        let fail = |message: String| PipelineError::Style {
            name: name.to_string(),
            message,
        };

        let mut stylesheet = StyleSheet::parse(
            source,
            ParserOptions {
                filename: name.to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| fail(e.to_string()))?;

        if self.strip_comments {
            stylesheet.license_comments.clear();
        }

        stylesheet
            .minify(MinifyOptions {
                targets: self.targets.clone(),
                ..MinifyOptions::default()
            })
            .map_err(|e| fail(e.to_string()))?;

        let mut map = if source_map {
            let mut sm = SourceMap::new("/");
            sm.add_source(name);
            sm.set_source_content(0, source)
                .map_err(|e| fail(format!("{:?}", e)))?;
            Some(sm)
        } else {
            None
        };

        let printed = stylesheet
            .to_css(PrinterOptions {
                minify: true,
                targets: self.targets.clone(),
                source_map: map.as_mut(),
                ..PrinterOptions::default()
            })
            .map_err(|e| fail(e.to_string()))?;

        let map = match map {
            Some(mut sm) => Some(sm.to_json(None).map_err(|e| fail(format!("{:?}", e)))?),
            None => None,
        };

        Ok(ProcessedCss {
            code: printed.code,
            map,
        })
    }
}

/// Compile one SCSS file.
pub fn compile_scss(path: &Path, load_paths: &[PathBuf]) -> Result<String, PipelineError> {
    let options = grass::Options::default().load_paths(load_paths);

    grass::from_path(path, &options).map_err(|e| PipelineError::Style {
        name: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Compile every non-partial SCSS file in the configured directory.
///
/// Files that fail to compile are logged and skipped.
pub fn compile_scss_dir(config: &PipelineConfig) -> Vec<(PathBuf, String)> {
    let load_paths = config.style_load_paths();

    files::walk_files(&config.scss_src())
        .into_iter()
        .filter(|p| files::has_extension(p, "scss") && !is_partial(p))
        .filter_map(|path| match compile_scss(&path, &load_paths) {
            Ok(css) => Some((path, css)),
            Err(e) => {
                tracing::error!("{}", e);
                None
            }
        })
        .collect()
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

/// Prefix and minify each plain stylesheet on its own.
pub fn build_css(config: &PipelineConfig) -> Result<usize, PipelineError> {
    let processor = StyleProcessor::from_config(config)?;
    let out = config.css_out();
    let mut count = 0;

    for path in css_sources(config) {
        let name = files::relative_to(&path, &config.css_src());
        let source = files::read_to_string(&path)?;
        let processed = processor.process(&source, &name.to_string_lossy(), false)?;
        files::write(&out.join(&name), processed.code)?;
        count += 1;
    }

    Ok(count)
}

/// Compile SCSS and concatenate the results into the SCSS bundle.
pub fn build_scss(config: &PipelineConfig) -> Result<usize, PipelineError> {
    let compiled = compile_scss_dir(config);
    if compiled.is_empty() {
        tracing::warn!("No SCSS compiled from {}", config.scss_src().display());
        return Ok(0);
    }

    let processor = StyleProcessor::from_config(config)?;
    let mut combined = Concat::new();
    for (path, css) in &compiled {
        append(&mut combined, path, css);
    }
    write_bundle(config, &processor, &combined, &config.styles.bundle)?;

    Ok(compiled.len())
}

/// Merge compiled SCSS and plain CSS into one bundle.
pub fn build_merged(config: &PipelineConfig) -> Result<usize, PipelineError> {
    let compiled = compile_scss_dir(config);

    let mut plain = Vec::new();
    for path in css_sources(config) {
        let css = files::read_to_string(&path)?;
        plain.push((path, css));
    }

    if compiled.is_empty() && plain.is_empty() {
        tracing::warn!("No stylesheets found under {}", config.src().display());
        return Ok(0);
    }

    let processor = StyleProcessor::from_config(config)?;
    let mut combined = Concat::new();
    for (path, css) in compiled.iter().chain(plain.iter()) {
        append(&mut combined, path, css);
    }
    write_bundle(config, &processor, &combined, &config.styles.merged_bundle)?;

    Ok(compiled.len() + plain.len())
}

/// grass emits no source maps, so a compiled SCSS file is recorded with its
/// compiled CSS as content; line numbers refer to that output.
fn append(combined: &mut Concat, path: &Path, css: &str) {
    let index = combined.add_source(path, css);
    combined.push_source(index, css);
}

fn css_sources(config: &PipelineConfig) -> Vec<PathBuf> {
    files::list_files(&config.css_src())
        .into_iter()
        .filter(|p| files::has_extension(p, "css"))
        .collect()
}

fn write_bundle(
    config: &PipelineConfig,
    processor: &StyleProcessor,
    combined: &Concat,
    name: &str,
) -> Result<(), PipelineError> {
    let processed = processor.process(combined.code(), name, true)?;
    let out = config.css_out().join(name);
    let map_name = format!("{}.map", name);

    if let Some(map) = &processed.map {
        let map = combined.remap(map, &config.source_root())?;
        files::write(&config.css_out().join(&map_name), map)?;
    }
    files::write(
        &out,
        format!("{}\n/*# sourceMappingURL={} */\n", processed.code, map_name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn processor(query: &str) -> StyleProcessor {
        StyleProcessor::new(&[query.to_string()], true).unwrap()
    }

    #[test]
    fn adds_vendor_prefixes() {
        let css = ".menu { user-select: none; }";

        let processed = processor("safari 10").process(css, "menu.css", false).unwrap();

        assert!(processed.code.contains("-webkit-user-select:none"));
    }

    #[test]
    fn minifies_and_strips_special_comments() {
        let css = "/*! theme v1 */\n.button {\n    color: #ff0000;\n    padding: 10px;\n}\n";

        let processed = processor("last 2 versions").process(css, "button.css", false).unwrap();

        assert!(!processed.code.contains('\n'));
        assert!(!processed.code.contains("theme v1"));
        assert!(processed.code.contains(".button"));
    }

    #[test]
    fn emits_source_map() {
        let processed = processor("last 2 versions")
            .process(".a { color: red }", "app.css", true)
            .unwrap();

        let map = processed.map.expect("source map");
        assert!(map.contains("app.css"));
    }

    #[test]
    fn rejects_invalid_browser_query() {
        assert!(StyleProcessor::new(&["unknownbrowser 99".to_string()], true).is_err());
    }

    #[test]
    fn compiles_scss_with_partials() {
        let temp = tempdir().unwrap();
        let config = PipelineConfig::with_root(temp.path());
        files::write(&config.scss_src().join("_vars.scss"), "$brand: #336699;").unwrap();
        files::write(
            &config.scss_src().join("main.scss"),
            "@import 'vars';\n.header { .title { color: $brand; } }\n",
        )
        .unwrap();

        let compiled = compile_scss_dir(&config);

        assert_eq!(compiled.len(), 1);
        assert!(compiled[0].1.contains(".header .title"));
        assert!(compiled[0].1.contains("#336699"));
    }

    #[test]
    fn scss_errors_are_skipped() {
        let temp = tempdir().unwrap();
        let config = PipelineConfig::with_root(temp.path());
        files::write(&config.scss_src().join("broken.scss"), ".a { color: $undefined; }").unwrap();
        files::write(&config.scss_src().join("ok.scss"), ".b { color: blue; }").unwrap();

        let count = build_scss(&config).unwrap();

        assert_eq!(count, 1);
        let bundle = std::fs::read_to_string(config.css_out().join("app.css")).unwrap();
        assert!(bundle.contains(".b"));
        assert!(bundle.ends_with("/*# sourceMappingURL=app.css.map */\n"));
        assert!(config.css_out().join("app.css.map").exists());
    }

    #[test]
    fn plain_css_written_per_file() {
        let temp = tempdir().unwrap();
        let config = PipelineConfig::with_root(temp.path());
        files::write(&config.css_src().join("a.css"), ".a { color: red; }").unwrap();
        files::write(&config.css_src().join("b.css"), ".b { color: blue; }").unwrap();

        assert_eq!(build_css(&config).unwrap(), 2);
        assert!(config.css_out().join("a.css").exists());
        assert!(config.css_out().join("b.css").exists());
    }

    #[test]
    fn invalid_plain_css_fails() {
        let temp = tempdir().unwrap();
        let config = PipelineConfig::with_root(temp.path());
        files::write(&config.css_src().join("bad.css"), "..broken { color: red }").unwrap();

        assert!(build_css(&config).is_err());
    }

    #[test]
    fn merged_bundle_contains_both_inputs() {
        let temp = tempdir().unwrap();
        let mut config = PipelineConfig::with_root(temp.path());
        config.styles.merge = true;
        files::write(&config.scss_src().join("site.scss"), ".from-scss { margin: 0; }").unwrap();
        files::write(&config.css_src().join("extra.css"), ".from-css { padding: 0; }").unwrap();

        assert_eq!(build_merged(&config).unwrap(), 2);
        let bundle = std::fs::read_to_string(config.css_out().join("bundle.min.css")).unwrap();
        assert!(bundle.find(".from-scss") < bundle.find(".from-css"));

        let map = std::fs::read_to_string(config.css_out().join("bundle.min.css.map")).unwrap();
        assert!(map.contains("assets/scss/site.scss"));
        assert!(map.contains("assets/css/extra.css"));
        assert!(!map.contains("\"bundle.min.css\""));
    }
}
