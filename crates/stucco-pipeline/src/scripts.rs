//! Script bundling and minification.

use std::path::{Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::files;
use crate::include::Bundler;

/// Minified script output.
#[derive(Debug, Clone)]
pub struct MinifiedScript {
    pub code: String,

    /// Source map JSON, when requested
    pub map: Option<String>,
}

/// Result of bundling the entry script.
#[derive(Debug)]
pub struct BundleOutput {
    /// Number of source files in the bundle
    pub files: usize,

    /// Written bundle path
    pub path: PathBuf,
}

/// Minify a script.
///
/// `name` is recorded as the source in the generated source map.
pub fn minify_js(source: &str, name: &Path, source_map: bool) -> Result<MinifiedScript, PipelineError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::cjs()).parse();

    if let Some(error) = parsed.errors.first() {
        return Err(PipelineError::Script {
            path: name.to_path_buf(),
            message: error.to_string(),
        });
    }
    if parsed.panicked {
        return Err(PipelineError::Script {
            path: name.to_path_buf(),
            message: "parser aborted".to_string(),
        });
    }

    let mut program = parsed.program;
    let minified = Minifier::new(MinifierOptions::default()).build(&allocator, &mut program);

    let options = CodegenOptions {
        source_map_path: source_map.then(|| name.to_path_buf()),
        ..CodegenOptions::minify()
    };
    let printed = Codegen::new()
        .with_options(options)
        .with_scoping(minified.scoping)
        .build(&program);

    Ok(MinifiedScript {
        code: printed.code,
        map: printed.map.map(|m| m.to_json_string()),
    })
}

/// Bundle the configured entry script with its includes, minify it and write
/// it with a source map.
///
/// Nothing is written unless the whole include graph resolves and minifies.
pub fn bundle_entry(config: &PipelineConfig) -> Result<BundleOutput, PipelineError> {
    let entry = config.scripts_src().join(&config.scripts.entry);
    if !entry.is_file() {
        return Err(PipelineError::MissingEntry(entry));
    }

    let bundle = Bundler::new(config.script_include_paths()).bundle(&entry)?;
    let minified = minify_js(bundle.code(), Path::new(&config.scripts.entry), true)?;
    let map = minified
        .map
        .as_deref()
        .map(|json| bundle.source.remap(json, &config.source_root()))
        .transpose()?;

    let out = config.scripts_out().join(&config.scripts.entry);
    let map_name = format!(
        "{}.map",
        out.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("bundle.js")
    );

    if let Some(map) = &map {
        files::write(&out.with_file_name(&map_name), map)?;
    }
    files::write(
        &out,
        format!("{}\n//# sourceMappingURL={}\n", minified.code.trim_end(), map_name),
    )?;

    Ok(BundleOutput {
        files: bundle.files.len(),
        path: out,
    })
}

/// Minify every script except the entry, keeping relative paths.
pub fn minify_scripts(config: &PipelineConfig) -> Result<usize, PipelineError> {
    let src = config.scripts_src();
    let out = config.scripts_out();
    let entry = src.join(&config.scripts.entry);
    let mut count = 0;

    for path in files::walk_files(&src) {
        if path == entry || !files::has_extension(&path, "js") {
            continue;
        }

        let rel = files::relative_to(&path, &src);
        let source = files::read_to_string(&path)?;
        let minified = minify_js(&source, &rel, false)?;
        files::write(&out.join(&rel), minified.code)?;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn project(root: &Path) -> PipelineConfig {
        let config = PipelineConfig::with_root(root);
        files::write(
            &config.scripts_src().join("app.js"),
            "//= require modules/menu\nfunction start() {\n  console.log(\"app started\");\n}\nstart();\n",
        )
        .unwrap();
        files::write(
            &config.scripts_src().join("modules/menu.js"),
            "function openMenu() {\n  console.log(\"menu opened\");\n}\nopenMenu();\n",
        )
        .unwrap();
        config
    }

    #[test]
    fn minifies_and_keeps_behaviour() {
        let source = "function greet(name) {\n  var message = \"hello \" + name;\n  console.log(message);\n}\ngreet(\"world\");\n";

        let minified = minify_js(source, Path::new("greet.js"), false).unwrap();

        assert!(minified.code.len() < source.len());
        assert!(minified.code.contains("console.log"));
        assert!(minified.map.is_none());
    }

    #[test]
    fn produces_source_map_when_requested() {
        let minified = minify_js("var answer = 42;\nconsole.log(answer);\n", Path::new("app.js"), true).unwrap();

        let map = minified.map.expect("source map");
        assert!(map.contains("\"mappings\""));
        assert!(map.contains("app.js"));
    }

    #[test]
    fn rejects_invalid_script() {
        let err = minify_js("function (", Path::new("broken.js"), false).unwrap_err();

        assert!(matches!(err, PipelineError::Script { .. }));
    }

    #[test]
    fn bundles_entry_with_source_map() {
        let temp = tempdir().unwrap();
        let config = project(temp.path());

        let output = bundle_entry(&config).unwrap();

        assert_eq!(output.files, 2);
        let bundle = std::fs::read_to_string(config.scripts_out().join("app.js")).unwrap();
        assert!(bundle.contains("menu opened"));
        assert!(bundle.contains("app started"));
        assert!(bundle.find("menu opened") < bundle.find("app started"));
        assert!(bundle.ends_with("//# sourceMappingURL=app.js.map\n"));
        let map = std::fs::read_to_string(config.scripts_out().join("app.js.map")).unwrap();
        assert!(map.contains("assets/scripts/app.js"));
        assert!(map.contains("assets/scripts/modules/menu.js"));
        assert!(map.contains("menu opened"));
    }

    #[test]
    fn missing_include_writes_nothing() {
        let temp = tempdir().unwrap();
        let config = project(temp.path());
        files::write(
            &config.scripts_src().join("app.js"),
            "//= require modules/nowhere\n",
        )
        .unwrap();

        let err = bundle_entry(&config).unwrap_err();

        assert!(matches!(err, PipelineError::UnresolvedInclude { .. }));
        assert!(!config.scripts_out().join("app.js").exists());
    }

    #[test]
    fn minifies_everything_but_the_entry() {
        let temp = tempdir().unwrap();
        let config = project(temp.path());

        let count = minify_scripts(&config).unwrap();

        assert_eq!(count, 1);
        assert!(config.scripts_out().join("modules/menu.js").exists());
        assert!(!config.scripts_out().join("app.js").exists());
    }
}
