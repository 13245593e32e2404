//! `stucco.toml` loading.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use stucco_pipeline::PipelineConfig;
use stucco_server::DevServerConfig;

/// Configuration file structure (stucco.toml).
///
/// Every field is optional; anything unset keeps the built-in default.
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub paths: PathsSection,
    pub scripts: ScriptsSection,
    pub styles: StylesSection,
    pub images: ImagesSection,
    pub fonts: FontsSection,
    pub server: ServerSection,
    pub watch: WatchSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PathsSection {
    pub src: Option<PathBuf>,
    pub dist: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptsSection {
    pub entry: Option<String>,
    pub include_paths: Option<Vec<PathBuf>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct StylesSection {
    pub dir: Option<String>,
    pub bundle: Option<String>,
    pub merged_bundle: Option<String>,
    pub merge: Option<bool>,
    pub include_paths: Option<Vec<PathBuf>>,
    pub browsers: Option<Vec<String>>,
    pub strip_comments: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesSection {
    pub concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct FontsSection {
    pub vendor: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub proxy: Option<String>,
    pub open: Option<bool>,
    pub allow: Option<Vec<String>>,
    pub deny: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct WatchSection {
    pub reload: Option<Vec<String>>,
    pub debounce_ms: Option<u64>,
}

impl ConfigFile {
    /// Pipeline settings for a project rooted at `root`.
    pub fn pipeline(&self, root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::with_root(root);

        if let Some(src) = &self.paths.src {
            config.src_dir = src.clone();
        }
        if let Some(dist) = &self.paths.dist {
            config.dist_dir = dist.clone();
        }

        let scripts = &mut config.scripts;
        if let Some(entry) = &self.scripts.entry {
            scripts.entry = entry.clone();
        }
        if let Some(paths) = &self.scripts.include_paths {
            scripts.include_paths = paths.clone();
        }

        let styles = &mut config.styles;
        if let Some(dir) = &self.styles.dir {
            styles.dir = dir.clone();
        }
        if let Some(bundle) = &self.styles.bundle {
            styles.bundle = bundle.clone();
        }
        if let Some(bundle) = &self.styles.merged_bundle {
            styles.merged_bundle = bundle.clone();
        }
        if let Some(merge) = self.styles.merge {
            styles.merge = merge;
        }
        if let Some(paths) = &self.styles.include_paths {
            styles.include_paths = paths.clone();
        }
        if let Some(browsers) = &self.styles.browsers {
            styles.browsers = browsers.clone();
        }
        if let Some(strip) = self.styles.strip_comments {
            styles.strip_comments = strip;
        }

        if let Some(concurrency) = self.images.concurrency {
            config.images.concurrency = concurrency.max(1);
        }
        if let Some(vendor) = &self.fonts.vendor {
            config.fonts.vendor = vendor.clone();
        }

        config
    }

    /// Dev server settings; the output root is served when no proxy is set.
    pub fn server(&self, pipeline: &PipelineConfig) -> DevServerConfig {
        let defaults = DevServerConfig::default();
        DevServerConfig {
            host: self.server.host.clone().unwrap_or(defaults.host),
            port: self.server.port.unwrap_or(defaults.port),
            proxy: self.server.proxy.clone(),
            serve_dir: pipeline.dist(),
            open: self.server.open.unwrap_or(defaults.open),
            allow: self.server.allow.clone().unwrap_or(defaults.allow),
            deny: self.server.deny.clone().unwrap_or(defaults.deny),
        }
    }

    /// Globs that trigger a plain page reload.
    pub fn reload_globs(&self) -> Vec<String> {
        self.watch
            .reload
            .clone()
            .unwrap_or_else(|| vec!["**/*.php".to_string()])
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms.unwrap_or(100))
    }
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        tracing::debug!("No {} found, using defaults", path.display());
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::debug!("Loaded config from {}", path.display());

    Ok(config)
}

/// Directory containing the config file; all configured paths are relative
/// to it.
pub fn project_root(config_path: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let dir = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd,
    };
    Ok(dir.canonicalize().unwrap_or(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_means_defaults() {
        let temp = tempdir().unwrap();
        let config = load_config(&temp.path().join("stucco.toml")).unwrap();
        let pipeline = config.pipeline(temp.path());

        assert_eq!(pipeline.src_dir, PathBuf::from("assets"));
        assert_eq!(pipeline.scripts.entry, "app.js");
        assert!(!pipeline.styles.merge);
        assert_eq!(config.reload_globs(), vec!["**/*.php".to_string()]);
        assert_eq!(config.debounce(), Duration::from_millis(100));
    }

    #[test]
    fn overrides_selected_fields() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stucco.toml");
        fs::write(
            &path,
            r#"
[paths]
src = "src"

[styles]
merge = true
browsers = ["safari 10"]

[images]
concurrency = 0

[server]
port = 8080
proxy = "mysite.local/php"

[watch]
reload = ["templates/**/*.twig"]
debounce_ms = 250
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        let pipeline = config.pipeline(temp.path());
        let server = config.server(&pipeline);

        assert_eq!(pipeline.src_dir, PathBuf::from("src"));
        assert_eq!(pipeline.dist_dir, PathBuf::from("dist"));
        assert!(pipeline.styles.merge);
        assert_eq!(pipeline.styles.bundle, "app.css");
        assert_eq!(pipeline.styles.browsers, vec!["safari 10".to_string()]);
        assert_eq!(pipeline.images.concurrency, 1);
        assert_eq!(server.port, 8080);
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.proxy.as_deref(), Some("mysite.local/php"));
        assert_eq!(server.serve_dir, temp.path().join("dist"));
        assert_eq!(server.deny, vec!["/wp-admin/**".to_string()]);
        assert_eq!(config.debounce(), Duration::from_millis(250));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stucco.toml");
        fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("stucco.toml");
        fs::write(&path, "[styles]\nmerged = true\n").unwrap();

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn root_is_config_directory() {
        let temp = tempdir().unwrap();
        let root = project_root(&temp.path().join("stucco.toml")).unwrap();

        assert_eq!(root, temp.path().canonicalize().unwrap());
    }
}
