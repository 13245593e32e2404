//! Pipeline configuration.

use std::path::{Path, PathBuf};

/// Configuration for the asset tasks.
///
/// Relative paths are resolved against `root`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Project root
    pub root: PathBuf,

    /// Source asset root
    pub src_dir: PathBuf,

    /// Output root
    pub dist_dir: PathBuf,

    pub scripts: ScriptsConfig,
    pub styles: StylesConfig,
    pub images: ImagesConfig,
    pub fonts: FontsConfig,
}

/// Script bundling settings.
#[derive(Debug, Clone)]
pub struct ScriptsConfig {
    /// Entry file, relative to the scripts source directory
    pub entry: String,

    /// Extra directories searched for include directives
    pub include_paths: Vec<PathBuf>,
}

/// Stylesheet settings.
#[derive(Debug, Clone)]
pub struct StylesConfig {
    /// SCSS directory name under the source root
    pub dir: String,

    /// Output name of the compiled SCSS bundle
    pub bundle: String,

    /// Output name of the merged SCSS + CSS bundle
    pub merged_bundle: String,

    /// Build the merged bundle instead of separate CSS and SCSS outputs
    pub merge: bool,

    /// SCSS load paths
    pub include_paths: Vec<PathBuf>,

    /// Browserslist queries used for vendor prefixing
    pub browsers: Vec<String>,

    /// Drop `/*! ... */` comments from the output
    pub strip_comments: bool,
}

/// Image settings.
#[derive(Debug, Clone)]
pub struct ImagesConfig {
    /// Maximum images optimized at once
    pub concurrency: usize,
}

/// Font settings.
#[derive(Debug, Clone)]
pub struct FontsConfig {
    /// Globs of third-party font files, relative to the project root
    pub vendor: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            src_dir: PathBuf::from("assets"),
            dist_dir: PathBuf::from("dist"),
            scripts: ScriptsConfig::default(),
            styles: StylesConfig::default(),
            images: ImagesConfig::default(),
            fonts: FontsConfig::default(),
        }
    }
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            entry: "app.js".to_string(),
            include_paths: vec![PathBuf::from("node_modules"), PathBuf::from("assets/scripts")],
        }
    }
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            dir: "scss".to_string(),
            bundle: "app.css".to_string(),
            merged_bundle: "bundle.min.css".to_string(),
            merge: false,
            include_paths: vec![PathBuf::from("node_modules")],
            browsers: vec!["last 2 versions".to_string()],
            strip_comments: true,
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { concurrency: 3 }
    }
}

impl Default for FontsConfig {
    fn default() -> Self {
        Self {
            vendor: vec![
                "node_modules/font-awesome/fonts/fontawesome-webfont.*".to_string(),
                "node_modules/slick-carousel/slick/fonts/*".to_string(),
            ],
        }
    }
}

impl PipelineConfig {
    /// Config rooted at `root` with default layout.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Root that source map paths are relative to.
    pub fn source_root(&self) -> PathBuf {
        self.root.canonicalize().unwrap_or_else(|_| self.root.clone())
    }

    pub fn src(&self) -> PathBuf {
        self.resolve(&self.src_dir)
    }

    pub fn dist(&self) -> PathBuf {
        self.resolve(&self.dist_dir)
    }

    pub fn scripts_src(&self) -> PathBuf {
        self.src().join("scripts")
    }

    pub fn css_src(&self) -> PathBuf {
        self.src().join("css")
    }

    pub fn scss_src(&self) -> PathBuf {
        self.src().join(&self.styles.dir)
    }

    pub fn images_src(&self) -> PathBuf {
        self.src().join("images")
    }

    pub fn fonts_src(&self) -> PathBuf {
        self.src().join("fonts")
    }

    pub fn scripts_out(&self) -> PathBuf {
        self.dist().join("scripts")
    }

    /// Plain and compiled stylesheets share one output directory.
    pub fn css_out(&self) -> PathBuf {
        self.dist().join("css")
    }

    pub fn images_out(&self) -> PathBuf {
        self.dist().join("images")
    }

    pub fn fonts_out(&self) -> PathBuf {
        self.dist().join("fonts")
    }

    pub fn script_include_paths(&self) -> Vec<PathBuf> {
        self.scripts.include_paths.iter().map(|p| self.resolve(p)).collect()
    }

    pub fn style_load_paths(&self) -> Vec<PathBuf> {
        self.styles.include_paths.iter().map(|p| self.resolve(p)).collect()
    }

    /// The style tasks `build` runs for the configured mode.
    pub fn style_tasks(&self) -> &'static [&'static str] {
        if self.styles.merge {
            &["styles"]
        } else {
            &["css", "scss"]
        }
    }
}
