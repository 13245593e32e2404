//! Initialize stucco in a project.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::project_root;

/// Run the init command.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing stucco...");

    if config_path.exists() && !yes {
        tracing::warn!(
            "{} already exists. Use --yes to overwrite.",
            config_path.display()
        );
        return Ok(());
    }

    fs::write(config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    tracing::info!("Created {}", config_path.display());

    let assets = project_root(config_path)?.join("assets");
    for dir in ["scripts", "css", "scss", "images", "fonts"] {
        fs::create_dir_all(assets.join(dir))
            .with_context(|| format!("Failed to create assets/{}", dir))?;
    }

    for (file, content) in [
        ("scripts/app.js", DEFAULT_SCRIPT),
        ("scss/app.scss", DEFAULT_SCSS),
    ] {
        let path = assets.join(file);
        if !path.exists() || yes {
            fs::write(&path, content)
                .with_context(|| format!("Failed to write assets/{}", file))?;
            tracing::info!("Created assets/{}", file);
        }
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'stucco watch' to start the development server.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Stucco Configuration

[paths]
# Asset sources
src = "assets"

# Build output
dist = "dist"

[scripts]
# Bundled entry under <src>/scripts
entry = "app.js"
include_paths = ["node_modules", "assets/scripts"]

[styles]
# SCSS directory under <src>
dir = "scss"
bundle = "app.css"

# Build one merged bundle from SCSS and CSS instead of separate outputs
merge = false
merged_bundle = "bundle.min.css"
include_paths = ["node_modules"]
browsers = ["last 2 versions"]

[images]
concurrency = 3

[fonts]
vendor = [
    "node_modules/font-awesome/fonts/fontawesome-webfont.*",
    "node_modules/slick-carousel/slick/fonts/*",
]

[server]
host = "127.0.0.1"
port = 3000
# Site to proxy; the output directory is served when unset
# proxy = "mysite.local"
open = true
allow = ["/wp-admin/admin-ajax.php"]
deny = ["/wp-admin/**"]

[watch]
reload = ["**/*.php"]
debounce_ms = 100
"#;

const DEFAULT_SCRIPT: &str = r#"// Pull in other scripts with `//= require file` or `//= require_tree dir`.

(function () {
  "use strict";
})();
"#;

const DEFAULT_SCSS: &str = r#"$text: #222;

body {
  color: $text;
}
"#;
