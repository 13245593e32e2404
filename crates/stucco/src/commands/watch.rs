//! Watch command: build, serve, rebuild on change.

use std::path::{Component, Path};
use std::sync::Arc;

use anyhow::{Context, Result};
use stucco_pipeline::{build_graph, PipelineConfig};
use stucco_server::{rebuild_on_change, DevServer, FileWatcher, WatchConfig, WatchRule};

use crate::config::{load_config, project_root, ConfigFile};

/// Run the watch command.
pub async fn run(config_path: &Path, open: bool) -> Result<()> {
    let file_config = load_config(config_path)?;
    let root = project_root(config_path)?;
    let pipeline = file_config.pipeline(&root);

    let graph = Arc::new(build_graph(pipeline.clone()).context("Failed to register tasks")?);
    graph.run(&["watch"]).await.context("Initial build failed")?;

    let mut watch_config = WatchConfig::new(&root, watch_rules(&file_config, &pipeline)?);
    watch_config.debounce = file_config.debounce();
    let dist = to_slash(&pipeline.dist_dir);
    if !dist.is_empty() && !watch_config.ignore.contains(&dist) {
        watch_config.ignore.push(dist);
    }

    let mut server_config = file_config.server(&pipeline);
    server_config.open = server_config.open && open;
    let server = DevServer::new(server_config);

    let (watcher, rx) = FileWatcher::new(watch_config).context("Failed to start file watcher")?;
    tokio::spawn(rebuild_on_change(Arc::clone(&graph), rx, server.hub()));

    server.start().await?;

    drop(watcher);
    Ok(())
}

/// Map source globs to the tasks that rebuild them.
pub fn watch_rules(file_config: &ConfigFile, pipeline: &PipelineConfig) -> Result<Vec<WatchRule>> {
    let src = to_slash(&pipeline.src_dir);
    let prefix = if src.is_empty() {
        String::new()
    } else {
        format!("{}/", src)
    };

    let (scss_task, css_task) = if pipeline.styles.merge {
        ("styles", "styles")
    } else {
        ("scss", "css")
    };

    let mut rules = vec![
        WatchRule::run(
            &format!("{}{}/**/*.scss", prefix, pipeline.styles.dir),
            scss_task,
            true,
        )?,
        WatchRule::run(&format!("{}css/**/*.css", prefix), css_task, true)?,
        WatchRule::run(&format!("{}scripts/**/*.js", prefix), "scripts", false)?,
        WatchRule::run(&format!("{}images/**/*", prefix), "images", false)?,
        WatchRule::run(&format!("{}fonts/**/*", prefix), "fonts", false)?,
    ];
    for glob in file_config.reload_globs() {
        rules.push(WatchRule::reload(&glob)?);
    }

    Ok(rules)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
