//! Task invocation command.

use std::path::Path;

use anyhow::{Context, Result};
use stucco_pipeline::build_graph;

use crate::commands::watch;
use crate::config::{load_config, project_root};

/// Run the named tasks and everything they depend on.
///
/// `watch` keeps running after its build, so it is handed to the watch
/// command.
pub async fn run(config_path: &Path, tasks: &[String]) -> Result<()> {
    if tasks.iter().any(|t| t == "watch") {
        if tasks.len() > 1 {
            tracing::warn!("'watch' runs on its own; ignoring the other tasks");
        }
        return watch::run(config_path, true).await;
    }

    let file_config = load_config(config_path)?;
    let root = project_root(config_path)?;
    let graph = build_graph(file_config.pipeline(&root)).context("Failed to register tasks")?;

    let names: Vec<&str> = tasks.iter().map(String::as_str).collect();
    let report = graph.run(&names).await?;

    tracing::info!(
        "Completed {} tasks in {}ms",
        report.completed.len(),
        report.duration_ms
    );

    Ok(())
}
