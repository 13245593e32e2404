//! Task listing command.

use std::path::Path;

use anyhow::{Context, Result};
use stucco_pipeline::build_graph;

use crate::config::{load_config, project_root};

/// Print every registered task with its description and dependencies.
pub fn run(config_path: &Path) -> Result<()> {
    let file_config = load_config(config_path)?;
    let root = project_root(config_path)?;
    let graph = build_graph(file_config.pipeline(&root)).context("Failed to register tasks")?;

    for task in graph.tasks() {
        println!("{:<16} {}", task.name(), task.summary().unwrap_or(""));
        if !task.dependencies().is_empty() {
            println!("{:<16}   deps: {}", "", task.dependencies().join(", "));
        }
    }

    Ok(())
}
