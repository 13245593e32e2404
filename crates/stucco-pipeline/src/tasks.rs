//! Registration of the asset tasks on a task graph.

use std::path::PathBuf;
use std::sync::Arc;

use stucco_tasks::{GraphError, Task, TaskGraph};

use crate::config::PipelineConfig;
use crate::{clean, fonts, images, scripts, styles};

/// Build a graph containing every asset task.
pub fn build_graph(config: PipelineConfig) -> Result<TaskGraph, GraphError> {
    let mut graph = TaskGraph::new();
    register_tasks(&mut graph, Arc::new(config))?;
    Ok(graph)
}

/// Register the asset tasks.
///
/// Compile tasks run after `clean` whenever both are part of one invocation,
/// and depend on the clean task of the directory they own.
pub fn register_tasks(graph: &mut TaskGraph, config: Arc<PipelineConfig>) -> Result<(), GraphError> {
    graph.register(clean_task("clean", config.dist_dir.clone(), &config).description("Delete the whole output root"))?;
    for (name, dir) in [
        ("clean:scripts", config.scripts_out()),
        ("clean:styles", config.css_out()),
        ("clean:images", config.images_out()),
        ("clean:fonts", config.fonts_out()),
    ] {
        graph.register(
            clean_task(name, dir, &config)
                .runs_after(["clean"])
                .description(format!("Delete {}", name.trim_start_matches("clean:"))),
        )?;
    }

    let cfg = Arc::clone(&config);
    graph.register(
        Task::new("uglify")
            .depends_on(["clean:scripts"])
            .runs_after(["clean"])
            .description("Minify every script except the entry")
            .run(move || {
                let count = scripts::minify_scripts(&cfg)?;
                tracing::info!("Minified {} scripts", count);
                Ok(())
            }),
    )?;
    graph.register(
        Task::new("minify")
            .depends_on(["uglify"])
            .description("Alias of uglify"),
    )?;

    let cfg = Arc::clone(&config);
    graph.register(
        Task::new("scripts")
            .depends_on(["clean:scripts", "uglify"])
            .runs_after(["clean"])
            .description("Bundle and minify the entry script")
            .run(move || {
                let output = scripts::bundle_entry(&cfg)?;
                tracing::info!(
                    "Bundled {} scripts into {}",
                    output.files,
                    output.path.display()
                );
                Ok(())
            }),
    )?;

    let cfg = Arc::clone(&config);
    graph.register(
        Task::new("css")
            .runs_after(["clean", "clean:styles"])
            .description("Prefix and minify plain stylesheets")
            .run(move || {
                let count = styles::build_css(&cfg)?;
                tracing::info!("Processed {} stylesheets", count);
                Ok(())
            }),
    )?;

    let cfg = Arc::clone(&config);
    graph.register(
        Task::new("scss")
            .runs_after(["clean", "clean:styles"])
            .description("Compile SCSS into one bundle")
            .run(move || {
                let count = styles::build_scss(&cfg)?;
                tracing::info!("Compiled {} SCSS files", count);
                Ok(())
            }),
    )?;

    let cfg = Arc::clone(&config);
    graph.register(
        Task::new("styles")
            .depends_on(["clean:styles"])
            .runs_after(["clean"])
            .description("Merge SCSS and CSS into one bundle")
            .run(move || {
                let count = styles::build_merged(&cfg)?;
                tracing::info!("Merged {} stylesheets", count);
                Ok(())
            }),
    )?;

    let cfg = Arc::clone(&config);
    graph.register(
        Task::new("images")
            .depends_on(["clean:images"])
            .runs_after(["clean"])
            .description("Optimize images")
            .run(move || {
                let report = images::optimize_images(&cfg)?;
                tracing::info!(
                    "Optimized {} images, saved {} bytes",
                    report.files,
                    report.saved_bytes
                );
                Ok(())
            }),
    )?;

    let cfg = Arc::clone(&config);
    graph.register(
        Task::new("fonts")
            .depends_on(["clean:fonts"])
            .runs_after(["clean"])
            .description("Copy project and vendor fonts")
            .run(move || {
                let count = fonts::copy_fonts(&cfg)?;
                tracing::info!("Copied {} fonts", count);
                Ok(())
            }),
    )?;

    let mut build_deps = vec!["clean", "scripts", "uglify"];
    build_deps.extend(config.style_tasks());
    build_deps.push("images");
    graph.register(
        Task::new("build")
            .depends_on(build_deps)
            .description("Clean and compile scripts, styles and images"),
    )?;
    graph.register(
        Task::new("default")
            .depends_on(["build", "fonts"])
            .description("Build and copy fonts"),
    )?;
    graph.register(
        Task::new("watch")
            .depends_on(["build", "fonts"])
            .description("Build, then serve and rebuild on change"),
    )?;

    Ok(())
}

fn clean_task(name: &str, dir: PathBuf, config: &Arc<PipelineConfig>) -> Task {
    let cfg = Arc::clone(config);
    Task::new(name).run(move || {
        if clean::clean(&cfg.root, &dir)? {
            tracing::info!("Deleted {}", dir.display());
        }
        Ok(())
    })
}
