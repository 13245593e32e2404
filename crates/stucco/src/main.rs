//! Stucco CLI - front-end asset pipeline with a live-reload dev proxy.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "stucco")]
#[command(about = "Front-end asset pipeline with a live-reload dev proxy")]
#[command(version)]
pub struct Cli {
    /// Defaults to running the `default` task
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to stucco.toml config file
    #[arg(short, long, global = true, default_value = "stucco.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more tasks with their dependencies
    Run {
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// Build every asset except fonts
    Build,

    /// Delete the output directory
    Clean,

    /// Build, then proxy the site and rebuild on change
    Watch {
        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// List available tasks
    Tasks,

    /// Create stucco.toml and the asset source layout
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        None => {
            commands::run::run(&cli.config, &["default".to_string()]).await?;
        }
        Some(Commands::Run { tasks }) => {
            commands::run::run(&cli.config, &tasks).await?;
        }
        Some(Commands::Build) => {
            commands::run::run(&cli.config, &["build".to_string()]).await?;
        }
        Some(Commands::Clean) => {
            commands::run::run(&cli.config, &["clean".to_string()]).await?;
        }
        Some(Commands::Watch { no_open }) => {
            commands::watch::run(&cli.config, !no_open).await?;
        }
        Some(Commands::Tasks) => {
            commands::tasks::run(&cli.config)?;
        }
        Some(Commands::Init { yes }) => {
            commands::init::run(&cli.config, yes).await?;
        }
    }

    Ok(())
}
