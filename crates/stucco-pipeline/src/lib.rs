//! Asset pipeline tasks for stucco.
//!
//! Bundles and minifies scripts, compiles and prefixes stylesheets, optimizes
//! images, copies fonts, and registers all of them as named tasks on a
//! [`stucco_tasks::TaskGraph`].

pub mod clean;
pub mod config;
pub mod error;
pub mod files;
pub mod fonts;
pub mod images;
pub mod include;
pub mod scripts;
pub mod sourcemap;
pub mod styles;
pub mod tasks;

pub use config::{FontsConfig, ImagesConfig, PipelineConfig, ScriptsConfig, StylesConfig};
pub use error::PipelineError;
pub use include::{Bundle, Bundler, Directive, DirectiveKind, DirectiveScope};
pub use sourcemap::Concat;
pub use styles::{ProcessedCss, StyleProcessor};
pub use tasks::{build_graph, register_tasks};
