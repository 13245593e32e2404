//! Development server with live reload for stucco.
//!
//! Proxies an externally served site (or serves the output root), injects a
//! reload client into HTML responses, and re-runs asset tasks when sources
//! change.

pub mod inject;
pub mod proxy;
pub mod rebuild;
pub mod reload;
pub mod server;
pub mod watcher;

pub use inject::InjectionRules;
pub use proxy::Upstream;
pub use rebuild::{handle_action, rebuild_on_change};
pub use reload::{ReloadHub, ReloadMessage};
pub use server::{DevServer, DevServerConfig, ServerError};
pub use watcher::{FileWatcher, WatchAction, WatchConfig, WatchRule};
