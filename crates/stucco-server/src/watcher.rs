//! File watching for rebuilds and live reload.

use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use glob::{MatchOptions, Pattern};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

use crate::server::ServerError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// What to do when a watched file changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Re-run a task, then tell browsers to refresh stylesheets (`css`) or
    /// reload the page.
    Run { task: String, css: bool },

    /// Reload the page without running anything
    Reload,
}

/// Maps a glob, relative to the project root, to an action.
#[derive(Debug, Clone)]
pub struct WatchRule {
    pattern: Pattern,
    action: WatchAction,
}

impl WatchRule {
    pub fn run(pattern: &str, task: &str, css: bool) -> Result<Self, ServerError> {
        Self::new(
            pattern,
            WatchAction::Run {
                task: task.to_string(),
                css,
            },
        )
    }

    pub fn reload(pattern: &str) -> Result<Self, ServerError> {
        Self::new(pattern, WatchAction::Reload)
    }

    fn new(pattern: &str, action: WatchAction) -> Result<Self, ServerError> {
        let pattern = Pattern::new(pattern).map_err(|e| ServerError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { pattern, action })
    }

    pub fn action(&self) -> &WatchAction {
        &self.action
    }

    /// Whether a root-relative path matches this rule.
    pub fn matches(&self, rel: &Path) -> bool {
        self.pattern.matches_with(&to_slash(rel), MATCH_OPTIONS)
    }

    /// Longest directory prefix of the pattern without glob syntax.
    fn base(&self) -> PathBuf {
        let mut base = PathBuf::new();
        let parts: Vec<&str> = self.pattern.as_str().split('/').collect();
        for (i, part) in parts.iter().enumerate() {
            let last = i + 1 == parts.len();
            if last || part.contains(['*', '?', '[']) {
                break;
            }
            base.push(part);
        }
        base
    }
}

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Project root; rule patterns are relative to it
    pub root: PathBuf,

    pub rules: Vec<WatchRule>,

    /// Directories never reported, matched against any path component or
    /// as a root-relative prefix
    pub ignore: Vec<String>,

    /// Events closer together than this are coalesced
    pub debounce: Duration,
}

impl WatchConfig {
    pub fn new(root: impl Into<PathBuf>, rules: Vec<WatchRule>) -> Self {
        Self {
            root: root.into(),
            rules,
            ignore: vec![
                "dist".to_string(),
                "node_modules".to_string(),
                ".git".to_string(),
            ],
            debounce: Duration::from_millis(100),
        }
    }

    /// Actions triggered by a change to `path`, in rule order.
    pub fn actions_for(&self, path: &Path) -> Vec<WatchAction> {
        let Some(rel) = self.relative(path) else {
            return Vec::new();
        };
        if self.is_ignored(&rel) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        for rule in &self.rules {
            if rule.matches(&rel) && !actions.contains(&rule.action) {
                actions.push(rule.action.clone());
            }
        }
        actions
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        if path.is_relative() {
            return Some(path.to_path_buf());
        }
        if let Ok(rel) = path.strip_prefix(&self.root) {
            return Some(rel.to_path_buf());
        }
        let canonical = self.root.canonicalize().ok()?;
        path.strip_prefix(canonical).ok().map(Path::to_path_buf)
    }

    fn is_ignored(&self, rel: &Path) -> bool {
        self.ignore.iter().any(|ignored| {
            rel.starts_with(ignored)
                || rel
                    .components()
                    .any(|c| matches!(c, Component::Normal(name) if name == ignored.as_str()))
        })
    }

    /// Existing directories covering every rule, without nested duplicates.
    fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = self
            .rules
            .iter()
            .map(|rule| self.root.join(rule.base()))
            .filter(|dir| dir.is_dir())
            .collect();
        roots.sort();
        roots.dedup();

        let mut kept: Vec<PathBuf> = Vec::new();
        for root in roots {
            if !kept.iter().any(|k| root.starts_with(k)) {
                kept.push(root);
            }
        }
        kept
    }

    /// Directories to register with the OS watcher.
    ///
    /// A root with an ignored directory directly below it is watched on its
    /// own, and each of its other subdirectories recursively, so ignored
    /// trees never get watches.
    fn watch_targets(&self) -> Vec<(PathBuf, RecursiveMode)> {
        let mut targets = Vec::new();

        for root in self.watch_roots() {
            let mut children: Vec<PathBuf> = match std::fs::read_dir(&root) {
                Ok(entries) => entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect(),
                Err(_) => Vec::new(),
            };
            children.sort();

            let ignored = |dir: &Path| {
                self.relative(dir)
                    .is_some_and(|rel| self.is_ignored(&rel))
            };
            if !children.iter().any(|c| ignored(c)) {
                targets.push((root, RecursiveMode::Recursive));
                continue;
            }

            targets.push((root, RecursiveMode::NonRecursive));
            for child in children {
                if !ignored(&child) {
                    targets.push((child, RecursiveMode::Recursive));
                }
            }
        }

        targets
    }
}

/// File watcher for detecting source changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Start watching.
    ///
    /// Returns the watcher and a channel of actions. Every burst of events
    /// within the debounce window yields each distinct action once.
    pub fn new(
        config: WatchConfig,
    ) -> Result<(Self, async_mpsc::Receiver<WatchAction>), ServerError> {
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res {
                let _ = sync_tx.send(event);
            }
        })
        .map_err(|e| ServerError::WatchError(e.to_string()))?;

        for (path, mode) in config.watch_targets() {
            tracing::debug!("Watching {}", path.display());
            watcher
                .watch(&path, mode)
                .map_err(|e| ServerError::WatchError(format!("{}: {}", path.display(), e)))?;
        }

        std::thread::spawn(move || {
            while let Ok(first) = sync_rx.recv() {
                let mut pending = Vec::new();
                collect(&config, &first, &mut pending);

                let deadline = Instant::now() + config.debounce;
                let mut disconnected = false;
                loop {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    match sync_rx.recv_timeout(deadline - now) {
                        Ok(event) => collect(&config, &event, &mut pending),
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => {
                            disconnected = true;
                            break;
                        }
                    }
                }

                for action in pending {
                    if async_tx.blocking_send(action).is_err() {
                        return;
                    }
                }
                if disconnected {
                    return;
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

fn collect(config: &WatchConfig, event: &notify::Event, pending: &mut Vec<WatchAction>) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    for path in &event.paths {
        for action in config.actions_for(path) {
            if !pending.contains(&action) {
                tracing::debug!("{} changed", path.display());
                pending.push(action);
            }
        }
    }
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
