//! Include directive resolution for script bundles.
//!
//! Scripts pull other scripts in with comment directives:
//!
//! ```text
//! //= require vendor/jquery
//! //= include partials/menu.js
//! //= require_tree components
//! /*= require_directory plugins */
//! ```
//!
//! `require` inlines a file at most once per bundle, `include` every time it
//! appears. Targets without an extension get `.js`. Targets are looked up next
//! to the including file first, then in each include path.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::PipelineError;
use crate::files;
use crate::sourcemap::Concat;

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?://|/\*)=\s*(require|include)(?:_(tree|directory))?\s+(.+?)\s*$")
        .expect("Invalid include directive regex")
});

/// How often a directive inlines its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// Once per bundle
    Require,
    /// Every time
    Include,
}

/// What a directive target names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveScope {
    /// A file or a glob of files
    File,
    /// Every script below a directory
    Tree,
    /// Every script directly in a directory
    Directory,
}

/// A parsed include directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub scope: DirectiveScope,
    pub target: String,
}

impl Directive {
    /// Parse a single source line.
    pub fn parse(line: &str) -> Option<Self> {
        let caps = DIRECTIVE_RE.captures(line)?;

        let kind = match &caps[1] {
            "require" => DirectiveKind::Require,
            _ => DirectiveKind::Include,
        };
        let scope = match caps.get(2).map(|m| m.as_str()) {
            Some("tree") => DirectiveScope::Tree,
            Some(_) => DirectiveScope::Directory,
            None => DirectiveScope::File,
        };

        let raw = caps[3].trim();
        let raw = raw.strip_suffix("*/").unwrap_or(raw).trim();
        let target = raw.trim_matches(|c| c == '"' || c == '\'');
        if target.is_empty() {
            return None;
        }

        Some(Self {
            kind,
            scope,
            target: target.to_string(),
        })
    }
}

/// A resolved bundle.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Concatenated source and the file each line came from
    pub source: Concat,

    /// Every inlined file in resolution order, entry first
    pub files: Vec<PathBuf>,
}

impl Bundle {
    pub fn code(&self) -> &str {
        self.source.code()
    }
}

/// Resolves include directives starting from an entry script.
#[derive(Debug, Clone)]
pub struct Bundler {
    include_paths: Vec<PathBuf>,
    extension: String,
}

#[derive(Default)]
struct BundleState {
    included: HashSet<PathBuf>,
    stack: Vec<PathBuf>,
    files: Vec<PathBuf>,
    out: Concat,
}

impl Bundler {
    /// Create a bundler searching the given include paths.
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self {
            include_paths,
            extension: "js".to_string(),
        }
    }

    /// Resolve the include graph of `entry` and concatenate it.
    ///
    /// Fails on the first directive that cannot be resolved.
    pub fn bundle(&self, entry: &Path) -> Result<Bundle, PipelineError> {
        let mut state = BundleState::default();
        self.expand(entry, &mut state)?;

        Ok(Bundle {
            source: state.out,
            files: state.files,
        })
    }

    fn expand(&self, file: &Path, state: &mut BundleState) -> Result<(), PipelineError> {
        let canonical = fs::canonicalize(file).map_err(|source| PipelineError::Read {
            path: file.to_path_buf(),
            source,
        })?;

        if state.stack.contains(&canonical) {
            let mut cycle = state.stack.clone();
            cycle.push(canonical);
            return Err(PipelineError::IncludeCycle(cycle));
        }

        let source = files::read_to_string(&canonical)?;
        state.included.insert(canonical.clone());
        state.files.push(file.to_path_buf());
        state.stack.push(canonical.clone());
        let index = state.out.add_source(&canonical, &source);

        for (n, line) in source.split_inclusive('\n').enumerate() {
            let Some(directive) = Directive::parse(line.trim_end_matches(['\r', '\n'])) else {
                state.out.push_line(line, Some((index, n as u32)));
                continue;
            };

            for target in self.resolve(&directive, &canonical)? {
                if directive.kind == DirectiveKind::Require {
                    let key = fs::canonicalize(&target).unwrap_or_else(|_| target.clone());
                    if state.included.contains(&key) {
                        tracing::debug!("Skipping already required {}", target.display());
                        continue;
                    }
                }
                self.expand(&target, state)?;
            }
        }

        state.stack.pop();
        Ok(())
    }

    /// Find the files a directive refers to.
    fn resolve(&self, directive: &Directive, from: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let target = match directive.scope {
            DirectiveScope::File if Path::new(&directive.target).extension().is_none() => {
                format!("{}.{}", directive.target, self.extension)
            }
            _ => directive.target.clone(),
        };

        let bases = from
            .parent()
            .into_iter()
            .map(Path::to_path_buf)
            .chain(self.include_paths.iter().cloned());

        for base in bases {
            let found = match directive.scope {
                DirectiveScope::File if files::is_glob(&target) => {
                    files::glob_files(&base, &target)?
                }
                DirectiveScope::File => {
                    let candidate = base.join(&target);
                    if candidate.is_file() {
                        vec![candidate]
                    } else {
                        Vec::new()
                    }
                }
                DirectiveScope::Tree | DirectiveScope::Directory => {
                    let dir = base.join(&target);
                    if !dir.is_dir() {
                        continue;
                    }
                    let listed = if directive.scope == DirectiveScope::Tree {
                        files::walk_files(&dir)
                    } else {
                        files::list_files(&dir)
                    };
                    return Ok(listed
                        .into_iter()
                        .filter(|p| files::has_extension(p, &self.extension))
                        .collect());
                }
            };

            if !found.is_empty() {
                return Ok(found);
            }
        }

        Err(PipelineError::UnresolvedInclude {
            target: directive.target.clone(),
            from: from.to_path_buf(),
        })
    }
}
