//! Line origins for concatenated sources.
//!
//! Bundles are built by concatenating files before they are minified, so the
//! minifier's source map points into the concatenation. [`Concat`] remembers
//! where every line of the concatenation came from and rewrites such a map to
//! point at the original files.

use std::path::{Path, PathBuf};

use parcel_sourcemap::{OriginalLocation, SourceMap};

use crate::error::PipelineError;

/// Concatenated text with the origin of each of its lines.
#[derive(Debug, Clone, Default)]
pub struct Concat {
    code: String,
    sources: Vec<(PathBuf, String)>,
    lines: Vec<Option<(u32, u32)>>,
}

impl Concat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Input files in the order they were registered.
    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.sources.iter().map(|(path, _)| path.as_path())
    }

    /// Register a source file, returning its index. Registering a path
    /// twice returns the first index.
    pub fn add_source(&mut self, path: &Path, content: &str) -> u32 {
        if let Some(i) = self.sources.iter().position(|(p, _)| p == path) {
            return i as u32;
        }
        self.sources.push((path.to_path_buf(), content.to_string()));
        (self.sources.len() - 1) as u32
    }

    /// Append one line, `origin` being `(source, line)` with zero-based lines.
    pub fn push_line(&mut self, line: &str, origin: Option<(u32, u32)>) {
        self.code.push_str(line);
        if !line.ends_with('\n') {
            self.code.push('\n');
        }
        self.lines.push(origin);
    }

    /// Append a whole registered source.
    pub fn push_source(&mut self, source: u32, text: &str) {
        for (i, line) in text.split_inclusive('\n').enumerate() {
            self.push_line(line, Some((source, i as u32)));
        }
    }

    /// Rewrite a source map over [`Concat::code`] so that it points at the
    /// registered files. Source paths are made relative to `root`.
    pub fn remap(&self, map_json: &str, root: &Path) -> Result<String, PipelineError> {
        let root = root.to_string_lossy();
        let input = SourceMap::from_json("/", map_json).map_err(map_error)?;

        let mut output = SourceMap::new(&root);
        let mut indices = Vec::with_capacity(self.sources.len());
        for (path, content) in &self.sources {
            let index = output.add_source(&path.to_string_lossy());
            output
                .set_source_content(index as usize, content)
                .map_err(map_error)?;
            indices.push(index);
        }

        for mapping in input.get_mappings() {
            let original = mapping.original.and_then(|location| {
                let (source, line) = self
                    .lines
                    .get(location.original_line as usize)
                    .copied()
                    .flatten()?;
                Some(OriginalLocation {
                    original_line: line,
                    original_column: location.original_column,
                    source: indices[source as usize],
                    name: None,
                })
            });
            if original.is_some() {
                output.add_mapping(mapping.generated_line, mapping.generated_column, original);
            }
        }

        output.to_json(None).map_err(map_error)
    }
}

fn map_error(e: parcel_sourcemap::SourceMapError) -> PipelineError {
    PipelineError::SourceMap(format!("{:?}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Map where generated line `n` column 0 comes from line `n` of a single
    /// source, the way a minifier would describe its input.
    fn identity_map(lines: u32) -> String {
        let mut map = SourceMap::new("/");
        let source = map.add_source("bundle.js");
        for line in 0..lines {
            map.add_mapping(
                line,
                0,
                Some(OriginalLocation {
                    original_line: line,
                    original_column: 0,
                    source,
                    name: None,
                }),
            );
        }
        map.to_json(None).unwrap()
    }

    #[test]
    fn tracks_line_origins() {
        let mut concat = Concat::new();
        let a = concat.add_source(Path::new("/site/a.js"), "one\ntwo\n");
        let b = concat.add_source(Path::new("/site/b.js"), "three");

        concat.push_source(a, "one\ntwo\n");
        concat.push_line("// directive removed\n", None);
        concat.push_source(b, "three");

        assert_eq!(concat.code(), "one\ntwo\n// directive removed\nthree\n");
        assert_eq!(concat.add_source(Path::new("/site/a.js"), ""), a);
        assert_eq!(concat.sources().count(), 2);
    }

    #[test]
    fn remaps_onto_original_files() {
        let mut concat = Concat::new();
        let a = concat.add_source(Path::new("/site/a.js"), "one\ntwo\n");
        let b = concat.add_source(Path::new("/site/lib/b.js"), "three\n");
        concat.push_source(a, "one\ntwo\n");
        concat.push_line("//= require lib/b\n", None);
        concat.push_source(b, "three\n");

        let json = concat.remap(&identity_map(4), Path::new("/site")).unwrap();
        assert!(json.contains("a.js"));
        assert!(json.contains("lib/b.js"));
        assert!(!json.contains("bundle.js"));

        let map = SourceMap::from_json("/", &json).unwrap();
        let origins: Vec<(u32, u32, u32)> = map
            .get_mappings()
            .into_iter()
            .filter_map(|m| m.original.map(|o| (m.generated_line, o.source, o.original_line)))
            .collect();
        assert_eq!(origins, vec![(0, 0, 0), (1, 0, 1), (3, 1, 0)]);
    }
}
