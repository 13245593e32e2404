//! Reload client injection into HTML responses.

use glob::{MatchOptions, Pattern};

use crate::reload::RELOAD_SCRIPT_PATH;
use crate::server::ServerError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Decides which request paths get the reload client.
///
/// An `allow` match always injects; otherwise a `deny` match prevents it.
#[derive(Debug, Clone, Default)]
pub struct InjectionRules {
    allow: Vec<Pattern>,
    deny: Vec<Pattern>,
}

impl InjectionRules {
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self, ServerError> {
        Ok(Self {
            allow: compile(allow)?,
            deny: compile(deny)?,
        })
    }

    /// Whether a response for `path` (query string ignored) gets the client.
    pub fn should_inject(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);

        if self.allow.iter().any(|p| p.matches_with(path, MATCH_OPTIONS)) {
            return true;
        }
        !self.deny.iter().any(|p| p.matches_with(path, MATCH_OPTIONS))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, ServerError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| ServerError::InvalidPattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

/// The script tag that loads the reload client.
pub fn client_tag() -> String {
    format!(r#"<script async src="{}"></script>"#, RELOAD_SCRIPT_PATH)
}

/// Insert `tag` before the last `</body>`, or append it when there is none.
pub fn inject_tag(html: &str, tag: &str) -> String {
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..pos]);
            out.push_str(tag);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}
