use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Options for building a tool server from an `OpenAPI` document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSourceConfig {
    /// Which operations become tools.
    #[serde(default)]
    pub discover: DiscoverFilter,

    /// Headers sent with every outbound API call (tool arguments mapped to headers win).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Include/exclude filter over `"METHOD /path"` strings.
///
/// Patterns are simple globs: `*` matches any sequence, `?` any single character, everything
/// else (including `{` and `}` from templated paths) is literal.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiscoverFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl DiscoverFilter {
    /// Whether the operation `method path` should be exposed as a tool.
    #[must_use]
    pub fn allows(&self, method: &str, path: &str) -> bool {
        let operation = format!("{} {}", method.to_uppercase(), path);

        // Exclude patterns win.
        if self.exclude.iter().any(|p| glob_match(p, &operation)) {
            return false;
        }

        if !self.include.is_empty() {
            return self.include.iter().any(|p| glob_match(p, &operation));
        }

        true
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_bytes = pattern.as_bytes();
    let text_bytes = text.as_bytes();

    let mut pattern_index = 0usize;
    let mut text_index = 0usize;

    let mut star_index: Option<usize> = None;
    let mut star_text_index: usize = 0;

    while text_index < text_bytes.len() {
        match pattern_bytes.get(pattern_index) {
            Some(b'*') => {
                star_index = Some(pattern_index);
                pattern_index += 1;
                star_text_index = text_index;
            }
            Some(b'?') => {
                pattern_index += 1;
                text_index += 1;
            }
            Some(&b) if b == text_bytes[text_index] => {
                pattern_index += 1;
                text_index += 1;
            }
            _ => {
                let Some(si) = star_index else {
                    return false;
                };

                // Backtrack: let the last `*` swallow one more byte.
                pattern_index = si + 1;
                star_text_index += 1;
                text_index = star_text_index;
            }
        }
    }

    while matches!(pattern_bytes.get(pattern_index), Some(b'*')) {
        pattern_index += 1;
    }

    pattern_index == pattern_bytes.len()
}
