use serde::{Deserialize, Serialize};

use crate::models::tags::parse_tags;

/// Language tag used when none is given.
pub const DEFAULT_LANGUAGE: &str = "javascript";

/// Language tags the editor knows how to label: (tag, display name, file extensions).
/// Any other tag is still accepted and stored as-is.
const KNOWN_LANGUAGES: &[(&str, &str, &[&str])] = &[
    ("javascript", "JavaScript", &["js", "mjs", "cjs"]),
    ("typescript", "TypeScript", &["ts"]),
    ("tsx", "React (TSX)", &["tsx", "jsx"]),
    ("css", "CSS / Tailwind", &["css", "scss"]),
    ("python", "Python", &["py"]),
    ("sql", "SQL", &["sql"]),
    ("bash", "Terminal / Bash", &["sh", "bash", "zsh"]),
    ("rust", "Rust", &["rs"]),
    ("go", "Go", &["go"]),
    ("java", "Java", &["java"]),
    ("json", "JSON", &["json"]),
    ("yaml", "YAML", &["yml", "yaml"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Snippet {
    pub fn new(id: i64, title: &str, code: &str, language: &str, tags_input: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            code: code.to_string(),
            language: language.to_string(),
            tags: parse_tags(tags_input),
        }
    }

    pub fn get_line_count(&self) -> usize {
        self.code.lines().count()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Human-readable name for a language tag, falling back to the tag itself.
pub fn display_name(language: &str) -> &str {
    KNOWN_LANGUAGES
        .iter()
        .find(|(tag, _, _)| tag.eq_ignore_ascii_case(language))
        .map(|(_, name, _)| *name)
        .unwrap_or(language)
}

/// Guess a language tag from a file extension.
pub fn language_from_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_lowercase();
    KNOWN_LANGUAGES
        .iter()
        .find(|(_, _, exts)| exts.contains(&ext.as_str()))
        .map(|(tag, _, _)| *tag)
}

pub fn known_languages() -> impl Iterator<Item = (&'static str, &'static str)> {
    KNOWN_LANGUAGES.iter().map(|(tag, name, _)| (*tag, *name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_parses_tags() {
        let snippet = Snippet::new(1, "B", "print(1)", "python", "y, z");
        assert_eq!(snippet.tags, vec!["y", "z"]);
        assert_eq!(snippet.language, "python");
    }

    #[test]
    fn test_display_name_falls_back_to_tag() {
        assert_eq!(display_name("tsx"), "React (TSX)");
        assert_eq!(display_name("Python"), "Python");
        assert_eq!(display_name("haskell"), "haskell");
    }

    #[test]
    fn test_language_from_extension() {
        assert_eq!(language_from_extension("PY"), Some("python"));
        assert_eq!(language_from_extension("sh"), Some("bash"));
        assert_eq!(language_from_extension("hs"), None);
    }

    #[test]
    fn test_has_tag_ignores_case() {
        let snippet = Snippet::new(1, "A", "", "sql", "Postgres, joins");
        assert!(snippet.has_tag("postgres"));
        assert!(!snippet.has_tag("mysql"));
    }
}
