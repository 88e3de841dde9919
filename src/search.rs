use crate::models::Snippet;

/// Which snippet fields a query is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub include_code: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { include_code: true }
    }
}

/// Filters snippets by a case-insensitive substring of the title, the code
/// (when enabled) or any tag. Order is preserved and the empty query matches
/// everything. A linear scan is fine at personal-collection scale, so nothing is cached.
pub fn filter<'a>(snippets: &'a [Snippet], query: &str, options: SearchOptions) -> Vec<&'a Snippet> {
    if query.is_empty() {
        return snippets.iter().collect();
    }

    let query = query.to_lowercase();

    snippets
        .iter()
        .filter(|snippet| matches(snippet, &query, options))
        .collect()
}

fn matches(snippet: &Snippet, query: &str, options: SearchOptions) -> bool {
    if snippet.title.to_lowercase().contains(query) {
        return true;
    }

    if options.include_code && snippet.code.to_lowercase().contains(query) {
        return true;
    }

    snippet
        .tags
        .iter()
        .any(|tag| tag.to_lowercase().contains(query))
}

/// Snippets carrying the exact tag, ignoring case
pub fn filter_by_tag<'a>(snippets: &'a [Snippet], tag: &str) -> Vec<&'a Snippet> {
    snippets.iter().filter(|s| s.has_tag(tag)).collect()
}
