use crate::models::Snippet;

/// Splits comma-separated input into trimmed, non-empty tags.
/// Duplicates are kept and order of appearance is preserved.
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tag with the number of snippets carrying it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub usage_count: usize,
}

/// Distinct tags across all snippets, in order of first appearance.
/// Tags differing only by case are counted together under the first spelling seen.
pub fn collect_tags(snippets: &[Snippet]) -> Vec<TagCount> {
    let mut counts: Vec<TagCount> = Vec::new();

    for snippet in snippets {
        for tag in &snippet.tags {
            match counts
                .iter_mut()
                .find(|entry| entry.name.eq_ignore_ascii_case(tag))
            {
                Some(entry) => entry.usage_count += 1,
                None => counts.push(TagCount {
                    name: tag.clone(),
                    usage_count: 1,
                }),
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags_drops_empty_segments() {
        assert_eq!(parse_tags(" a, ,b,, c "), vec!["a", "b", "c"]);
        assert!(parse_tags("").is_empty());
        assert!(parse_tags(" , ,").is_empty());
    }

    #[test]
    fn test_parse_tags_keeps_duplicates_and_order() {
        assert_eq!(parse_tags("z, a, z"), vec!["z", "a", "z"]);
    }

    #[test]
    fn test_collect_tags_counts_case_insensitively() {
        let snippets = vec![
            Snippet::new(2, "two", "", "sql", "db, Joins"),
            Snippet::new(1, "one", "", "sql", "joins"),
        ];
        let tags = collect_tags(&snippets);
        assert_eq!(
            tags,
            vec![
                TagCount {
                    name: "db".to_string(),
                    usage_count: 1
                },
                TagCount {
                    name: "Joins".to_string(),
                    usage_count: 2
                },
            ]
        );
    }
}
