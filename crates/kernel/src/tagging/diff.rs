//! Tag string parsing and set differences.

/// Result of comparing a submitted tag string with stored tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Tags in the input but not stored, in input order.
    pub added: Vec<String>,
    /// Tags stored but not in the input, in stored order.
    pub removed: Vec<String>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Split a tag string on `delimiter`, trimming tokens and dropping empty ones.
///
/// Repeated tokens are kept.
pub fn split_tag_string(input: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        let tag = input.trim();
        return if tag.is_empty() {
            Vec::new()
        } else {
            vec![tag.to_string()]
        };
    }

    input
        .split(delimiter)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Compute which tags to add and which to remove.
///
/// Comparison is by exact (case-sensitive) trimmed text.
pub fn diff_tag_string<S: AsRef<str>>(input: &str, existing: &[S], delimiter: &str) -> TagDiff {
    let input_tags = split_tag_string(input, delimiter);
    let existing_tags: Vec<&str> = existing
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .collect();

    let removed = existing_tags
        .iter()
        .filter(|t| !input_tags.iter().any(|i| i.as_str() == **t))
        .map(|t| t.to_string())
        .collect();

    let added = input_tags
        .iter()
        .filter(|t| !existing_tags.contains(&t.as_str()))
        .cloned()
        .collect();

    TagDiff { added, removed }
}

/// Render tag names as a single string, e.g. `"a, b, c"` for delimiter `","`.
pub fn join_tags<S: AsRef<str>>(names: &[S], delimiter: &str) -> String {
    let separator = format!("{delimiter} ");
    names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&separator)
}
