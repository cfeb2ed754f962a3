//! Passages and the set of sources consulted while retrieving them

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A retrieved unit of document text with the identifier of its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Passage text as stored in the vector store
    pub text: String,

    /// Source identifier, typically a filename
    pub source: String,
}

impl Passage {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }

    /// Number of whitespace-delimited tokens
    pub fn token_count(&self) -> usize {
        token_count(&self.text)
    }

    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.text.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}...", &self.text[..idx]),
            None => self.text.clone(),
        }
    }
}

/// Number of whitespace-delimited tokens in `text`
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Every source touched by a retrieval, whether or not its passages survive
///
/// Duplicates collapse; iteration order is lexicographic so results are
/// reproducible. A passage stored without a source contributes "".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet {
    sources: BTreeSet<String>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: &str) {
        self.sources.insert(source.to_string());
    }

    /// Record the sources of all `passages`
    pub fn extend_from(&mut self, passages: &[Passage]) {
        for passage in passages {
            self.insert(&passage.source);
        }
    }

    pub fn contains(&self, source: &str) -> bool {
        self.sources.contains(source)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.sources.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_count() {
        assert_eq!(token_count("  one two\tthree\nfour  "), 4);
        assert_eq!(token_count(""), 0);
        assert_eq!(Passage::new("1.1 Intro", "a.pdf").token_count(), 2);
    }

    #[test]
    fn test_preview_multibyte() {
        let passage = Passage::new("สรุป trigon ให้ฟังหน่อย", "trigon.pdf");
        assert_eq!(passage.preview(4), "สรุป...");
        assert_eq!(passage.preview(100), passage.text);
    }

    #[test]
    fn test_source_set_collapses_duplicates() {
        let mut sources = SourceSet::new();
        sources.extend_from(&[
            Passage::new("a", "b.pdf"),
            Passage::new("b", "a.pdf"),
            Passage::new("c", "b.pdf"),
            Passage::new("d", ""),
        ]);

        assert_eq!(sources.len(), 3);
        assert!(sources.contains("a.pdf"));
        assert!(sources.contains(""));
        assert_eq!(sources.into_vec(), vec!["", "a.pdf", "b.pdf"]);
    }
}
