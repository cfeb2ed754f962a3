//! Heading merge: glue a short outline heading onto the passage after it
//!
//! Chunking often cuts "2.3 Thermal limits" away from the paragraph it
//! introduces. The merger rejoins them so the heading travels with its body.

use crate::retrieval::passage::token_count;
use crate::retrieval::Passage;
use regex::Regex;
use std::sync::OnceLock;

/// Decides whether a passage is a heading worth merging forward
pub trait HeadingClassifier: Send + Sync {
    fn is_heading(&self, text: &str) -> bool;
}

/// Numeric outline headings: "1.2 Something", "2. Title"
///
/// A passage qualifies when it has fewer than `max_tokens` whitespace-delimited
/// tokens and starts with dot-separated integers followed by whitespace.
#[derive(Debug, Clone)]
pub struct OutlineHeading {
    max_tokens: usize,
}

impl OutlineHeading {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }
}

impl Default for OutlineHeading {
    fn default() -> Self {
        Self::new(15)
    }
}

fn outline_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+(\.\d+)*\.?\s+").expect("valid outline regex"))
}

impl HeadingClassifier for OutlineHeading {
    fn is_heading(&self, text: &str) -> bool {
        let text = text.trim();
        token_count(text) < self.max_tokens && outline_prefix().is_match(text)
    }
}

/// Single greedy forward pass over `passages`
///
/// A heading followed by another passage becomes one passage
/// "heading\nnext", keeping the heading's source; the consumed passage is
/// never itself evaluated as a heading. Everything else passes through
/// trimmed. The output is never longer than the input.
pub fn merge_headings(passages: Vec<Passage>, classifier: &dyn HeadingClassifier) -> Vec<Passage> {
    let mut merged = Vec::with_capacity(passages.len());
    let mut iter = passages.into_iter();

    while let Some(current) = iter.next() {
        let text = current.text.trim();

        if classifier.is_heading(text) {
            if let Some(next) = iter.next() {
                merged.push(Passage::new(
                    format!("{}\n{}", text, next.text.trim()),
                    current.source,
                ));
                continue;
            }
        }

        merged.push(Passage::new(text, current.source));
    }

    merged
}
