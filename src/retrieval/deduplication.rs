//! Exact-text passage deduplication
//!
//! Two passages are duplicates only when their trimmed texts are
//! byte-identical. Near-duplicates (one character apart, different
//! whitespace inside the text) are both kept.

use crate::retrieval::Passage;
use ahash::{HashSet, HashSetExt};

/// Remove exact duplicates, keeping the first occurrence of each trimmed text
///
/// Passages that are empty after trimming are dropped. Surviving passages
/// are returned unchanged and in their original relative order.
pub fn deduplicate_passages(passages: Vec<Passage>) -> Vec<Passage> {
    let mut seen: HashSet<String> = HashSet::new();

    passages
        .into_iter()
        .filter(|passage| {
            let key = passage.text.trim();
            !key.is_empty() && seen.insert(key.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passages(texts: &[&str]) -> Vec<Passage> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Passage::new(*t, format!("doc{}.pdf", i)))
            .collect()
    }

    fn texts(passages: &[Passage]) -> Vec<&str> {
        passages.iter().map(|p| p.text.as_str()).collect()
    }

    #[test]
    fn test_deduplication() {
        let deduped = deduplicate_passages(passages(&["alpha", "beta", "alpha"]));

        assert_eq!(texts(&deduped), vec!["alpha", "beta"]);
        assert_eq!(deduped[0].source, "doc0.pdf"); // First occurrence wins
    }

    #[test]
    fn test_trimmed_comparison_keeps_original_text() {
        let deduped = deduplicate_passages(passages(&["  alpha\n", "alpha", "beta"]));

        assert_eq!(texts(&deduped), vec!["  alpha\n", "beta"]);
    }

    #[test]
    fn test_empty_passages_dropped() {
        let deduped = deduplicate_passages(passages(&["", "   \n\t", "gamma"]));

        assert_eq!(texts(&deduped), vec!["gamma"]);
    }

    #[test]
    fn test_near_duplicates_kept() {
        let deduped = deduplicate_passages(passages(&["GPU memory is 24GB", "GPU memory is 24 GB"]));

        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_idempotent() {
        let pool = passages(&["a", "b", " a", "c", "b ", "", "d", "c"]);

        let once = deduplicate_passages(pool);
        let twice = deduplicate_passages(once.clone());

        assert_eq!(once, twice);
    }

    #[test]
    fn test_preserves_first_occurrence_order() {
        let pool = passages(&["c", "a", "c", "b", "a", "d"]);

        let deduped = deduplicate_passages(pool);

        assert_eq!(texts(&deduped), vec!["c", "a", "b", "d"]);
    }
}
