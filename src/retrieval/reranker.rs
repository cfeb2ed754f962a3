//! Language-model reranking of the merged passage pool
//!
//! The model sees the question and every candidate, numbered, and answers
//! with the full text of the passages it prefers separated by `---`. Its
//! ordering is taken as the relevance ranking. Output is never trusted as
//! text: each segment must pass the segment filter and locate a span of a
//! candidate passage, and that span (not the model's copy) is what is kept.

use crate::providers::{CallPolicy, LanguageModel};
use crate::retrieval::passage::token_count;
use crate::retrieval::{Passage, RetrievalError};
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Separator the model is asked to put between returned passages
pub const SEGMENT_DELIMITER: &str = "---";

/// Selects at most `top_k` passages from a pool, best first
#[async_trait]
pub trait Rerank: Send + Sync {
    async fn rerank(
        &self,
        question: &str,
        pool: &[Passage],
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Passage>, RetrievalError>;
}

/// Decides whether a returned segment is substantial enough to keep
pub trait SegmentFilter: Send + Sync {
    fn accept(&self, segment: &str) -> bool;
}

/// Rejects captions, figure labels and truncated fragments by length
#[derive(Debug, Clone)]
pub struct MinTokens {
    min_exclusive: usize,
}

impl MinTokens {
    /// Keep segments with strictly more than `min_exclusive` tokens
    pub fn new(min_exclusive: usize) -> Self {
        Self { min_exclusive }
    }
}

impl Default for MinTokens {
    fn default() -> Self {
        Self::new(30)
    }
}

impl SegmentFilter for MinTokens {
    fn accept(&self, segment: &str) -> bool {
        token_count(segment) > self.min_exclusive
    }
}

/// Reranker backed by a completion model
pub struct LlmReranker {
    llm: Arc<dyn LanguageModel>,
    filter: Arc<dyn SegmentFilter>,
    policy: CallPolicy,
}

impl LlmReranker {
    pub fn new(llm: Arc<dyn LanguageModel>, policy: CallPolicy) -> Self {
        Self {
            llm,
            filter: Arc::new(MinTokens::default()),
            policy,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn SegmentFilter>) -> Self {
        self.filter = filter;
        self
    }
}

#[async_trait]
impl Rerank for LlmReranker {
    async fn rerank(
        &self,
        question: &str,
        pool: &[Passage],
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Passage>, RetrievalError> {
        if pool.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let prompt = rerank_prompt(question, pool);
        tracing::debug!(
            "Reranking {} passages (prompt {} chars)",
            pool.len(),
            prompt.len()
        );

        let output = self
            .policy
            .run("rerank completion", cancel, || self.llm.complete(&prompt))
            .await?;

        let ranked = select_segments(&output, pool, self.filter.as_ref(), top_k);
        tracing::debug!("Reranker kept {} of {} passages", ranked.len(), pool.len());

        Ok(ranked)
    }
}

fn rerank_prompt(question: &str, pool: &[Passage]) -> String {
    let numbered = pool
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[Chunk {}]\n{}", i + 1, p.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are ranking document chunks to answer a question.\n\n\
         Question:\n{question}\n\n\
         Chunks:\n{numbered}\n\n\
         Rules:\n\
         - Prefer explanatory text.\n\
         - Avoid image captions, diagrams, or figure descriptions.\n\
         - Return the FULL TEXT of the best chunks, copied verbatim.\n\
         - Separate chunks with {SEGMENT_DELIMITER}.\n"
    )
}

fn chunk_label() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[Chunk \d+\]\s*").expect("valid chunk label regex"))
}

/// Whitespace-collapsed view of a passage that can map matches back to it
struct NormalizedPassage<'a> {
    original: &'a str,
    text: String,
    /// Byte offset in `original` of each byte of `text`
    offsets: Vec<usize>,
}

impl<'a> NormalizedPassage<'a> {
    fn new(original: &'a str) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut offsets = Vec::with_capacity(original.len());

        for (start, end) in word_spans(original) {
            if !text.is_empty() {
                text.push(' ');
                offsets.push(start);
            }
            text.push_str(&original[start..end]);
            offsets.extend(start..end);
        }

        Self {
            original,
            text,
            offsets,
        }
    }

    /// The verbatim slice of the original covering `needle`
    ///
    /// `needle` must already be whitespace-normalized and non-empty.
    fn find_verbatim(&self, needle: &str) -> Option<&'a str> {
        let start = self.text.find(needle)?;
        let last = start + needle.len() - 1;
        Some(&self.original[self.offsets[start]..=self.offsets[last]])
    }
}

/// Byte spans of the whitespace-delimited words of `text`
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut word_start = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = word_start.take() {
                spans.push((start, i));
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(start) = word_start {
        spans.push((start, text.len()));
    }

    spans
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse model output into at most `top_k` validated passages, in model order
///
/// A segment survives when, after stripping an echoed `[Chunk N]` label, it
/// passes `filter` and appears (ignoring whitespace differences) inside some
/// pool passage. The kept text is the matching span copied from that pool
/// passage, so it is always a verbatim substring of a search result; the
/// source is that passage's source.
fn select_segments(
    output: &str,
    pool: &[Passage],
    filter: &dyn SegmentFilter,
    top_k: usize,
) -> Vec<Passage> {
    let normalized_pool: Vec<NormalizedPassage<'_>> =
        pool.iter().map(|p| NormalizedPassage::new(&p.text)).collect();
    let mut selected: Vec<Passage> = Vec::new();

    for segment in output.split(SEGMENT_DELIMITER) {
        if selected.len() >= top_k {
            break;
        }

        let segment = chunk_label().replace(segment.trim(), "");
        let segment = segment.trim();
        if segment.is_empty() || !filter.accept(segment) {
            continue;
        }

        let needle = normalize_whitespace(segment);
        let found = normalized_pool
            .iter()
            .enumerate()
            .find_map(|(idx, hay)| hay.find_verbatim(&needle).map(|text| (idx, text)));

        match found {
            Some((idx, text)) => {
                if selected.iter().any(|p| p.text == text) {
                    continue;
                }
                selected.push(Passage::new(text, pool[idx].source.clone()));
            }
            None => {
                tracing::warn!(
                    "Discarding reranker segment not found in candidates ({} tokens)",
                    token_count(segment)
                );
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::UpstreamError;
    use std::sync::Mutex;

    fn long_text(topic: &str) -> String {
        (0..40)
            .map(|i| format!("{}{}", topic, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    struct CannedModel {
        output: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.output.clone())
        }
    }

    #[test]
    fn test_min_tokens_boundary() {
        let filter = MinTokens::default();
        let thirty = vec!["w"; 30].join(" ");
        let thirty_one = vec!["w"; 31].join(" ");

        assert!(!filter.accept(&thirty));
        assert!(filter.accept(&thirty_one));
    }

    #[test]
    fn test_short_segments_filtered() {
        let body = long_text("gpu");
        let pool = vec![
            Passage::new("Figure 3: GPU block diagram", "nvidia.txt"),
            Passage::new(body.clone(), "nvidia.txt"),
        ];
        let output = format!("Figure 3: GPU block diagram\n---\n{}", body);

        let selected = select_segments(&output, &pool, &MinTokens::default(), 4);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].text, body);
    }

    #[test]
    fn test_fabricated_segment_discarded() {
        let pool = vec![Passage::new(long_text("real"), "a.pdf")];
        let output = long_text("invented");

        assert!(select_segments(&output, &pool, &MinTokens::default(), 4).is_empty());
    }

    #[test]
    fn test_model_order_and_truncation() {
        let a = long_text("alpha");
        let b = long_text("beta");
        let c = long_text("gamma");
        let pool = vec![
            Passage::new(a.clone(), "a.pdf"),
            Passage::new(b.clone(), "b.pdf"),
            Passage::new(c.clone(), "c.pdf"),
        ];
        let output = format!("{}\n---\n{}\n---\n{}", c, a, b);

        let selected = select_segments(&output, &pool, &MinTokens::default(), 2);

        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].source, "c.pdf");
        assert_eq!(selected[1].source, "a.pdf");
    }

    #[test]
    fn test_chunk_label_and_whitespace_tolerated() {
        let text = long_text("delta");
        let pool = vec![Passage::new(text.clone(), "d.pdf")];
        let reflowed = text.replacen(' ', "\n", 5);
        let output = format!("[Chunk 1]\n{}\n---\n", reflowed);

        let selected = select_segments(&output, &pool, &MinTokens::default(), 4);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].source, "d.pdf");
        assert_eq!(selected[0].text, text);
    }

    #[test]
    fn test_reflowed_segment_returns_candidate_text() {
        let words: Vec<String> = (0..40).map(|i| format!("w{}", i)).collect();
        let pool = vec![Passage::new(words.join(" "), "w.pdf")];
        let output = words.join("\n\n   ");

        let selected = select_segments(&output, &pool, &MinTokens::default(), 4);

        assert_eq!(selected.len(), 1);
        for passage in &selected {
            assert!(pool.iter().any(|c| c.text.contains(&passage.text)));
        }
        assert_eq!(selected[0].text, pool[0].text);
    }

    #[test]
    fn test_partial_segment_maps_to_original_span() {
        let original = format!(
            "Preamble   line.\n\n{}\n\tTrailing note.",
            long_text("épsilon")
        );
        let pool = vec![Passage::new(original.clone(), "e.pdf")];
        let output = long_text("épsilon").replace(' ', "  ");

        let selected = select_segments(&output, &pool, &MinTokens::default(), 4);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].text, long_text("épsilon"));
        assert!(original.contains(&selected[0].text));
    }

    #[test]
    fn test_word_spans() {
        assert_eq!(word_spans("  ab\tcd  "), vec![(2, 4), (5, 7)]);
        assert!(word_spans("   ").is_empty());

        let view = NormalizedPassage::new("one\n  two   three");
        assert_eq!(view.text, "one two three");
        assert_eq!(view.find_verbatim("two three"), Some("two   three"));
        assert_eq!(view.find_verbatim("e t"), Some("e\n  t"));
        assert_eq!(view.find_verbatim("four"), None);
    }

    #[test]
    fn test_garbage_output_is_empty_not_error() {
        let pool = vec![Passage::new(long_text("x"), "x.pdf")];

        assert!(select_segments("", &pool, &MinTokens::default(), 4).is_empty());
        assert!(select_segments("---\n---", &pool, &MinTokens::default(), 4).is_empty());
    }

    #[tokio::test]
    async fn test_llm_reranker_numbers_passages() {
        let a = long_text("alpha");
        let b = long_text("beta");
        let model = Arc::new(CannedModel {
            output: b.clone(),
            prompts: Mutex::new(Vec::new()),
        });
        let reranker = LlmReranker::new(model.clone(), CallPolicy::default());
        let pool = vec![Passage::new(a, "a.pdf"), Passage::new(b.clone(), "b.pdf")];

        let ranked = reranker
            .rerank("What is beta?", &pool, 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ranked, vec![Passage::new(b, "b.pdf")]);
        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[Chunk 1]"));
        assert!(prompts[0].contains("[Chunk 2]"));
        assert!(prompts[0].contains("What is beta?"));
    }
}
