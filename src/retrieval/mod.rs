//! Retrieval pipeline
//!
//! question -> rewrite -> multi-query search -> dedupe -> heading merge
//! -> (rerank when the pool exceeds the context cap) -> context string + sources

mod deduplication;
mod merge;
mod multi_query;
mod passage;
mod pipeline;
mod reranker;
mod rewriter;

pub use deduplication::deduplicate_passages;
pub use merge::{merge_headings, HeadingClassifier, OutlineHeading};
pub use multi_query::MultiQuerySearcher;
pub use passage::{token_count, Passage, SourceSet};
pub use pipeline::{RetrievedContext, Retriever};
pub use reranker::{LlmReranker, MinTokens, Rerank, SegmentFilter, SEGMENT_DELIMITER};
pub use rewriter::{QueryRewriter, RewriteCache};

use crate::providers::UpstreamError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding, search or completion call failed, timed out or was cancelled
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The rewriter produced no usable query line
    #[error("Query rewrite produced no usable queries for {question:?}")]
    EmptyRewrite { question: String },

    #[error("Invalid retrieval limits: {0}")]
    InvalidLimits(String),
}

/// Search width and context size for one retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalLimits {
    /// Passages requested from the vector store per rewritten query
    pub search_top_k: usize,

    /// Maximum passages in the final context; larger pools are reranked
    pub context_top_k: usize,
}

impl RetrievalLimits {
    pub fn new(search_top_k: usize, context_top_k: usize) -> Self {
        Self {
            search_top_k,
            context_top_k,
        }
    }

    /// Same value for search width and context size
    pub fn uniform(top_k: usize) -> Self {
        Self::new(top_k, top_k)
    }

    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.search_top_k == 0 {
            return Err(RetrievalError::InvalidLimits(
                "search_top_k must be greater than 0".to_string(),
            ));
        }
        if self.context_top_k == 0 {
            return Err(RetrievalError::InvalidLimits(
                "context_top_k must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self::uniform(4)
    }
}
