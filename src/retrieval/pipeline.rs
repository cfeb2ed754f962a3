//! Retrieval orchestrator
//!
//! REWRITE -> SEARCH -> DEDUPE -> MERGE -> SIZE CHECK -> (PASSTHROUGH | RERANK) -> ASSEMBLE.
//! Linear, no stage is revisited. An empty context is the "nothing relevant
//! found" signal; callers must not ask the answer model in that case.

use crate::config::Config;
use crate::error::{RaglineError, Result};
use crate::providers::{
    CallPolicy, Embedder, FastEmbedProvider, LanguageModel, OpenAiClient, QdrantStore,
};
use crate::retrieval::{
    deduplicate_passages, merge_headings, HeadingClassifier, LlmReranker, MinTokens,
    MultiQuerySearcher, OutlineHeading, Passage, QueryRewriter, Rerank, RetrievalError,
    RetrievalLimits, RewriteCache, SourceSet,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Separator placed between passages in the context string
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Grounding context handed to the answer stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedContext {
    /// Selected passage texts joined by a blank line; empty when nothing was found
    pub context: String,

    /// Every source consulted by the searches, including sources whose
    /// passages were later deduplicated or not selected
    pub sources: Vec<String>,

    /// The selected passages, in context order
    pub passages: Vec<Passage>,
}

impl RetrievedContext {
    /// The "no relevant information" result
    pub fn empty() -> Self {
        Self::default()
    }

    /// Join `passages` into the context string
    ///
    /// Sources are reported even when `passages` is empty; `context == ""`
    /// alone signals that nothing usable was found.
    fn assemble(passages: Vec<Passage>, sources: SourceSet) -> Self {
        let context = passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        Self {
            context,
            sources: sources.into_vec(),
            passages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

/// End-to-end retrieval pipeline
pub struct Retriever {
    rewriter: QueryRewriter,
    searcher: MultiQuerySearcher,
    reranker: Arc<dyn Rerank>,
    headings: Arc<dyn HeadingClassifier>,
    limits: RetrievalLimits,
}

impl Retriever {
    pub fn new(
        rewriter: QueryRewriter,
        searcher: MultiQuerySearcher,
        reranker: Arc<dyn Rerank>,
    ) -> Self {
        Self {
            rewriter,
            searcher,
            reranker,
            headings: Arc::new(OutlineHeading::default()),
            limits: RetrievalLimits::default(),
        }
    }

    pub fn with_heading_classifier(mut self, headings: Arc<dyn HeadingClassifier>) -> Self {
        self.headings = headings;
        self
    }

    /// Limits used by `retrieve_default`
    pub fn with_limits(mut self, limits: RetrievalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> RetrievalLimits {
        self.limits
    }

    /// Build the pipeline with HTTP/local adapters described by `config`
    ///
    /// The rewrite cache is created here; share one `Retriever` across
    /// requests to share the cache.
    pub fn from_config(config: &Config) -> Result<Self> {
        let retrieval = &config.retrieval;
        let policy = CallPolicy::new(
            retrieval.call_timeout()?,
            retrieval.max_retries,
            retrieval.retry_backoff()?,
        );

        let llm: Arc<dyn LanguageModel> = Arc::new(
            OpenAiClient::from_env(&config.llm.base_url, &config.llm.api_key_env, &config.llm.model)
                .with_temperature(config.llm.temperature),
        );

        let embedder: Arc<dyn Embedder> = match config.embedding.mode.as_str() {
            "offline" => Arc::new(
                FastEmbedProvider::new(&config.embedding.model)
                    .map_err(|e| RaglineError::Config(e.to_string()))?,
            ),
            _ => Arc::new(
                OpenAiClient::from_env(
                    &config.embedding.base_url,
                    &config.embedding.api_key_env,
                    &config.embedding.model,
                )
                .with_dimensions(config.embedding.dimensions),
            ),
        };

        let store_key = config
            .vector_store
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());
        let store = Arc::new(QdrantStore::new(
            &config.vector_store.url,
            &config.vector_store.collection,
            store_key,
        ));

        let rewriter = QueryRewriter::new(
            Arc::clone(&llm),
            RewriteCache::new(retrieval.rewrite_cache_capacity),
            policy.clone(),
            retrieval.rewrite_query_count,
        );
        let searcher =
            MultiQuerySearcher::new(embedder, store, policy.clone(), retrieval.parallel_search);
        let reranker = LlmReranker::new(llm, policy)
            .with_filter(Arc::new(MinTokens::new(retrieval.rerank_min_tokens)));

        Ok(Self::new(rewriter, searcher, Arc::new(reranker))
            .with_heading_classifier(Arc::new(OutlineHeading::new(retrieval.heading_max_tokens)))
            .with_limits(retrieval.limits()))
    }

    /// `retrieve` with the configured limits and no external cancellation
    pub async fn retrieve_default(
        &self,
        question: &str,
    ) -> std::result::Result<RetrievedContext, RetrievalError> {
        self.retrieve(question, self.limits, &CancellationToken::new())
            .await
    }

    /// Run the full pipeline for one question
    ///
    /// Upstream failures and an empty rewrite propagate. An empty candidate
    /// pool yields `RetrievedContext::empty()`; an empty rerank selection
    /// yields an empty context that still lists the consulted sources.
    pub async fn retrieve(
        &self,
        question: &str,
        limits: RetrievalLimits,
        cancel: &CancellationToken,
    ) -> std::result::Result<RetrievedContext, RetrievalError> {
        limits.validate()?;

        let queries = self.rewriter.rewrite(question, cancel).await?;
        tracing::info!("Rewritten queries: {:?}", queries);

        let (candidates, sources) = self
            .searcher
            .search_all(&queries, limits.search_top_k, cancel)
            .await?;
        tracing::info!(
            "Multi-query retrieved {} passages from {} sources",
            candidates.len(),
            sources.len()
        );

        let unique = deduplicate_passages(candidates);
        tracing::debug!("Deduplicated passages: {}", unique.len());

        if unique.is_empty() {
            tracing::info!("No passages retrieved");
            return Ok(RetrievedContext::empty());
        }

        let merged = merge_headings(unique, self.headings.as_ref());
        tracing::debug!("After heading merge: {}", merged.len());

        let ranked = if merged.len() <= limits.context_top_k {
            merged
        } else {
            self.reranker
                .rerank(question, &merged, limits.context_top_k, cancel)
                .await?
        };

        match ranked.first() {
            Some(top) => tracing::info!(
                "Selected {} passages, top: {:?}",
                ranked.len(),
                top.preview(80)
            ),
            None => tracing::info!("Reranker selected no passages"),
        }

        let result = RetrievedContext::assemble(ranked, sources);
        tracing::debug!("Final context length: {}", result.context.len());
        Ok(result)
    }

    /// Single-query retrieval without rewrite, dedupe, merge or rerank
    ///
    /// Embeds the raw question, takes its `search_top_k` nearest passages and
    /// joins them.
    pub async fn retrieve_basic(
        &self,
        question: &str,
        limits: RetrievalLimits,
        cancel: &CancellationToken,
    ) -> std::result::Result<RetrievedContext, RetrievalError> {
        limits.validate()?;

        let passages = self
            .searcher
            .search_one(question, limits.search_top_k, cancel)
            .await?;

        let mut sources = SourceSet::new();
        sources.extend_from(&passages);

        Ok(RetrievedContext::assemble(passages, sources))
    }
}
