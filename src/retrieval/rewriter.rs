//! Query rewriting: one question in, a fixed number of search queries out
//!
//! Results are memoized per exact question text in a bounded LRU cache that
//! is safe to share between concurrent requests.

use crate::providers::{CallPolicy, LanguageModel};
use crate::retrieval::RetrievalError;
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Bounded question -> rewritten queries memo
///
/// Keys are compared exactly (case- and whitespace-sensitive). Once
/// `capacity` entries are stored the least recently used one is evicted.
#[derive(Clone)]
pub struct RewriteCache {
    inner: Cache<String, Arc<Vec<String>>>,
}

impl RewriteCache {
    pub fn new(capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { inner }
    }

    pub async fn get(&self, question: &str) -> Option<Arc<Vec<String>>> {
        self.inner.get(question).await
    }

    pub async fn insert(&self, question: String, queries: Arc<Vec<String>>) {
        self.inner.insert(question, queries).await;
    }

    /// Number of cached questions, after pending maintenance has run
    pub async fn len(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}

impl Default for RewriteCache {
    fn default() -> Self {
        Self::new(128)
    }
}

/// Expands a question into alternative search queries with a language model
pub struct QueryRewriter {
    llm: Arc<dyn LanguageModel>,
    cache: RewriteCache,
    policy: CallPolicy,
    query_count: usize,
}

impl QueryRewriter {
    /// # Arguments
    /// * `llm` - Completion model used for rewriting
    /// * `cache` - Memo shared across requests (clone it to share)
    /// * `policy` - Timeout/retry applied to the completion call
    /// * `query_count` - Number of queries requested per question
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        cache: RewriteCache,
        policy: CallPolicy,
        query_count: usize,
    ) -> Self {
        Self {
            llm,
            cache,
            policy,
            query_count,
        }
    }

    pub fn cache(&self) -> &RewriteCache {
        &self.cache
    }

    /// Rewrite `question` into at most `query_count` search queries
    ///
    /// Fails when the model call fails or yields no usable line; an empty
    /// query list is never returned and never cached.
    pub async fn rewrite(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<Vec<String>>, RetrievalError> {
        if let Some(queries) = self.cache.get(question).await {
            tracing::debug!("Rewrite cache hit for {:?}", question);
            return Ok(queries);
        }

        let prompt = rewrite_prompt(question, self.query_count);
        let output = self
            .policy
            .run("query rewrite", cancel, || self.llm.complete(&prompt))
            .await?;

        let queries = parse_queries(&output, self.query_count);
        if queries.is_empty() {
            return Err(RetrievalError::EmptyRewrite {
                question: question.to_string(),
            });
        }

        let queries = Arc::new(queries);
        self.cache
            .insert(question.to_string(), Arc::clone(&queries))
            .await;

        Ok(queries)
    }
}

fn rewrite_prompt(question: &str, count: usize) -> String {
    format!(
        "You are a search query rewriting assistant.\n\n\
         Given the user question, generate {count} fixed grammatically correct search queries \
         in the most appropriate languages to retrieve relevant information.\n\n\
         User question:\n{question}\n\n\
         Return each query on a new line.\n"
    )
}

fn list_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:[-*•]|\d+[.)])\s+").expect("valid list marker regex"))
}

/// One query per non-empty line, list markers stripped, capped at `limit`
fn parse_queries(output: &str, limit: usize) -> Vec<String> {
    output
        .lines()
        .map(|line| list_marker().replace(line.trim(), "").trim().to_string())
        .filter(|line| !line.is_empty())
        .take(limit)
        .collect()
}
