//! Multi-query nearest-neighbor search
//!
//! One embed + search round-trip per rewritten query. Results are
//! concatenated in query order whether the searches ran concurrently or not,
//! and no deduplication happens here.

use crate::providers::{CallPolicy, Embedder, VectorStore};
use crate::retrieval::{Passage, RetrievalError, SourceSet};
use futures::future::try_join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fans a set of queries out to the vector store
pub struct MultiQuerySearcher {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    policy: CallPolicy,
    parallel: bool,
}

impl MultiQuerySearcher {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        policy: CallPolicy,
        parallel: bool,
    ) -> Self {
        Self {
            embedder,
            store,
            policy,
            parallel,
        }
    }

    /// Embed `query` and fetch its `top_k` nearest passages
    pub async fn search_one(
        &self,
        query: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Passage>, RetrievalError> {
        let vector = self
            .policy
            .run("query embedding", cancel, || self.embedder.embed(query))
            .await?;

        let passages = self
            .policy
            .run("nearest-neighbor search", cancel, || {
                self.store.nearest_neighbors(&vector, top_k)
            })
            .await?;

        tracing::debug!("Query {:?} returned {} passages", query, passages.len());
        Ok(passages)
    }

    /// Search every query and collect the candidate pool plus all sources seen
    ///
    /// Any failed search fails the whole call; there is no partial result.
    pub async fn search_all(
        &self,
        queries: &[String],
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Passage>, SourceSet), RetrievalError> {
        let per_query: Vec<Vec<Passage>> = if self.parallel {
            try_join_all(queries.iter().map(|q| self.search_one(q, top_k, cancel))).await?
        } else {
            let mut results = Vec::with_capacity(queries.len());
            for query in queries {
                results.push(self.search_one(query, top_k, cancel).await?);
            }
            results
        };

        let mut pool = Vec::new();
        let mut sources = SourceSet::new();
        for passages in per_query {
            sources.extend_from(&passages);
            pool.extend(passages);
        }

        Ok((pool, sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::UpstreamError;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Embeds a query as its length, so the store can tell queries apart
    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
            Ok(vec![text.len() as f32])
        }
    }

    /// Answers each vector with `k` passages; shorter queries answer slower
    struct SlowShortStore;

    #[async_trait]
    impl VectorStore for SlowShortStore {
        async fn nearest_neighbors(
            &self,
            vector: &[f32],
            k: usize,
        ) -> Result<Vec<Passage>, UpstreamError> {
            let len = vector[0] as u64;
            tokio::time::sleep(Duration::from_millis(100u64.saturating_sub(len * 10))).await;
            Ok((0..k)
                .map(|i| Passage::new(format!("len{} hit{}", len, i), format!("doc{}.pdf", len)))
                .collect())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl VectorStore for FailingStore {
        async fn nearest_neighbors(
            &self,
            _vector: &[f32],
            _k: usize,
        ) -> Result<Vec<Passage>, UpstreamError> {
            Err(UpstreamError::Status {
                service: "vector store",
                status: 404,
                body: "collection not found".to_string(),
            })
        }
    }

    fn queries() -> Vec<String> {
        vec!["a".to_string(), "abcd".to_string(), "ab".to_string()]
    }

    #[tokio::test]
    async fn test_parallel_results_keep_query_order() {
        let searcher = MultiQuerySearcher::new(
            Arc::new(LengthEmbedder),
            Arc::new(SlowShortStore),
            CallPolicy::default(),
            true,
        );

        let (pool, sources) = searcher
            .search_all(&queries(), 2, &CancellationToken::new())
            .await
            .unwrap();

        let texts: Vec<&str> = pool.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["len1 hit0", "len1 hit1", "len4 hit0", "len4 hit1", "len2 hit0", "len2 hit1"]
        );
        assert_eq!(sources.into_vec(), vec!["doc1.pdf", "doc2.pdf", "doc4.pdf"]);
    }

    #[tokio::test]
    async fn test_sequential_matches_parallel() {
        let cancel = CancellationToken::new();
        let parallel = MultiQuerySearcher::new(
            Arc::new(LengthEmbedder),
            Arc::new(SlowShortStore),
            CallPolicy::default(),
            true,
        );
        let sequential = MultiQuerySearcher::new(
            Arc::new(LengthEmbedder),
            Arc::new(SlowShortStore),
            CallPolicy::default(),
            false,
        );

        let a = parallel.search_all(&queries(), 3, &cancel).await.unwrap();
        let b = sequential.search_all(&queries(), 3, &cancel).await.unwrap();

        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_one_failure_fails_all() {
        let searcher = MultiQuerySearcher::new(
            Arc::new(LengthEmbedder),
            Arc::new(FailingStore),
            CallPolicy::default(),
            true,
        );

        let result = searcher
            .search_all(&queries(), 2, &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(RetrievalError::Upstream(UpstreamError::Status { status: 404, .. }))
        ));
    }

    #[tokio::test]
    async fn test_search_timeout() {
        let searcher = MultiQuerySearcher::new(
            Arc::new(LengthEmbedder),
            Arc::new(SlowShortStore),
            CallPolicy::new(Duration::from_millis(5), 0, Duration::from_millis(1)),
            true,
        );

        let result = searcher
            .search_all(&["a".to_string()], 1, &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(RetrievalError::Upstream(UpstreamError::Timeout { .. }))
        ));
    }
}
