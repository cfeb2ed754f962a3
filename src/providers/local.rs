/// Local embedding with FastEmbed (offline mode)
use super::{Embedder, UpstreamError};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;

const SERVICE: &str = "local embedder";

/// FastEmbed provider for local embedding generation
///
/// The vector store must have been populated with the same model, otherwise
/// nearest-neighbor results are meaningless.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    ///
    /// **Important**: Models are downloaded on-demand to `~/.cache/huggingface/`
    /// on first use.
    /// - all-MiniLM-L6-v2: 90MB (384 dims)
    /// - bge-small-en-v1.5: 130MB (384 dims)
    /// - bge-base-en-v1.5: 440MB (768 dims)
    pub fn new(model_name: &str) -> Result<Self, UpstreamError> {
        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            _ => {
                return Err(UpstreamError::Request {
                    service: SERVICE,
                    message: format!(
                        "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                        model_name
                    ),
                    transient: false,
                });
            }
        };

        tracing::info!("Initializing embedding model: {} ({}D)", model_name, dimension);

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options).map_err(|e| UpstreamError::Request {
            service: SERVICE,
            message: e.to_string(),
            transient: false,
        })?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl Embedder for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let model = Arc::clone(&self.model);
        let input = vec![text.to_string()];

        // Inference is CPU-bound; keep it off the async workers
        let embeddings = tokio::task::spawn_blocking(move || model.embed(input, None))
            .await
            .map_err(|e| UpstreamError::Request {
                service: SERVICE,
                message: format!("Embedding task failed: {}", e),
                transient: false,
            })?
            .map_err(|e| UpstreamError::Request {
                service: SERVICE,
                message: e.to_string(),
                transient: false,
            })?;

        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::InvalidResponse {
                service: SERVICE,
                message: "No embeddings generated".to_string(),
            })?;

        if embedding.len() != self.dimension {
            return Err(UpstreamError::InvalidResponse {
                service: SERVICE,
                message: format!(
                    "Dimension mismatch: expected {}, got {}",
                    self.dimension,
                    embedding.len()
                ),
            });
        }

        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_model() {
        let result = FastEmbedProvider::new("text-embedding-3-small");
        assert!(matches!(
            result,
            Err(UpstreamError::Request {
                transient: false,
                ..
            })
        ));
    }

    #[tokio::test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    async fn test_single_embedding() {
        let provider = FastEmbedProvider::new("all-MiniLM-L6-v2").unwrap();
        assert_eq!(provider.dimension(), 384);

        let embedding = provider
            .embed("This is a test sentence for embedding.")
            .await
            .unwrap();
        assert_eq!(embedding.len(), 384);

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.1);
    }
}
