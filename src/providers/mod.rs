//! External capabilities consumed by the retrieval pipeline
//!
//! The pipeline only sees three traits:
//! - `Embedder` maps text to a fixed-length vector
//! - `VectorStore` answers nearest-neighbor queries with (text, source) passages
//! - `LanguageModel` maps a prompt to generated text
//!
//! Concrete adapters talk to an OpenAI-compatible API, a local FastEmbed model
//! and a Qdrant collection. `CallPolicy` wraps every call with a timeout,
//! cancellation and optional retry.

mod guard;
mod local;
mod openai;
mod qdrant;

pub use guard::CallPolicy;
pub use local::FastEmbedProvider;
pub use openai::OpenAiClient;
pub use qdrant::QdrantStore;

use crate::retrieval::Passage;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("{service} request failed: {message}")]
    Request {
        service: &'static str,
        message: String,
        transient: bool,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {service}: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("{operation} was cancelled")]
    Cancelled { operation: &'static str },
}

impl UpstreamError {
    /// Whether a retry has a reasonable chance of succeeding
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Request { transient, .. } => *transient,
            UpstreamError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            UpstreamError::Timeout { .. } => true,
            UpstreamError::InvalidResponse { .. } | UpstreamError::Cancelled { .. } => false,
        }
    }

    pub(crate) fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        UpstreamError::Request {
            service,
            transient: err.is_timeout() || err.is_connect() || err.is_request(),
            message: err.to_string(),
        }
    }
}

/// Maps text to a fixed-length numeric vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;
}

/// Nearest-neighbor search over stored passage vectors
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `k` passages closest to `vector`, nearest first
    async fn nearest_neighbors(&self, vector: &[f32], k: usize)
        -> Result<Vec<Passage>, UpstreamError>;
}

/// Single-shot text completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError>;
}
