//! Qdrant nearest-neighbor search over the REST API

use super::{UpstreamError, VectorStore};
use crate::retrieval::Passage;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const SERVICE: &str = "vector store";

/// Read-only handle on one Qdrant collection
///
/// Each stored point carries a payload with `text` (the passage) and
/// `source` (typically the originating filename).
pub struct QdrantStore {
    client: Client,
    url: String,
    collection: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    points: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct PointPayload {
    #[serde(default)]
    text: String,
    #[serde(default)]
    source: String,
}

impl QdrantStore {
    pub fn new(url: &str, collection: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            api_key,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<Passage>, UpstreamError> {
        let url = format!(
            "{}/collections/{}/points/query",
            self.url, self.collection
        );
        let body = json!({
            "query": vector,
            "limit": k,
            "with_payload": true,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: text,
            });
        }

        parse_points(&text)
    }
}

/// Convert a query response into passages, skipping points without text
fn parse_points(body: &str) -> Result<Vec<Passage>, UpstreamError> {
    let response: QueryResponse =
        serde_json::from_str(body).map_err(|e| UpstreamError::InvalidResponse {
            service: SERVICE,
            message: format!("Invalid query response: {}", e),
        })?;

    Ok(response
        .result
        .points
        .into_iter()
        .filter_map(|point| {
            let payload = point.payload.unwrap_or_default();
            if payload.text.is_empty() {
                None
            } else {
                Some(Passage::new(payload.text, payload.source))
            }
        })
        .collect())
}
