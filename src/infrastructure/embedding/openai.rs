//! OpenAI-compatible embedding provider

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::domain::embedding::EmbeddingProvider;
use crate::domain::DomainError;
use crate::infrastructure::http_client::HttpClientTrait;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Embeddings from any server speaking the OpenAI `/v1/embeddings` API
#[derive(Debug)]
pub struct OpenAiEmbeddingProvider<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
}

impl<C: HttpClientTrait> OpenAiEmbeddingProvider<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_OPENAI_BASE_URL)
    }

    /// Point at a self-hosted or proxy endpoint
    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let auth_header = format!("Bearer {}", api_key.into());
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client,
            auth_header,
            base_url,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Ask the server to shorten vectors to `dimensions`
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    fn build_request(&self, input: serde_json::Value) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "input": input,
        });
        if let Some(dimensions) = self.dimensions {
            body["dimensions"] = json!(dimensions);
        }
        body
    }

    async fn request(&self, input: serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>, DomainError> {
        let body = self.build_request(input);
        let response = self
            .client
            .post_json(&self.embeddings_url(), self.headers(), &body)
            .await?;

        let mut response: OpenAiEmbeddingResponse = serde_json::from_value(response).map_err(|e| {
            DomainError::provider("openai", format!("Failed to parse embedding response: {}", e))
        })?;

        if response.data.len() != expected {
            return Err(DomainError::provider(
                "openai",
                format!("Expected {} embeddings, got {}", expected, response.data.len()),
            ));
        }

        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl<C: HttpClientTrait> EmbeddingProvider for OpenAiEmbeddingProvider<C> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let mut vectors = self.request(json!(text), 1).await?;
        vectors
            .pop()
            .ok_or_else(|| DomainError::provider("openai", "Empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(json!(texts), texts.len()).await
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// OpenAI API types for embeddings

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::mock::MockHttpClient;
    use crate::infrastructure::http_client::HttpClient;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_URL: &str = "https://api.openai.com/v1/embeddings";

    fn create_mock_response(indices: &[usize], dimensions: usize) -> serde_json::Value {
        let data: Vec<serde_json::Value> = indices
            .iter()
            .map(|&i| {
                let embedding: Vec<f32> = (0..dimensions).map(|j| (i * 10 + j) as f32).collect();
                json!({"index": i, "embedding": embedding, "object": "embedding"})
            })
            .collect();

        json!({
            "model": "text-embedding-3-small",
            "data": data,
            "usage": {"prompt_tokens": 10, "total_tokens": 10}
        })
    }

    #[tokio::test]
    async fn test_embed_single_text() {
        let client = MockHttpClient::new().with_response(TEST_URL, create_mock_response(&[0], 4));
        let provider = OpenAiEmbeddingProvider::new(client, "test-api-key");

        let vector = provider.embed("straight legs").await.unwrap();
        assert_eq!(vector, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_embed_batch_orders_by_index() {
        let client =
            MockHttpClient::new().with_response(TEST_URL, create_mock_response(&[1, 0, 2], 2));
        let provider = OpenAiEmbeddingProvider::new(client, "test-api-key");

        let vectors = provider
            .embed_batch(&["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.0, 1.0], vec![10.0, 11.0], vec![20.0, 21.0]]);
    }

    #[tokio::test]
    async fn test_embed_batch_count_mismatch() {
        let client = MockHttpClient::new().with_response(TEST_URL, create_mock_response(&[0], 2));
        let provider = OpenAiEmbeddingProvider::new(client, "test-api-key");

        assert!(provider.embed_batch(&["a".into(), "b".into()]).await.is_err());
    }

    #[tokio::test]
    async fn test_request_body() {
        let client = MockHttpClient::new().with_response(TEST_URL, create_mock_response(&[0], 2));
        let provider = OpenAiEmbeddingProvider::new(client, "test-api-key")
            .with_model("text-embedding-3-large")
            .with_dimensions(256);

        provider.embed("legs").await.unwrap();
        assert_eq!(
            provider.client.requests()[0],
            json!({"model": "text-embedding-3-large", "input": "legs", "dimensions": 256})
        );
        assert_eq!(provider.model(), "text-embedding-3-large");
    }

    #[tokio::test]
    async fn test_embed_error() {
        let client = MockHttpClient::new().with_error(TEST_URL, "Rate limit exceeded");
        let provider = OpenAiEmbeddingProvider::new(client, "test-api-key");

        assert!(provider.embed("Hello").await.is_err());
    }

    #[tokio::test]
    async fn test_against_http_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_partial_json(json!({"input": "bench"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(create_mock_response(&[0], 3)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiEmbeddingProvider::with_base_url(HttpClient::new(), "secret", server.uri());
        let vector = provider.embed("bench").await.unwrap();

        assert_eq!(vector.len(), 3);
        assert_eq!(provider.provider_name(), "openai");
    }
}
