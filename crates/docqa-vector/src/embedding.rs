//! Embedding client for generating vector representations
//!
//! Supports OpenAI and Ollama embedding APIs, plus an offline
//! feature-hashing embedder for development and tests.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use docqa_core::{
    DocQaError, EmbeddingConfig, EmbeddingProvider, EmbeddingVector, LlmConfig, Result,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// Default OpenAI API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Dimension of the hashing embedder when none is configured
pub const DEFAULT_HASH_DIMENSION: usize = 384;

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        if results.len() != 1 {
            return Err(DocQaError::TransientProvider {
                provider: self.name().to_string(),
                message: format!("expected 1 embedding, got {}", results.len()),
            });
        }
        Ok(results.remove(0))
    }

    /// Generate embeddings for multiple texts (batch), in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Provider name for logging and error reports
    fn name(&self) -> &str;
}

// ============================================================================
// HTTP error classification
// ============================================================================

/// Map a non-success HTTP status from a provider onto the error taxonomy
pub fn classify_http_error(provider: &str, status: StatusCode, body: String) -> DocQaError {
    let provider = provider.to_string();
    match status {
        StatusCode::TOO_MANY_REQUESTS => DocQaError::RateLimited {
            provider,
            message: body,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DocQaError::AuthError {
            provider,
            message: body,
        },
        s if s.is_server_error() => DocQaError::TransientProvider {
            provider,
            message: format!("HTTP {}: {body}", s.as_u16()),
        },
        s => DocQaError::ProviderRejected {
            provider,
            status: s.as_u16(),
            message: body,
        },
    }
}

/// Map a transport failure (connect, timeout, body decode) to a transient error
pub fn transport_error(provider: &str, context: &str, err: reqwest::Error) -> DocQaError {
    DocQaError::TransientProvider {
        provider: provider.to_string(),
        message: format!("{context}: {err}"),
    }
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
    /// Requested output size, sent only when it differs from the model default
    requested_dimensions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = Self::native_dimension(&model);

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
            model,
            dimension,
            requested_dimensions: None,
        }
    }

    fn native_dimension(model: &str) -> usize {
        match model {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536, // Default
        }
    }

    /// Use a different API base URL (Azure or compatible gateways)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Request a reduced output dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        if dimension != self.dimension {
            self.requested_dimensions = Some(dimension);
        }
        self.dimension = dimension;
        self
    }

    /// Create from config
    pub fn from_config(embedding: &EmbeddingConfig, llm: &LlmConfig) -> Result<Self> {
        let api_key = llm
            .openai_api_key
            .as_ref()
            .ok_or_else(|| DocQaError::Config("OpenAI API key required".to_string()))?;

        let mut client = Self::new(api_key.clone(), embedding.model.clone());
        if let Some(base_url) = &llm.openai_base_url {
            client = client.with_base_url(base_url.clone());
        }
        if let Some(dimension) = embedding.dimension {
            client = client.with_dimension(dimension);
        }
        Ok(client)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OpenAiEmbeddingRequest {
            input: texts,
            model: &self.model,
            dimensions: self.requested_dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), "embedding request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(self.name(), status, error_text));
        }

        let result: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| transport_error(self.name(), "failed to parse embedding response", e))?;

        // Sort by index and extract embeddings
        let mut embeddings = result.data;
        embeddings.sort_by_key(|e| e.index);

        Ok(embeddings.into_iter().map(|e| e.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768, // Default for most models
        };

        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(embedding: &EmbeddingConfig, llm: &LlmConfig) -> Self {
        let mut client = Self::new(llm.ollama_url.clone(), embedding.model.clone());
        if let Some(dimension) = embedding.dimension {
            client.dimension = dimension;
        }
        client
    }

    async fn embed_one(&self, text: &str) -> Result<EmbeddingVector> {
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(self.name(), "embedding request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(self.name(), status, error_text));
        }

        let result: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| transport_error(self.name(), "failed to parse embedding response", e))?;

        Ok(result.embedding)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        // Ollama doesn't have native batch embedding, so we process sequentially
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed_one(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

// ============================================================================
// Hashing Embedding Client
// ============================================================================

/// Deterministic bag-of-words embedder using signed feature hashing.
///
/// Needs no network access. Texts sharing words land close together, which is
/// enough for local development and end-to-end tests.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn fnv1a(token: &str) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        token.bytes().fold(OFFSET, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(PRIME)
        })
    }

    /// Embed a single text synchronously
    pub fn embed_text(&self, text: &str) -> EmbeddingVector {
        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = Self::fnv1a(token);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
pub fn create_embedding_client(
    embedding: &EmbeddingConfig,
    llm: &LlmConfig,
) -> Result<Box<dyn EmbeddingClient>> {
    match embedding.provider {
        EmbeddingProvider::OpenAI => Ok(Box::new(OpenAiEmbedding::from_config(embedding, llm)?)),
        EmbeddingProvider::Ollama => Ok(Box::new(OllamaEmbedding::from_config(embedding, llm))),
        EmbeddingProvider::Hash => Ok(Box::new(HashEmbedding::new(
            embedding.dimension.unwrap_or(DEFAULT_HASH_DIMENSION),
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_dimension() {
        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-small");
        assert_eq!(client.dimension(), 1536);
        assert!(client.requested_dimensions.is_none());

        let client = OpenAiEmbedding::new("test-key", "text-embedding-3-large");
        assert_eq!(client.dimension(), 3072);

        let reduced = OpenAiEmbedding::new("test-key", "text-embedding-3-large").with_dimension(256);
        assert_eq!(reduced.dimension(), 256);
        assert_eq!(reduced.requested_dimensions, Some(256));
    }

    #[test]
    fn test_ollama_dimension() {
        let client = OllamaEmbedding::new("http://localhost:11434", "nomic-embed-text");
        assert_eq!(client.dimension(), 768);

        let client = OllamaEmbedding::new("http://localhost:11434/", "mxbai-embed-large");
        assert_eq!(client.dimension(), 1024);
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_openai_requires_api_key() {
        let result = OpenAiEmbedding::from_config(&EmbeddingConfig::default(), &LlmConfig::default());
        assert!(matches!(result, Err(DocQaError::Config(_))));
    }

    #[test]
    fn test_factory_builds_hash_client() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Hash,
            dimension: Some(64),
            ..Default::default()
        };
        let client = create_embedding_client(&config, &LlmConfig::default()).unwrap();
        assert_eq!(client.dimension(), 64);
        assert_eq!(client.name(), "hash");
    }

    #[test]
    fn test_status_classification() {
        let classify = |code: u16| {
            classify_http_error("openai", StatusCode::from_u16(code).unwrap(), String::new())
        };

        assert!(matches!(classify(429), DocQaError::RateLimited { .. }));
        assert!(matches!(classify(401), DocQaError::AuthError { .. }));
        assert!(matches!(classify(403), DocQaError::AuthError { .. }));
        assert!(matches!(classify(503), DocQaError::TransientProvider { .. }));
        assert!(matches!(
            classify(400),
            DocQaError::ProviderRejected { status: 400, .. }
        ));

        assert!(classify(429).is_retryable());
        assert!(classify(500).is_retryable());
        assert!(!classify(401).is_retryable());
        assert!(!classify(422).is_retryable());
    }

    #[test]
    fn test_hash_embedding_is_deterministic_and_normalized() {
        let embedder = HashEmbedding::new(128);
        let a = embedder.embed_text("Annual leave policy");
        let b = embedder.embed_text("annual LEAVE, policy!");

        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);

        let empty = embedder.embed_text("  ...  ");
        assert!(empty.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_hash_embedding_batch() {
        let embedder = HashEmbedding::new(32);
        let texts = vec!["one".to_string(), "two".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 32));
        assert_eq!(embedder.embed("one").await.unwrap(), vectors[0]);
    }
}
