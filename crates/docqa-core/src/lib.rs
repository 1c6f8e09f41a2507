//! DocQA Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the DocQA system:
//! - Chunk and embedding data model
//! - Query results and answers
//! - The error taxonomy shared by every crate
//! - Collaborator traits (language model, object storage)
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, EmbeddingConfig, EmbeddingProvider, IngestMode, LlmConfig,
    LlmProvider, LoggingConfig, RagConfig, RetryConfig, ServerConfig, StorageBackend,
    StorageConfig,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for DocQA operations
#[derive(Error, Debug)]
pub enum DocQaError {
    #[error("Invalid document {document}: {reason}")]
    InvalidDocument { document: String, reason: String },

    #[error("Index is empty: {operation} requires at least one vector")]
    EmptyIndex { operation: &'static str },

    #[error("Corrupt index: {reason}")]
    CorruptIndex { reason: String },

    #[error("Rate limited by {provider}: {message}")]
    RateLimited { provider: String, message: String },

    #[error("Transient error from {provider}: {message}")]
    TransientProvider { provider: String, message: String },

    #[error("Authentication failed for {provider}: {message}")]
    AuthError { provider: String, message: String },

    #[error("{provider} rejected the request (HTTP {status}): {message}")]
    ProviderRejected {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Embedding unavailable after {attempts} attempt(s): {cause}")]
    EmbeddingUnavailable { attempts: u32, cause: String },

    #[error("No documents available. Please upload a document first.")]
    NoContext,

    #[error("Answer generation failed: {cause}")]
    AnswerGeneration { cause: String },

    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Access denied to {bucket}/{key}: {reason}")]
    AccessDenied {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Storage error during {operation} of {key}: {message}")]
    Storage {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocQaError {
    /// Whether a provider call that failed with this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::TransientProvider { .. }
        )
    }

    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDocument { .. } => "INVALID_DOCUMENT",
            Self::EmptyIndex { .. } => "EMPTY_INDEX",
            Self::CorruptIndex { .. } => "CORRUPT_INDEX",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::TransientProvider { .. } => "PROVIDER_UNAVAILABLE",
            Self::AuthError { .. } => "PROVIDER_AUTH_ERROR",
            Self::ProviderRejected { .. } => "PROVIDER_REJECTED",
            Self::EmbeddingUnavailable { .. } => "EMBEDDING_UNAVAILABLE",
            Self::NoContext => "NO_CONTEXT",
            Self::AnswerGeneration { .. } => "ANSWER_GENERATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Config(_) => "CONFIGURATION_ERROR",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ConfigError> for DocQaError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DocQaError>;

// ============================================================================
// Chunk Model
// ============================================================================

/// Source identifier reported when a chunk carries no attribution
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// An embedding vector. Its length is fixed by the embedding provider.
pub type EmbeddingVector = Vec<f32>;

/// A bounded text segment with source attribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Text content
    pub text: String,

    /// Source document identifier (usually the uploaded file name)
    #[serde(default)]
    pub source: Option<String>,

    /// Page number (1-based) if the document is paginated
    #[serde(default)]
    pub page: Option<u32>,

    /// Character offset of the chunk within its page
    #[serde(default)]
    pub offset: usize,

    /// Position of the chunk within its document
    #[serde(default)]
    pub chunk_index: u32,
}

impl Chunk {
    /// Create a new chunk attributed to `source`
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: Some(source.into()),
            page: None,
            offset: 0,
            chunk_index: 0,
        }
    }

    /// Create a chunk with no source attribution
    pub fn unattributed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
            page: None,
            offset: 0,
            chunk_index: 0,
        }
    }

    /// Set page number
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Set character offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Set chunk index
    pub fn with_index(mut self, chunk_index: u32) -> Self {
        self.chunk_index = chunk_index;
        self
    }

    /// Identifier used when citing this chunk, e.g. `report.pdf#page=2`
    pub fn source_id(&self) -> Option<String> {
        let source = self.source.as_deref()?;
        Some(match self.page {
            Some(page) => format!("{source}#page={page}"),
            None => source.to_string(),
        })
    }
}

// ============================================================================
// Query Results
// ============================================================================

/// A retrieved chunk with its distance to the query vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,

    /// Distance to the query (lower is closer)
    pub distance: f32,
}

/// Answer produced by retrieval-augmented generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Generated answer text
    pub answer: String,

    /// Deduplicated source identifiers of the retrieved chunks
    pub sources: Vec<String>,

    /// Retrieved chunks in ascending distance order
    pub matches: Vec<ScoredChunk>,

    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Trait for object storage backends
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. Fails with [`DocQaError::NotFound`] if it does not exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Store an object, replacing any previous value
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Fetch an object, mapping a missing key to `None`
    async fn get_optional(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        match self.get(bucket, key).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(DocQaError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Backend name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn test_source_id_with_page() {
        let chunk = Chunk::new("text", "report.pdf").with_page(2);
        assert_eq!(chunk.source_id(), Some("report.pdf#page=2".to_string()));
    }

    #[test]
    fn test_source_id_without_page() {
        let chunk = Chunk::new("text", "notes.md");
        assert_eq!(chunk.source_id(), Some("notes.md".to_string()));
        assert_eq!(Chunk::unattributed("text").source_id(), None);
    }

    #[test]
    fn test_chunk_deserializes_without_optional_fields() {
        let chunk: Chunk = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(chunk.text, "hello");
        assert!(chunk.source.is_none());
        assert_eq!(chunk.offset, 0);
    }

    #[test]
    fn test_retryable_classification() {
        let rate_limited = DocQaError::RateLimited {
            provider: "openai".to_string(),
            message: "slow down".to_string(),
        };
        let auth = DocQaError::AuthError {
            provider: "openai".to_string(),
            message: "bad key".to_string(),
        };

        assert!(rate_limited.is_retryable());
        assert!(!auth.is_retryable());
        assert!(!DocQaError::NoContext.is_retryable());
    }

    #[test]
    fn test_no_context_message() {
        assert_eq!(
            DocQaError::NoContext.to_string(),
            "No documents available. Please upload a document first."
        );
        assert_eq!(DocQaError::NoContext.code(), "NO_CONTEXT");
    }

    struct MapStore(Mutex<HashMap<String, Vec<u8>>>);

    #[async_trait::async_trait]
    impl ObjectStore for MapStore {
        async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
            self.0
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| DocQaError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        }

        async fn put(&self, _bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
            self.0.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }

        fn name(&self) -> &str {
            "map"
        }
    }

    #[test]
    fn test_get_optional_maps_not_found() {
        let store = MapStore(Mutex::new(HashMap::new()));
        let missing = tokio_test::block_on(store.get_optional("b", "missing")).unwrap();
        assert!(missing.is_none());

        tokio_test::block_on(store.put("b", "k", b"v".to_vec())).unwrap();
        let found = tokio_test::block_on(store.get_optional("b", "k")).unwrap();
        assert_eq!(found, Some(b"v".to_vec()));
    }
}
