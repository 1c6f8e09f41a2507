//! Offline collaborators for integration tests

use async_trait::async_trait;
use docqa_core::{AppConfig, LlmClient, Result};
use docqa_rag::DocumentService;
use docqa_vector::{EmbeddingClient, HashEmbedding, IndexStore, MemoryObjectStore};
use std::sync::Arc;

/// LLM that answers by echoing the retrieved context
#[derive(Debug, Default)]
pub struct EchoLlm;

#[async_trait]
impl LlmClient for EchoLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let context = prompt
            .split("<context>")
            .nth(1)
            .and_then(|rest| rest.split("</context>").next())
            .unwrap_or_default();
        Ok(format!("From the documents: {}", context.trim()))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Small chunks and a single retry so tests stay fast
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.rag.chunk_size = 200;
    config.rag.chunk_overlap = 20;
    config.retry.max_attempts = 1;
    config
}

pub fn offline_service(config: &AppConfig) -> DocumentService {
    let embedder: Arc<dyn EmbeddingClient> = Arc::new(HashEmbedding::new(64));
    let store = IndexStore::new(Arc::new(MemoryObjectStore::new()), "docqa-test");
    match DocumentService::new(embedder, Arc::new(EchoLlm), store, config) {
        Ok(service) => service,
        Err(e) => panic!("test configuration rejected: {e}"),
    }
}
