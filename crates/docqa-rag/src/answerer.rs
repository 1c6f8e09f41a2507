//! Retrieval-augmented answering over a vector index snapshot

use docqa_core::{
    Answer, AppConfig, DocQaError, EmbeddingVector, LlmClient, Result, ScoredChunk, UNKNOWN_SOURCE,
};
use docqa_vector::{EmbeddingClient, VectorIndex};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::EmbeddingCache;
use crate::PromptBuilder;

const SYSTEM_INSTRUCTION: &str = "You answer questions about the user's uploaded documents.\n\
     Use only the information in the provided context.\n\
     If the context does not contain the answer, say that it could not be found.";

/// Answers questions from the chunks nearest to the query embedding
pub struct RetrievalAnswerer {
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LlmClient>,
    cache: Option<EmbeddingCache>,
    top_k: usize,
    max_context_length: usize,
    llm_timeout: Duration,
}

impl RetrievalAnswerer {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            embedder,
            llm,
            cache: None,
            top_k: 4,
            max_context_length: 8000,
            llm_timeout: Duration::from_secs(60),
        }
    }

    /// Create from config
    pub fn from_config(
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        config: &AppConfig,
    ) -> Self {
        let mut answerer = Self::new(embedder, llm)
            .with_top_k(config.rag.top_k)
            .with_max_context_length(config.rag.max_context_length)
            .with_llm_timeout(Duration::from_secs(config.llm.timeout_secs));
        answerer.cache = EmbeddingCache::from_config(&config.rag);
        answerer
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Upper bound on context characters handed to the model
    pub fn with_max_context_length(mut self, max_context_length: usize) -> Self {
        self.max_context_length = max_context_length;
        self
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn cache(&self) -> Option<&EmbeddingCache> {
        self.cache.as_ref()
    }

    /// Answer `query` from the chunks of `index`.
    ///
    /// Fails with [`DocQaError::NoContext`] for an empty index without
    /// calling any provider, and with [`DocQaError::AnswerGeneration`] when
    /// the language model fails after retrieval succeeded.
    pub async fn answer(&self, index: &VectorIndex, query: &str) -> Result<Answer> {
        let start_time = Instant::now();

        if index.is_empty() {
            return Err(DocQaError::NoContext);
        }
        let query = query.trim();
        if query.is_empty() {
            return Err(DocQaError::Validation("query must not be empty".to_string()));
        }

        let query_vector = self.embed_query(query).await?;
        let matches = index.search(&query_vector, self.top_k)?;
        tracing::debug!(
            top_k = self.top_k,
            matches = matches.len(),
            nearest = ?matches.first().map(|m| m.distance),
            "Retrieved context"
        );

        let prompt = self.build_prompt(query, &matches);
        tracing::debug!(prompt_chars = prompt.len(), llm = self.llm.name(), "Calling LLM");

        let answer = match tokio::time::timeout(self.llm_timeout, self.llm.generate(&prompt)).await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                return Err(DocQaError::AnswerGeneration {
                    cause: e.to_string(),
                })
            }
            Err(_) => {
                return Err(DocQaError::AnswerGeneration {
                    cause: format!("{} timed out after {:?}", self.llm.name(), self.llm_timeout),
                })
            }
        };

        let sources = Self::collect_sources(&matches);
        let processing_time_ms = start_time.elapsed().as_millis() as u64;

        tracing::info!(
            sources = sources.len(),
            answer_chars = answer.len(),
            processing_time_ms,
            "Question answered"
        );

        Ok(Answer {
            answer,
            sources,
            matches,
            processing_time_ms,
        })
    }

    async fn embed_query(&self, query: &str) -> Result<EmbeddingVector> {
        if let Some(cache) = &self.cache {
            if let Some(vector) = cache.get(query).await {
                return Ok(vector);
            }
        }

        let vector = self.embedder.embed(query).await?;

        if let Some(cache) = &self.cache {
            cache.put(query, vector.clone()).await;
        }
        Ok(vector)
    }

    fn collect_sources(matches: &[ScoredChunk]) -> Vec<String> {
        matches
            .iter()
            .map(|m| {
                m.chunk
                    .source_id()
                    .unwrap_or_else(|| UNKNOWN_SOURCE.to_string())
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn build_prompt(&self, question: &str, matches: &[ScoredChunk]) -> String {
        let mut builder = PromptBuilder::new().system(SYSTEM_INSTRUCTION);

        let mut total_length = 0;
        for (i, scored) in matches.iter().enumerate() {
            let text = scored.chunk.text.as_str();
            let len = text.chars().count();

            let text: String = if total_length + len <= self.max_context_length {
                text.to_string()
            } else if i == 0 {
                // Never send an empty context when the nearest chunk alone is too long
                text.chars().take(self.max_context_length).collect()
            } else {
                break;
            };
            total_length += text.chars().count();

            let source = scored
                .chunk
                .source_id()
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
            builder = builder.add_context(format!("[{}] Source: {}\n{}", i + 1, source, text));
        }

        builder
            .question(format!(
                "Please provide a detailed and comprehensive answer to the following question: {question}"
            ))
            .add_instruction("Read the context carefully.")
            .add_instruction("Use only information relevant to the question.")
            .add_instruction("Do not state information that is not supported by the context.")
            .build()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingLlm;
    use docqa_core::Chunk;
    use docqa_vector::HashEmbedding;

    const DIM: usize = 64;

    async fn build_index(chunks: Vec<Chunk>) -> VectorIndex {
        let embedder = HashEmbedding::new(DIM);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await.unwrap();

        let mut index = VectorIndex::new(DIM);
        index.insert(chunks, vectors).unwrap();
        index
    }

    fn answerer(llm: Arc<RecordingLlm>) -> RetrievalAnswerer {
        RetrievalAnswerer::new(Arc::new(HashEmbedding::new(DIM)), llm)
    }

    #[tokio::test]
    async fn test_empty_index_has_no_context() {
        let llm = Arc::new(RecordingLlm::default());
        let err = answerer(llm.clone())
            .answer(&VectorIndex::new(DIM), "anything?")
            .await
            .unwrap_err();

        assert!(matches!(err, DocQaError::NoContext));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_answer_reports_deduplicated_sources() {
        let index = build_index(vec![
            Chunk::new("vacation days accrue monthly", "policy.pdf").with_page(1),
            Chunk::new("vacation days may carry over", "policy.pdf").with_page(1),
            Chunk::new("expense reports are due friday", "finance.md"),
            Chunk::unattributed("vacation requests need approval"),
        ])
        .await;

        let llm = Arc::new(RecordingLlm::default());
        let answer = answerer(llm.clone())
            .with_top_k(4)
            .answer(&index, "How do vacation days work?")
            .await
            .unwrap();

        assert!(!answer.answer.is_empty());
        assert_eq!(answer.matches.len(), 4);
        assert_eq!(
            answer.sources,
            vec!["Unknown", "finance.md", "policy.pdf#page=1"]
        );
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_prompt_carries_context_and_question() {
        let index = build_index(vec![Chunk::new("the launch is planned for march", "plan.txt")]).await;

        let llm = Arc::new(RecordingLlm::default());
        answerer(llm.clone())
            .answer(&index, "When is the launch?")
            .await
            .unwrap();

        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("detailed and comprehensive"));
        assert!(prompt.contains("When is the launch?"));
        assert!(prompt.contains("[1] Source: plan.txt"));
        assert!(prompt.contains("the launch is planned for march"));
    }

    #[tokio::test]
    async fn test_context_is_bounded() {
        let long = "alpha ".repeat(100);
        let index = build_index(vec![
            Chunk::new(long.clone(), "a.txt"),
            Chunk::new(long.clone(), "b.txt"),
        ])
        .await;

        let llm = Arc::new(RecordingLlm::default());
        answerer(llm.clone())
            .with_max_context_length(50)
            .answer(&index, "alpha")
            .await
            .unwrap();

        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("[1] Source:"));
        assert!(!prompt.contains("[2] Source:"));
        assert!(!prompt.contains(&long));
    }

    #[tokio::test]
    async fn test_llm_failure_is_answer_generation_error() {
        let index = build_index(vec![Chunk::new("some text", "a.txt")]).await;

        let err = answerer(Arc::new(RecordingLlm::failing()))
            .answer(&index, "question")
            .await
            .unwrap_err();

        assert!(matches!(err, DocQaError::AnswerGeneration { .. }));
    }

    #[tokio::test]
    async fn test_query_embeddings_are_cached() {
        let index = build_index(vec![Chunk::new("some text", "a.txt")]).await;
        let cache = EmbeddingCache::new(10, Duration::from_secs(60));

        let answerer = answerer(Arc::new(RecordingLlm::default())).with_cache(cache.clone());
        answerer.answer(&index, "same question").await.unwrap();
        answerer.answer(&index, "same question").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected() {
        let index = build_index(vec![Chunk::new("some text", "a.txt")]).await;
        let err = answerer(Arc::new(RecordingLlm::default()))
            .answer(&index, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_index_is_reported_before_blank_query() {
        let err = answerer(Arc::new(RecordingLlm::default()))
            .answer(&VectorIndex::new(DIM), "")
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::NoContext));
    }

    #[tokio::test(start_paused = true)]
    async fn test_llm_timeout_is_answer_generation_error() {
        let index = build_index(vec![Chunk::new("some text", "a.txt")]).await;

        let llm = Arc::new(RecordingLlm::stalling(Duration::from_secs(120)));
        let err = answerer(llm.clone())
            .with_llm_timeout(Duration::from_secs(5))
            .answer(&index, "question")
            .await
            .unwrap_err();

        match err {
            DocQaError::AnswerGeneration { cause } => assert!(cause.contains("timed out")),
            other => panic!("expected AnswerGeneration, got {other:?}"),
        }
        assert_eq!(llm.calls(), 1);
    }
}
