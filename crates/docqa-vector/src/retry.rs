//! Exponential backoff around embedding providers
//!
//! Retryable provider failures (rate limiting, transient errors, timeouts)
//! are absorbed here. Callers only ever see a complete result,
//! [`DocQaError::EmbeddingUnavailable`] once attempts are exhausted, or a
//! non-retryable error passed through unchanged.

use async_trait::async_trait;
use docqa_core::{DocQaError, EmbeddingVector, Result, RetryConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::embedding::EmbeddingClient;

/// Backoff policy: after failed attempt `n` (starting at 1) wait `base * 2^n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            call_timeout: Duration::from_secs(60),
        }
    }

    /// Bound every provider call by `timeout`
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Create from config
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.base_delay_ms))
            .with_call_timeout(Duration::from_secs(config.call_timeout_secs))
    }

    /// Wait applied after failed attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds, fails without being retryable, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, provider: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(DocQaError::TransientProvider {
                    provider: provider.to_string(),
                    message: format!("call timed out after {:?}", self.call_timeout),
                }),
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt >= self.max_attempts {
                tracing::error!(
                    provider,
                    attempts = attempt,
                    error = %err,
                    "Embedding retries exhausted"
                );
                return Err(DocQaError::EmbeddingUnavailable {
                    attempts: attempt,
                    cause: err.to_string(),
                });
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Embedding call failed, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Embedding client that batches inputs and retries each batch under a
/// [`RetryPolicy`]
pub struct RetryingEmbedder {
    inner: Arc<dyn EmbeddingClient>,
    policy: RetryPolicy,
    batch_size: usize,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingClient>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            batch_size: 256,
        }
    }

    /// Maximum number of texts per provider request
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call the provider once and check the shape of what came back
    async fn embed_checked(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let vectors = self.inner.embed_batch(texts).await?;

        if vectors.len() != texts.len() {
            return Err(DocQaError::TransientProvider {
                provider: self.inner.name().to_string(),
                message: format!(
                    "returned {} embeddings for {} inputs",
                    vectors.len(),
                    texts.len()
                ),
            });
        }

        let dimension = self.inner.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(DocQaError::TransientProvider {
                provider: self.inner.name().to_string(),
                message: format!(
                    "returned a {}-dimensional embedding, expected {dimension}",
                    bad.len()
                ),
            });
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingClient for RetryingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let embedded = self
                .policy
                .run(self.inner.name(), || self.embed_checked(batch))
                .await?;
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    const DIM: usize = 3;

    /// Fails with the given error for the first `failures` calls
    struct FlakyEmbedder {
        failures: u32,
        error: fn() -> DocQaError,
        calls: AtomicU32,
    }

    impl FlakyEmbedder {
        fn new(failures: u32, error: fn() -> DocQaError) -> Arc<Self> {
            Arc::new(Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingClient for FlakyEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err((self.error)());
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32; DIM]).collect())
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn rate_limited() -> DocQaError {
        DocQaError::RateLimited {
            provider: "flaky".to_string(),
            message: "429".to_string(),
        }
    }

    fn auth_error() -> DocQaError {
        DocQaError::AuthError {
            provider: "flaky".to_string(),
            message: "invalid key".to_string(),
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(1))
    }

    fn texts() -> Vec<String> {
        vec!["alpha".to_string(), "be".to_string()]
    }

    fn assert_waited(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(10),
            "waited {elapsed:?}, expected {expected:?}"
        );
    }

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = policy(5);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 3,
            base_delay_ms: 250,
            call_timeout_secs: 10,
        });
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.call_timeout, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_rate_limiting() {
        let provider = FlakyEmbedder::new(3, rate_limited);
        let embedder = RetryingEmbedder::new(provider.clone(), policy(5));

        let start = Instant::now();
        let vectors = embedder.embed_batch(&texts()).await.unwrap();

        assert_eq!(vectors, vec![vec![5.0; DIM], vec![2.0; DIM]]);
        assert_eq!(provider.calls(), 4);
        // 2^1 + 2^2 + 2^3
        assert_waited(start, Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_without_extra_calls() {
        let provider = FlakyEmbedder::new(u32::MAX, rate_limited);
        let embedder = RetryingEmbedder::new(provider.clone(), policy(5));

        let start = Instant::now();
        let err = embedder.embed_batch(&texts()).await.unwrap_err();

        assert!(matches!(
            err,
            DocQaError::EmbeddingUnavailable { attempts: 5, .. }
        ));
        assert_eq!(provider.calls(), 5);
        // 2^1 + 2^2 + 2^3 + 2^4, no wait after the final attempt
        assert_waited(start, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_error_is_not_retried() {
        let provider = FlakyEmbedder::new(1, auth_error);
        let embedder = RetryingEmbedder::new(provider.clone(), policy(5));

        let start = Instant::now();
        let err = embedder.embed_batch(&texts()).await.unwrap_err();

        assert!(matches!(err, DocQaError::AuthError { .. }));
        assert_eq!(provider.calls(), 1);
        assert_waited(start, Duration::ZERO);
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingClient for SlowEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(texts.iter().map(|_| vec![0.0; DIM]).collect())
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_as_transient() {
        let policy = policy(2).with_call_timeout(Duration::from_secs(5));
        let embedder = RetryingEmbedder::new(Arc::new(SlowEmbedder), policy);

        let err = embedder.embed_batch(&texts()).await.unwrap_err();
        assert!(matches!(
            err,
            DocQaError::EmbeddingUnavailable { attempts: 2, .. }
        ));
    }

    /// Returns one vector fewer than requested
    struct ShortEmbedder(AtomicU32);

    #[async_trait]
    impl EmbeddingClient for ShortEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().skip(1).map(|_| vec![0.0; DIM]).collect())
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn name(&self) -> &str {
            "short"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_results_are_never_returned() {
        let provider = Arc::new(ShortEmbedder(AtomicU32::new(0)));
        let embedder = RetryingEmbedder::new(provider.clone(), policy(3));

        let err = embedder.embed_batch(&texts()).await.unwrap_err();
        assert!(matches!(err, DocQaError::EmbeddingUnavailable { .. }));
        assert_eq!(provider.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inputs_are_split_into_batches() {
        let provider = FlakyEmbedder::new(0, rate_limited);
        let embedder = RetryingEmbedder::new(provider.clone(), policy(1)).with_batch_size(2);

        let inputs: Vec<String> = (0..5).map(|i| "x".repeat(i + 1)).collect();
        let vectors = embedder.embed_batch(&inputs).await.unwrap();

        assert_eq!(provider.calls(), 3);
        let firsts: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
