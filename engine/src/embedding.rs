//! Embedding client
//!
//! Content-only text -> vector conversion behind the [`EmbeddingProvider`]
//! trait. The [`Embedder`] wrapper owns the policy: provider-limit
//! batching, an in-process cache keyed by content hash, retry with
//! jittered exponential backoff for transient failures, and the optional
//! hybrid combination of content, summary, and file context.

use crate::backoff::{Backoff, Transient};
use crate::cancel::CancelToken;
use moka::sync::Cache;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Provider batch limit (inputs per request)
pub const DEFAULT_BATCH_SIZE: usize = 96;

/// Entries kept in the embedding cache
const CACHE_CAPACITY: u64 = 16_384;

/// Embedding errors
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("empty input is not embeddable")]
    EmptyInput,

    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("provider returned {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("cancelled")]
    Cancelled,
}

impl Transient for EmbeddingError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Request(_))
    }
}

/// The opaque embedding service: text -> vector[D]
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed output width, asserted against configuration at startup
    fn dimension(&self) -> usize;

    /// Embed a batch of non-empty texts, one vector per input
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// REST provider speaking the common `/embeddings` wire shape
pub struct HttpEmbeddingProvider {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        })
    }
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            // 429 and 5xx are retryable; other 4xx are permanent
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(EmbeddingError::Request(format!("{status}: {message}")));
            }
            return Err(EmbeddingError::Rejected { status: status.as_u16(), message });
        }

        let parsed: EmbeddingResponse =
            response.json().map_err(|e| EmbeddingError::Request(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Weights for hybrid embedding (content / summary / file context)
#[derive(Debug, Clone, Copy)]
pub struct HybridWeights {
    pub content: f32,
    pub summary: f32,
    pub context: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self { content: 0.5, summary: 0.3, context: 0.2 }
    }
}

/// Batched, cached, retrying embedding front-end
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Cache<[u8; 32], Arc<Vec<f32>>>,
    backoff: Backoff,
    batch_size: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            cache: Cache::new(CACHE_CAPACITY),
            backoff: Backoff::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Embed one text
    pub fn embed(&self, text: &str, cancel: &CancelToken) -> Result<Vec<f32>, EmbeddingError> {
        let vectors = self.embed_batch(std::slice::from_ref(&text), cancel)?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Request("provider returned no vectors".to_owned()))
    }

    /// Embed many texts, preserving input order.
    ///
    /// Empty or whitespace-only inputs are rejected outright; callers
    /// skip such chunks before reaching here.
    pub fn embed_batch<T: AsRef<str>>(
        &self,
        texts: &[T],
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.as_ref().trim().is_empty()) {
            return Err(EmbeddingError::EmptyInput);
        }

        let keys: Vec<[u8; 32]> =
            texts.iter().map(|t| Sha256::digest(t.as_ref().as_bytes()).into()).collect();

        let mut results: Vec<Option<Arc<Vec<f32>>>> =
            keys.iter().map(|k| self.cache.get(k)).collect();

        let misses: Vec<usize> =
            results.iter().enumerate().filter(|(_, r)| r.is_none()).map(|(i, _)| i).collect();

        for window in misses.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                return Err(EmbeddingError::Cancelled);
            }

            let batch: Vec<&str> = window.iter().map(|&i| texts[i].as_ref()).collect();
            let vectors = self.backoff.retry(cancel, || self.provider.embed_batch(&batch))?;

            if vectors.len() != batch.len() {
                return Err(EmbeddingError::Request(format!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (&index, vector) in window.iter().zip(vectors) {
                if vector.len() != self.provider.dimension() {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.provider.dimension(),
                        got: vector.len(),
                    });
                }
                let vector = Arc::new(vector);
                self.cache.insert(keys[index], Arc::clone(&vector));
                results[index] = Some(vector);
            }
        }

        Ok(results
            .into_iter()
            .map(|r| r.map(|v| v.as_ref().clone()).unwrap_or_default())
            .collect())
    }

    /// Hybrid embedding: weighted combination of the chunk content, its
    /// one-line summary, and a file-level context summary.
    pub fn embed_hybrid(
        &self,
        content: &str,
        summary: &str,
        file_context: Option<&str>,
        weights: HybridWeights,
        cancel: &CancelToken,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let mut texts: Vec<&str> = Vec::with_capacity(3);
        let mut factors: Vec<f32> = Vec::with_capacity(3);

        if !content.trim().is_empty() {
            texts.push(content);
            factors.push(weights.content);
        }
        if !summary.trim().is_empty() {
            texts.push(summary);
            factors.push(weights.summary);
        }
        if let Some(context) = file_context.filter(|c| !c.trim().is_empty()) {
            texts.push(context);
            factors.push(weights.context);
        }

        if texts.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let vectors = self.embed_batch(&texts, cancel)?;
        let total: f32 = factors.iter().sum();
        let mut combined = vec![0.0f32; self.provider.dimension()];
        for (vector, factor) in vectors.iter().zip(&factors) {
            for (acc, value) in combined.iter_mut().zip(vector) {
                *acc += value * (factor / total);
            }
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic provider counting calls; vector = [len, calls, 0...]
    struct StubProvider {
        calls: AtomicUsize,
        fail_first: AtomicUsize,
    }

    impl StubProvider {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), fail_first: AtomicUsize::new(0) }
        }

        fn failing(times: usize) -> Self {
            Self { calls: AtomicUsize::new(0), fail_first: AtomicUsize::new(times) }
        }
    }

    impl EmbeddingProvider for StubProvider {
        fn dimension(&self) -> usize {
            4
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(EmbeddingError::Request("503".to_owned()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0, 0.0, 0.0]).collect())
        }
    }

    fn fast_backoff() -> Backoff {
        Backoff {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        let embedder = Embedder::new(Arc::new(StubProvider::new()));
        let result = embedder.embed("   ", &CancelToken::new());
        assert!(matches!(result, Err(EmbeddingError::EmptyInput)));
    }

    #[test]
    fn test_cache_avoids_second_call() {
        let provider = Arc::new(StubProvider::new());
        let embedder = Embedder::new(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>);
        let cancel = CancelToken::new();

        embedder.embed("hello", &cancel).unwrap();
        embedder.embed("hello", &cancel).unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_batching_respects_limit() {
        let provider = Arc::new(StubProvider::new());
        let embedder = Embedder::new(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>)
            .with_batch_size(2);
        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();

        let vectors = embedder.embed_batch(&texts, &CancelToken::new()).unwrap();
        assert_eq!(vectors.len(), 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_transient_failures_retried() {
        let provider = Arc::new(StubProvider::failing(2));
        let embedder = Embedder::new(Arc::clone(&provider) as Arc<dyn EmbeddingProvider>)
            .with_backoff(fast_backoff());

        let vector = embedder.embed("retry me", &CancelToken::new()).unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancelled_before_request() {
        let embedder = Embedder::new(Arc::new(StubProvider::new()));
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = embedder.embed("text", &cancel);
        assert!(matches!(result, Err(EmbeddingError::Cancelled)));
    }

    #[test]
    fn test_hybrid_combination() {
        let embedder = Embedder::new(Arc::new(StubProvider::new()));
        let combined = embedder
            .embed_hybrid("abcd", "ab", None, HybridWeights::default(), &CancelToken::new())
            .unwrap();
        // content weight 0.5, summary 0.3 over total 0.8
        let expected = 4.0 * (0.5 / 0.8) + 2.0 * (0.3 / 0.8);
        assert!((combined[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_order_preserved() {
        let embedder = Embedder::new(Arc::new(StubProvider::new()));
        let texts = vec!["a".to_owned(), "ccc".to_owned(), "bb".to_owned()];
        let vectors = embedder.embed_batch(&texts, &CancelToken::new()).unwrap();
        assert_eq!(vectors[0][0], 1.0);
        assert_eq!(vectors[1][0], 3.0);
        assert_eq!(vectors[2][0], 2.0);
    }
}
