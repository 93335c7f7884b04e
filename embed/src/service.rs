//! Embedding/similarity service

use crate::cache::EmbeddingCache;
use crate::degraded::degraded_embed;
use crate::provider::EmbeddingProvider;
use mnemo_core::{EmbeddingConfig, EmbeddingVector, RuntimeResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Batches larger than this are rejected; callers must chunk themselves.
pub const MAX_BATCH_SIZE: usize = 32;

/// Wraps an [`EmbeddingProvider`] with caching and a degrade-on-failure
/// policy: a failed call is retried once, and a second failure falls back
/// to a deterministic hash-based embedding rather than propagating the
/// error.
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    dimensions: usize,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            dimensions: provider.dimensions(),
            cache: EmbeddingCache::new(config.cache_capacity, Duration::from_secs(config.cache_ttl_seconds)),
            provider,
        }
    }

    /// `embed(text) -> vector`. Idempotent for identical input, L2-normalized,
    /// cached by content hash.
    pub async fn embed(&self, text: &str) -> RuntimeResult<EmbeddingVector> {
        let key = EmbeddingCache::key_for(text);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let vector = self.embed_with_retry(text).await;
        self.cache.insert(key, vector.clone());
        Ok(vector)
    }

    /// `embed_batch(texts) -> vectors`. Order-preserving; batches above
    /// [`MAX_BATCH_SIZE`] are rejected.
    pub async fn embed_batch(&self, texts: &[&str]) -> RuntimeResult<Vec<EmbeddingVector>> {
        if texts.len() > MAX_BATCH_SIZE {
            return Err(mnemo_core::RuntimeError::Embedding(
                mnemo_core::EmbeddingError::InvalidVector {
                    reason: format!("batch of {} exceeds the {}-item limit", texts.len(), MAX_BATCH_SIZE),
                },
            ));
        }

        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// `similarity(u, v) -> real`. Dot product of two unit vectors.
    pub fn similarity(&self, a: &EmbeddingVector, b: &EmbeddingVector) -> RuntimeResult<f32> {
        a.cosine_similarity(b)
    }

    async fn embed_with_retry(&self, text: &str) -> EmbeddingVector {
        match self.provider.embed(text).await {
            Ok(v) => return v,
            Err(e) => warn!(error = %e, "embedding provider call failed, retrying"),
        }

        match self.provider.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "embedding provider failed twice, falling back to degraded embedding");
                degraded_embed(text, self.dimensions)
            }
        }
    }
}
