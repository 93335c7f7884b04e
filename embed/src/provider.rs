//! Embedding provider trait and the HTTP-backed default implementation

use async_trait::async_trait;
use mnemo_core::{EmbeddingError, EmbeddingVector, RuntimeError, RuntimeResult};

/// A backend capable of turning text into an embedding vector.
/// Implementations must be thread-safe; calls may suspend on network I/O.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> RuntimeResult<EmbeddingVector>;

    /// Default batch implementation calls `embed` sequentially, preserving
    /// input order. Providers with a native batch endpoint should override
    /// this.
    async fn embed_batch(&self, texts: &[&str]) -> RuntimeResult<Vec<EmbeddingVector>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;
    fn model_id(&self) -> &str;
}

/// Calls an external embedding backend over HTTP. The wire contract is
/// `POST {endpoint} {"input": text} -> {"embedding": [f32; dim]}`.
pub struct HttpEmbeddingProvider {
    endpoint: String,
    client: reqwest::Client,
    dimensions: usize,
    model_id: String,
}

impl HttpEmbeddingProvider {
    pub fn new(endpoint: impl Into<String>, dimensions: usize, model_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            dimensions,
            model_id: model_id.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct EmbedHttpRequest<'a> {
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedHttpResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> RuntimeResult<EmbeddingVector> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedHttpRequest { input: text })
            .send()
            .await
            .map_err(|e| {
                RuntimeError::Embedding(EmbeddingError::Unavailable { reason: e.to_string() })
            })?
            .error_for_status()
            .map_err(|e| {
                RuntimeError::Embedding(EmbeddingError::Unavailable { reason: e.to_string() })
            })?
            .json::<EmbedHttpResponse>()
            .await
            .map_err(|e| {
                RuntimeError::Embedding(EmbeddingError::InvalidVector { reason: e.to_string() })
            })?;

        if response.embedding.len() != self.dimensions {
            return Err(RuntimeError::Embedding(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                got: response.embedding.len(),
            }));
        }

        let mut vector = EmbeddingVector::new(response.embedding, self.model_id.clone());
        vector.normalize();
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;

    /// Deterministic in-process provider for tests: same byte-sum scheme as
    /// the degraded fallback, but reported as a healthy (non-degraded)
    /// model so tests can exercise the happy path.
    #[derive(Debug, Clone)]
    pub struct StubEmbeddingProvider {
        pub dimensions: usize,
        pub model_id: String,
        pub fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbeddingProvider {
        async fn embed(&self, text: &str) -> RuntimeResult<EmbeddingVector> {
            if self.fail {
                return Err(RuntimeError::Embedding(EmbeddingError::Unavailable {
                    reason: "stub configured to fail".into(),
                }));
            }
            let mut data = vec![0.0f32; self.dimensions];
            for (i, byte) in text.bytes().enumerate() {
                data[i % self.dimensions] += byte as f32 / 255.0;
            }
            let mut vector = EmbeddingVector::new(data, self.model_id.clone());
            vector.normalize();
            Ok(vector)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn model_id(&self) -> &str {
            &self.model_id
        }
    }
}
