//! Embedding vector operations

use crate::error::{EmbeddingError, RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};

/// Embedding vector with dynamic dimensions.
/// Supports any embedding model dimension (default 384, per configuration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    /// The embedding data as a vector of f32 values, L2-normalized.
    pub data: Vec<f32>,
    /// Identifier of the model that produced this embedding.
    pub model_id: String,
    /// Number of dimensions (must match `data.len()`).
    pub dimensions: usize,
    /// Set when the embedding service fell back to the deterministic
    /// hash-based embedding after a retry failure.
    /// Retrieval excludes degraded records unless the caller opts in.
    pub degraded: bool,
}

impl EmbeddingVector {
    /// Create a new, non-degraded embedding vector.
    pub fn new(data: Vec<f32>, model_id: impl Into<String>) -> Self {
        let dimensions = data.len();
        Self {
            data,
            model_id: model_id.into(),
            dimensions,
            degraded: false,
        }
    }

    pub fn degraded(data: Vec<f32>, model_id: impl Into<String>) -> Self {
        let mut v = Self::new(data, model_id);
        v.degraded = true;
        v
    }

    /// L2-normalize in place. A zero vector is left unchanged.
    pub fn normalize(&mut self) {
        let norm: f32 = self.data.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in self.data.iter_mut() {
                *x /= norm;
            }
        }
    }

    /// Compute cosine similarity between two embedding vectors (dot product
    /// of two unit vectors, range [-1, 1]).
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> RuntimeResult<f32> {
        if self.dimensions != other.dimensions {
            return Err(RuntimeError::Embedding(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                got: other.dimensions,
            }));
        }

        let mut dot_product = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.data.iter().zip(other.data.iter()) {
            dot_product += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let norm_a = norm_a.sqrt();
        let norm_b = norm_b.sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return Ok(0.0);
        }

        Ok(dot_product / (norm_a * norm_b))
    }

    /// True iff the declared dimension count matches the data length and
    /// the vector is normalized to within ±1e-6 (I2).
    pub fn is_valid(&self) -> bool {
        if self.dimensions == 0 || self.data.len() != self.dimensions {
            return false;
        }
        let norm: f32 = self.data.iter().map(|x| x * x).sum::<f32>().sqrt();
        (norm - 1.0).abs() < 1e-6
    }
}
