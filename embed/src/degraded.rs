//! Deterministic hash-based fallback embedding
//!
//! Produced when the configured provider fails after one retry. Grounded
//! on `caliber-llm::MockEmbeddingProvider`'s byte-sum scheme, flagged
//! `degraded` so retrieval can exclude it by default.

use mnemo_core::EmbeddingVector;

pub const DEGRADED_MODEL_ID: &str = "degraded-hash-fallback";

/// Fold the UTF-8 bytes of `text` into a fixed-size vector and normalize.
/// Deterministic: identical input always produces identical output.
pub fn degraded_embed(text: &str, dimensions: usize) -> EmbeddingVector {
    let mut data = vec![0.0f32; dimensions.max(1)];
    for (i, byte) in text.bytes().enumerate() {
        let idx = i % data.len();
        data[idx] += (byte as f32) / 255.0;
    }
    let mut vector = EmbeddingVector::degraded(data, DEGRADED_MODEL_ID);
    vector.normalize();
    vector
}
