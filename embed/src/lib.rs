//! mnemo-embed - embedding and similarity service
//!
//! Converts text to fixed-dimension unit vectors and computes similarity
//! between them. Calls to an external backend are cached by content hash
//! and degrade to a deterministic hash-based embedding after one retry
//! failure rather than propagating the error to the kernel.

pub mod cache;
pub mod degraded;
pub mod provider;
pub mod service;

pub use cache::EmbeddingCache;
pub use degraded::{degraded_embed, DEGRADED_MODEL_ID};
pub use provider::{EmbeddingProvider, HttpEmbeddingProvider};
pub use service::{EmbeddingService, MAX_BATCH_SIZE};
