//! Content-hash-keyed embedding cache with a TTL and an LRU capacity bound
//!
//! Grounded on `caliber-llm::EmbeddingCache` (`RwLock<HashMap<[u8;32], _>>`),
//! extended with TTL expiry and least-recently-used eviction: cached by
//! content hash with a default TTL of one hour and an LRU bound of 10,000
//! entries.

use mnemo_core::{compute_content_hash, ContentHash, EmbeddingVector};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct Entry {
    vector: EmbeddingVector,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<ContentHash, Entry>,
    /// Most-recently-used hash is at the back.
    order: VecDeque<ContentHash>,
}

/// Bounded, TTL-expiring cache from `embed(text)` content hash to vector.
pub struct EmbeddingCache {
    inner: RwLock<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn key_for(text: &str) -> ContentHash {
        compute_content_hash(text.as_bytes())
    }

    /// Returns the cached vector unless it is missing or has expired.
    pub fn get(&self, key: &ContentHash) -> Option<EmbeddingVector> {
        let mut inner = self.inner.write().ok()?;
        let expired = inner
            .entries
            .get(key)
            .map(|e| e.inserted_at.elapsed() > self.ttl)
            .unwrap_or(false);

        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }

        let vector = inner.entries.get(key).map(|e| e.vector.clone())?;
        inner.order.retain(|k| k != key);
        inner.order.push_back(*key);
        Some(vector)
    }

    pub fn insert(&self, key: ContentHash, vector: EmbeddingVector) {
        let Ok(mut inner) = self.inner.write() else { return };

        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        } else if inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }

        inner.order.push_back(key);
        inner.entries.insert(
            key,
            Entry {
                vector,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
