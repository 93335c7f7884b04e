//! The persistence adapter trait (durable storage of memories and
//! cognitions, vector-index-aware retrieval).
//!
//! Grounded on `caliber-storage::AsyncStorageTrait`'s per-entity async CRUD
//! plus `vector_search`/`vector_store`/`health_check`/`get_statistics` shape,
//! generalized from CALIBER's trajectory/scope/artifact/note/turn schema to
//! the two entities this runtime persists: memory records and cognition
//! records.

use async_trait::async_trait;
use mnemo_core::{CognitionId, CognitionRecord, MemoryId, MemoryKind, MemoryRecord, RuntimeResult};

/// Aggregate counts returned by `stats()` (one counter per memory kind, plus
/// totals and the most recent write per agent).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageStatistics {
    pub episodic_count: u64,
    pub semantic_count: u64,
    pub procedural_count: u64,
    pub total_count: u64,
    pub cognition_count: u64,
}

/// Durable storage of memory and cognition records, with vector-similarity
/// retrieval. All writes within one call are transactional; a failing write
/// must not leave a partially-applied record visible to other callers.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Insert a new record. The caller assigns `id`/`version`; the adapter
    /// rejects an insert whose id already exists.
    async fn insert(&self, record: MemoryRecord) -> RuntimeResult<()>;

    async fn get(&self, id: MemoryId) -> RuntimeResult<Option<MemoryRecord>>;

    /// Replace the stored record with `record`, enforcing optimistic
    /// concurrency: the call fails with `StorageError::Conflict` unless
    /// `record.version` matches the currently stored version, and bumps the
    /// version on success.
    async fn update(&self, record: MemoryRecord) -> RuntimeResult<()>;

    /// Soft-delete: the record stops being visible to `retrieve`/`get` but
    /// is retained for consolidation to physically remove later.
    async fn delete(&self, id: MemoryId) -> RuntimeResult<()>;

    /// All non-deleted records, for retrieval-layer filtering and for
    /// consolidation's owner-scope scan.
    async fn list_all(&self) -> RuntimeResult<Vec<MemoryRecord>>;

    async fn list_by_kind(&self, kind: MemoryKind) -> RuntimeResult<Vec<MemoryRecord>>;

    /// Ordered by ascending cosine distance (descending similarity) against
    /// `query`, restricted to `kind` when given. Degraded records (flagged
    /// by their embedding's `degraded` bit) are excluded unless
    /// `include_degraded` is set.
    async fn vector_search(
        &self,
        query: &[f32],
        kind: Option<MemoryKind>,
        limit: usize,
        include_degraded: bool,
    ) -> RuntimeResult<Vec<(MemoryId, f32)>>;

    async fn insert_cognition(&self, record: CognitionRecord) -> RuntimeResult<()>;

    async fn get_cognition(&self, id: CognitionId) -> RuntimeResult<Option<CognitionRecord>>;

    async fn health_check(&self) -> RuntimeResult<bool>;

    async fn get_statistics(&self) -> RuntimeResult<StorageStatistics>;
}
