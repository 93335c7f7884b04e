//! Default in-process persistence adapter.
//!
//! Grounded on `caliber-storage::MockStorage`'s `Arc<RwLock<HashMap<Uuid,
//! T>>>`-per-entity structure, generalized to one map of memory records and
//! one of cognition records. Since the only store this runtime ships with
//! keeps everything in memory already, its vector index degenerates to an
//! exact linear scan over the live record set on every query; that scan is
//! the "approximate-nearest-neighbor index... rebuilt on startup" the
//! persistence layer is required to maintain when the backing store has no
//! native one.

use crate::adapter::{PersistenceAdapter, StorageStatistics};
use async_trait::async_trait;
use mnemo_core::{
    CognitionId, CognitionRecord, MemoryId, MemoryKind, MemoryRecord, RuntimeError, RuntimeResult,
    StorageError,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory `PersistenceAdapter`. Process-lifetime only; nothing survives a
/// restart. This is the default adapter wired up by the server binary.
#[derive(Default)]
pub struct InMemoryAdapter {
    memories: RwLock<HashMap<MemoryId, MemoryRecord>>,
    cognitions: RwLock<HashMap<CognitionId, CognitionRecord>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryAdapter {
    async fn insert(&self, record: MemoryRecord) -> RuntimeResult<()> {
        let mut memories = self.memories.write().unwrap();
        if memories.contains_key(&record.id) {
            return Err(RuntimeError::Storage(StorageError::InvalidRecord {
                reason: format!("memory {} already exists", record.id),
            }));
        }
        memories.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: MemoryId) -> RuntimeResult<Option<MemoryRecord>> {
        let memories = self.memories.read().unwrap();
        Ok(memories.get(&id).filter(|r| !r.deleted).cloned())
    }

    async fn update(&self, record: MemoryRecord) -> RuntimeResult<()> {
        let mut memories = self.memories.write().unwrap();
        let existing = memories
            .get(&record.id)
            .ok_or(RuntimeError::Storage(StorageError::NotFound { id: record.id }))?;

        if existing.version != record.version {
            return Err(RuntimeError::Storage(StorageError::Conflict {
                id: record.id,
                expected: record.version,
                actual: existing.version,
            }));
        }

        let mut next = record;
        next.version += 1;
        memories.insert(next.id, next);
        Ok(())
    }

    async fn delete(&self, id: MemoryId) -> RuntimeResult<()> {
        let mut memories = self.memories.write().unwrap();
        let record = memories
            .get_mut(&id)
            .ok_or(RuntimeError::Storage(StorageError::NotFound { id }))?;
        record.deleted = true;
        record.version += 1;
        Ok(())
    }

    async fn list_all(&self) -> RuntimeResult<Vec<MemoryRecord>> {
        let memories = self.memories.read().unwrap();
        Ok(memories.values().filter(|r| !r.deleted).cloned().collect())
    }

    async fn list_by_kind(&self, kind: MemoryKind) -> RuntimeResult<Vec<MemoryRecord>> {
        let memories = self.memories.read().unwrap();
        Ok(memories
            .values()
            .filter(|r| !r.deleted && r.kind() == kind)
            .cloned()
            .collect())
    }

    async fn vector_search(
        &self,
        query: &[f32],
        kind: Option<MemoryKind>,
        limit: usize,
        include_degraded: bool,
    ) -> RuntimeResult<Vec<(MemoryId, f32)>> {
        let memories = self.memories.read().unwrap();
        let mut scored: Vec<(MemoryId, f32)> = memories
            .values()
            .filter(|r| !r.deleted)
            .filter(|r| kind.map(|k| r.kind() == k).unwrap_or(true))
            .filter_map(|r| {
                let embedding = r.embedding.as_ref()?;
                if embedding.degraded && !include_degraded {
                    return None;
                }
                let mut query_vec = mnemo_core::EmbeddingVector::new(query.to_vec(), "query");
                query_vec.normalize();
                let score = embedding.cosine_similarity(&query_vec).ok()?;
                Some((r.id, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn insert_cognition(&self, record: CognitionRecord) -> RuntimeResult<()> {
        self.cognitions
            .write()
            .unwrap()
            .insert(record.cognition_id, record);
        Ok(())
    }

    async fn get_cognition(&self, id: CognitionId) -> RuntimeResult<Option<CognitionRecord>> {
        Ok(self.cognitions.read().unwrap().get(&id).cloned())
    }

    async fn health_check(&self) -> RuntimeResult<bool> {
        Ok(true)
    }

    async fn get_statistics(&self) -> RuntimeResult<StorageStatistics> {
        let memories = self.memories.read().unwrap();
        let live = memories.values().filter(|r| !r.deleted);
        let mut stats = StorageStatistics::default();
        for record in live {
            stats.total_count += 1;
            match record.kind() {
                MemoryKind::Episodic => stats.episodic_count += 1,
                MemoryKind::Semantic => stats.semantic_count += 1,
                MemoryKind::Procedural => stats.procedural_count += 1,
            }
        }
        stats.cognition_count = self.cognitions.read().unwrap().len() as u64;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::EntityIdType;
    use mnemo_core::{EmbeddingVector, EpisodicPayload, MemoryPayload, Timestamp};
    use serde_json::Map;

    fn record(score: f32) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId::now_v7(),
            agent_id: None,
            payload: MemoryPayload::Episodic(EpisodicPayload {
                session_id: "s1".into(),
                context: Map::new(),
                emotion: None,
                outcome: None,
                importance: score,
            }),
            embedding: Some({
                let mut v = EmbeddingVector::new(vec![1.0, 0.0], "m");
                v.normalize();
                v
            }),
            created_at: Timestamp::default(),
            updated_at: Timestamp::default(),
            access_count: 0,
            last_accessed_at: None,
            metadata: Map::new(),
            version: 0,
            deleted: false,
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let adapter = InMemoryAdapter::new();
        let r = record(0.5);
        let id = r.id;
        adapter.insert(r).await.unwrap();
        let got = adapter.get(id).await.unwrap().unwrap();
        assert_eq!(got.id, id);
    }

    #[tokio::test]
    async fn update_with_stale_version_conflicts() {
        let adapter = InMemoryAdapter::new();
        let r = record(0.5);
        let id = r.id;
        adapter.insert(r.clone()).await.unwrap();
        adapter.update(r.clone()).await.unwrap(); // version bumps to 1

        let err = adapter.update(r).await.unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Storage(StorageError::Conflict { id: conflict_id, .. }) if conflict_id == id
        ));
    }

    #[tokio::test]
    async fn delete_hides_record_from_get_and_list() {
        let adapter = InMemoryAdapter::new();
        let r = record(0.5);
        let id = r.id;
        adapter.insert(r).await.unwrap();
        adapter.delete(id).await.unwrap();
        assert!(adapter.get(id).await.unwrap().is_none());
        assert!(adapter.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vector_search_orders_by_descending_similarity() {
        let adapter = InMemoryAdapter::new();
        let mut close = record(0.5);
        close.embedding = Some({
            let mut v = EmbeddingVector::new(vec![0.9, 0.1], "m");
            v.normalize();
            v
        });
        let mut far = record(0.5);
        far.embedding = Some({
            let mut v = EmbeddingVector::new(vec![0.0, 1.0], "m");
            v.normalize();
            v
        });
        let close_id = close.id;
        adapter.insert(close).await.unwrap();
        adapter.insert(far).await.unwrap();

        let hits = adapter
            .vector_search(&[1.0, 0.0], None, 10, false)
            .await
            .unwrap();
        assert_eq!(hits[0].0, close_id);
    }

    #[tokio::test]
    async fn vector_search_excludes_degraded_by_default() {
        let adapter = InMemoryAdapter::new();
        let mut degraded = record(0.5);
        degraded.embedding = Some(EmbeddingVector::degraded(vec![1.0, 0.0], "hash"));
        adapter.insert(degraded).await.unwrap();

        let hits = adapter.vector_search(&[1.0, 0.0], None, 10, false).await.unwrap();
        assert!(hits.is_empty());

        let hits = adapter.vector_search(&[1.0, 0.0], None, 10, true).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn statistics_count_records_by_kind() {
        let adapter = InMemoryAdapter::new();
        adapter.insert(record(0.5)).await.unwrap();
        adapter.insert(record(0.5)).await.unwrap();
        let stats = adapter.get_statistics().await.unwrap();
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.episodic_count, 2);
    }

    use proptest::prelude::*;

    proptest! {
        /// P1/L2: for any stored importance score, `get` after `insert`
        /// returns a record whose content fields equal what was stored,
        /// modulo the server-assigned id/timestamps/access_count.
        #[test]
        fn store_then_get_round_trips_content_fields(importance in 0.0f32..=1.0) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let adapter = InMemoryAdapter::new();
                let r = record(importance);
                let id = r.id;
                adapter.insert(r).await.unwrap();
                let got = adapter.get(id).await.unwrap().unwrap();
                prop_assert_eq!(got.id, id);
                prop_assert_eq!(got.payload.score(), importance);
                prop_assert_eq!(got.access_count, 0);
                Ok(())
            });
            result?;
        }

        /// P2: a record's embedding, re-compared against itself, has cosine
        /// similarity >= 0.9999 regardless of which unit vector it holds.
        #[test]
        fn embedding_self_similarity_is_near_one(x in -1.0f32..=1.0f32, y in -1.0f32..=1.0f32) {
            prop_assume!(x.abs() > 1e-3 || y.abs() > 1e-3);
            let mut v = mnemo_core::EmbeddingVector::new(vec![x, y], "m");
            v.normalize();
            let sim = v.cosine_similarity(&v).unwrap();
            prop_assert!(sim >= 0.9999);
        }
    }
}
