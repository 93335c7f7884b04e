//! Consolidation: periodic decay, removal, and duplicate-merging pass over
//! an owner's records.
//!
//! Fresh module (no CALIBER counterpart); grounded on the same
//! `PersistenceAdapter` the admission controller scans against.

use crate::adapter::PersistenceAdapter;
use mnemo_core::{AgentId, MemoryKind, MemoryRecord, RuntimeResult, Timestamp};
use serde::{Deserialize, Serialize};

/// A record is exempt from removal once its score reaches this floor or,
/// for procedural records, once it has been used this many times.
const PIN_SCORE: f32 = 0.8;
const PIN_USAGE_COUNT: u32 = 10;

/// Daily multiplicative decay applied to `confidence`/`importance`/
/// `success_rate`.
const DAILY_DECAY: f32 = 0.995;

const REMOVAL_SCORE_FLOOR: f32 = 0.2;
const REMOVAL_MIN_AGE_DAYS: i64 = 30;

const MERGE_SIMILARITY_MIN: f32 = 0.95;

/// Result of one consolidation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationSummary {
    pub scanned: usize,
    pub decayed: usize,
    pub merged: usize,
    pub removed: usize,
}

/// Runs one consolidation pass for the given owner scope. `owner` identifies
/// an agent-owned set of episodic/procedural records; pass `None` to
/// consolidate the global pool of ownerless (semantic/procedural) records.
pub async fn consolidate(
    adapter: &dyn PersistenceAdapter,
    owner: Option<AgentId>,
    now: Timestamp,
) -> RuntimeResult<ConsolidationSummary> {
    let mut summary = ConsolidationSummary::default();
    let records: Vec<MemoryRecord> = adapter
        .list_all()
        .await?
        .into_iter()
        .filter(|r| r.agent_id == owner)
        .collect();
    summary.scanned = records.len();

    // 1. Decay, 2. remove.
    for mut record in records.clone() {
        let days_since_update = (now - record.updated_at).num_days().max(0);
        if days_since_update > 0 {
            let decay = DAILY_DECAY.powi(days_since_update as i32);
            let decayed_score = record.payload.score() * decay;
            record.payload.set_score(decayed_score);
            summary.decayed += 1;

            if is_removal_candidate(&record, now) {
                adapter.delete(record.id).await?;
                summary.removed += 1;
                continue;
            }
            record.updated_at = now;
            adapter.update(record).await?;
        }
    }

    // 3. Merge near-duplicates of the same kind.
    summary.merged += merge_duplicates(adapter, owner, MemoryKind::Episodic).await?;
    summary.merged += merge_duplicates(adapter, owner, MemoryKind::Semantic).await?;
    summary.merged += merge_duplicates(adapter, owner, MemoryKind::Procedural).await?;

    Ok(summary)
}

fn is_pinned(record: &MemoryRecord) -> bool {
    if record.payload.score() >= PIN_SCORE {
        return true;
    }
    if let mnemo_core::MemoryPayload::Procedural(p) = &record.payload {
        if p.usage_count >= PIN_USAGE_COUNT {
            return true;
        }
    }
    false
}

fn is_removal_candidate(record: &MemoryRecord, now: Timestamp) -> bool {
    let age_days = (now - record.created_at).num_days();
    record.payload.score() < REMOVAL_SCORE_FLOOR
        && record.access_count == 0
        && age_days > REMOVAL_MIN_AGE_DAYS
        && !is_pinned(record)
}

async fn merge_duplicates(
    adapter: &dyn PersistenceAdapter,
    owner: Option<AgentId>,
    kind: MemoryKind,
) -> RuntimeResult<usize> {
    let mut records: Vec<MemoryRecord> = adapter
        .list_by_kind(kind)
        .await?
        .into_iter()
        .filter(|r| r.agent_id == owner)
        .collect();
    // Highest access_count first so the kept record in every pair is
    // always the survivor already processed.
    records.sort_by(|a, b| b.access_count.cmp(&a.access_count));

    let mut merged_away = std::collections::HashSet::new();
    let mut merge_count = 0;

    for i in 0..records.len() {
        if merged_away.contains(&records[i].id) {
            continue;
        }
        for j in (i + 1)..records.len() {
            if merged_away.contains(&records[j].id) {
                continue;
            }
            let (Some(a), Some(b)) = (&records[i].embedding, &records[j].embedding) else {
                continue;
            };
            let similarity = match a.cosine_similarity(b) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if similarity < MERGE_SIMILARITY_MIN {
                continue;
            }

            // `records[i]` has >= access_count by construction; it survives.
            // `update` bumps the version itself on success, so the value we
            // pass in must still match what's stored.
            let mut survivor = records[i].clone();
            survivor.metadata.extend(records[j].metadata.clone());
            adapter.update(survivor.clone()).await?;
            survivor.version += 1;
            records[i] = survivor;

            adapter.delete(records[j].id).await?;
            merged_away.insert(records[j].id);
            merge_count += 1;
        }
    }

    Ok(merge_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::EntityIdType;
    use crate::in_memory::InMemoryAdapter;
    use chrono::Duration as ChronoDuration;
    use mnemo_core::{EmbeddingVector, EpisodicPayload, MemoryId, MemoryPayload};
    use serde_json::Map;

    fn episodic(score: f32, access_count: u64, age_days: i64, now: Timestamp) -> MemoryRecord {
        let created_at = now - ChronoDuration::days(age_days);
        MemoryRecord {
            id: MemoryId::now_v7(),
            agent_id: None,
            payload: MemoryPayload::Episodic(EpisodicPayload {
                session_id: "s".into(),
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
            created_at,
            updated_at: created_at,
            access_count,
            last_accessed_at: None,
            metadata: Map::new(),
            version: 0,
            deleted: false,
        }
    }

    #[tokio::test]
    async fn stale_unaccessed_low_score_record_is_removed() {
        let adapter = InMemoryAdapter::new();
        let now = Timestamp::default();
        let record = episodic(0.1, 0, 40, now);
        let id = record.id;
        adapter.insert(record).await.unwrap();

        let summary = consolidate(&adapter, None, now).await.unwrap();
        assert_eq!(summary.removed, 1);
        assert!(adapter.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pinned_high_importance_record_survives_removal() {
        let adapter = InMemoryAdapter::new();
        let now = Timestamp::default();
        let record = episodic(0.9, 0, 40, now);
        let id = record.id;
        adapter.insert(record).await.unwrap();

        let summary = consolidate(&adapter, None, now).await.unwrap();
        assert_eq!(summary.removed, 0);
        assert!(adapter.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fresh_unaccessed_record_is_not_removed_before_its_age_threshold() {
        let adapter = InMemoryAdapter::new();
        let now = Timestamp::default();
        let record = episodic(0.1, 0, 5, now);
        let id = record.id;
        adapter.insert(record).await.unwrap();

        let summary = consolidate(&adapter, None, now).await.unwrap();
        assert_eq!(summary.removed, 0);
        assert!(adapter.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn near_duplicate_records_are_merged_keeping_the_more_accessed_one() {
        let adapter = InMemoryAdapter::new();
        let now = Timestamp::default();
        let mut kept = episodic(0.5, 10, 5, now);
        kept.embedding = Some({
            let mut v = EmbeddingVector::new(vec![1.0, 0.0], "m");
            v.normalize();
            v
        });
        let mut dup = episodic(0.5, 1, 5, now);
        dup.embedding = Some({
            let mut v = EmbeddingVector::new(vec![0.999, 0.001], "m");
            v.normalize();
            v
        });
        let kept_id = kept.id;
        let dup_id = dup.id;
        adapter.insert(kept).await.unwrap();
        adapter.insert(dup).await.unwrap();

        let summary = consolidate(&adapter, None, now).await.unwrap();
        assert_eq!(summary.merged, 1);
        assert!(adapter.get(kept_id).await.unwrap().is_some());
        assert!(adapter.get(dup_id).await.unwrap().is_none());
    }

    use proptest::prelude::*;

    proptest! {
        /// P7: consolidation preserves every record pinned by the I3 rule
        /// (score >= PIN_SCORE), regardless of how stale or unaccessed it
        /// otherwise looks.
        #[test]
        fn consolidate_preserves_every_pinned_record(score in PIN_SCORE..=1.0f32, age_days in 31i64..200) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let adapter = InMemoryAdapter::new();
                let now = Timestamp::default();
                let record = episodic(score, 0, age_days, now);
                let id = record.id;
                adapter.insert(record).await.unwrap();

                consolidate(&adapter, None, now).await.unwrap();
                prop_assert!(adapter.get(id).await.unwrap().is_some());
                Ok(())
            });
            result?;
        }
    }
}
