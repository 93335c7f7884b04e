//! Admission controller: the anti-overfitting gate a proposed `store()` must
//! pass before its record is persisted.
//!
//! Grounded on the same `PersistenceAdapter::list_by_kind` scan `InMemoryAdapter`
//! exposes; this is a fresh module, since CALIBER's storage crate has no
//! admission-control counterpart (it exists to keep a memory store's
//! signal-to-noise ratio bounded, not to replicate a trajectory/scope
//! schema).

use crate::adapter::PersistenceAdapter;
use mnemo_core::{AdmissionRejection, EmbeddingVector, MemoryConfig, MemoryKind, MemoryPayload};

/// Nearest-neighbor window used by the novelty signal.
const NOVELTY_TOP_K: usize = 5;

/// Everything the admission controller needs to judge a proposed store,
/// already-resolved so the controller itself stays pure and synchronous.
pub struct AdmissionCandidate<'a> {
    pub kind: MemoryKind,
    pub agent_id: Option<mnemo_core::AgentId>,
    pub domain: &'a str,
    pub score: f32,
    pub embedding: &'a EmbeddingVector,
}

/// Runs the three admission signals described in the memory subsystem's
/// anti-overfitting section and returns the first rejection reason
/// encountered, or `None` if the candidate is admitted.
pub async fn check_admission(
    adapter: &dyn PersistenceAdapter,
    candidate: &AdmissionCandidate<'_>,
    config: &MemoryConfig,
) -> mnemo_core::RuntimeResult<Option<AdmissionRejection>> {
    let existing = adapter.list_by_kind(candidate.kind).await?;

    // 1. Novelty: 1 - max cosine similarity against the top-5 nearest
    // existing records of the same kind.
    let mut similarities: Vec<f32> = existing
        .iter()
        .filter_map(|r| r.embedding.as_ref())
        .filter_map(|e| e.cosine_similarity(candidate.embedding).ok())
        .collect();
    similarities.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let max_similarity = similarities.into_iter().take(NOVELTY_TOP_K).fold(f32::MIN, f32::max);
    let max_similarity = if max_similarity == f32::MIN { 0.0 } else { max_similarity };
    let novelty = 1.0 - max_similarity;

    if novelty < config.admission_novelty_min {
        return Ok(Some(AdmissionRejection::TooSimilar));
    }

    // 2. Domain saturation: fraction of this owner's records (or all
    // records, for ownerless semantic/procedural memories) already in the
    // same domain.
    let owner_records: Vec<_> = existing
        .iter()
        .filter(|r| r.agent_id == candidate.agent_id)
        .collect();
    if !owner_records.is_empty() {
        let same_domain = owner_records
            .iter()
            .filter(|r| domain_of(&r.payload) == candidate.domain)
            .count();
        let saturation = same_domain as f32 / owner_records.len() as f32;
        if saturation > config.admission_domain_saturation && novelty < 0.40 {
            return Ok(Some(AdmissionRejection::DomainSaturated));
        }
    }

    // 3. Confidence/importance floor.
    if candidate.score < config.admission_score_floor {
        return Ok(Some(AdmissionRejection::BelowFloor));
    }

    Ok(None)
}

fn domain_of(payload: &MemoryPayload) -> &str {
    payload.domain()
}
