//! Query planner: turns an intent into one or more retrieval stages against
//! the memory subsystem.
//!
//! Fresh module; there is no teacher counterpart to a similarity-ranked,
//! mode-selectable retrieval planner. Grounded on `mnemo_storage::PersistenceAdapter`
//! for the candidate scan and `mnemo_embed::EmbeddingService` for turning
//! query text into a comparable vector.

use mnemo_core::{
    AgentId, EmbeddingVector, KernelError, MemoryHit, MemoryKind, MemoryPayload, MemoryRecord,
    RetrievalMode, RuntimeError, RuntimeResult,
};
use mnemo_embed::EmbeddingService;
use mnemo_storage::PersistenceAdapter;
use serde_json::{Map, Value as Json};

/// Hits within this similarity gap of each other are tie-broken on
/// secondary criteria instead of ranked by similarity alone.
const TIE_EPSILON: f32 = 0.01;

/// `explore` mode's per-cluster sample size; `connect` mode's count of
/// top-ranked hits that receive a follow-up retrieval.
const EXPLORE_SAMPLE_PER_DOMAIN: usize = 3;
const CONNECT_TOP_M: usize = 3;

#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub text: Option<String>,
    pub kinds: Option<Vec<MemoryKind>>,
    pub agent_id: Option<AgentId>,
    pub domain: Option<String>,
    pub k: usize,
    pub min_similarity: f32,
    pub mode: RetrievalMode,
    pub include_degraded: bool,
}

impl Default for RetrievalQuery {
    fn default() -> Self {
        Self {
            text: None,
            kinds: None,
            agent_id: None,
            domain: None,
            k: 10,
            min_similarity: 0.0,
            mode: RetrievalMode::Standard,
            include_degraded: false,
        }
    }
}

pub struct QueryPlanner<'a> {
    adapter: &'a dyn PersistenceAdapter,
    embeddings: &'a EmbeddingService,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(adapter: &'a dyn PersistenceAdapter, embeddings: &'a EmbeddingService) -> Self {
        Self { adapter, embeddings }
    }

    pub async fn retrieve(&self, query: &RetrievalQuery) -> RuntimeResult<Vec<MemoryHit>> {
        if query.text.is_none() && query.kinds.is_none() && query.agent_id.is_none() && query.domain.is_none() {
            return Err(RuntimeError::Kernel(KernelError::EmptyQuery));
        }

        match query.mode {
            RetrievalMode::Standard => self.standard(query).await,
            RetrievalMode::Explore => self.explore(query).await,
            RetrievalMode::Connect => self.connect(query).await,
        }
    }

    async fn candidates(&self, query: &RetrievalQuery) -> RuntimeResult<Vec<MemoryRecord>> {
        let records = match &query.kinds {
            Some(kinds) => {
                let mut all = Vec::new();
                for kind in kinds {
                    all.extend(self.adapter.list_by_kind(*kind).await?);
                }
                all
            }
            None => self.adapter.list_all().await?,
        };

        Ok(records
            .into_iter()
            .filter(|r| query.agent_id.map(|a| r.agent_id == Some(a)).unwrap_or(true))
            .filter(|r| query.domain.as_deref().map(|d| r.payload.domain() == d).unwrap_or(true))
            .collect())
    }

    async fn scored_candidates(
        &self,
        records: Vec<MemoryRecord>,
        query_vec: &EmbeddingVector,
        min_similarity: f32,
        include_degraded: bool,
    ) -> Vec<(MemoryRecord, f32)> {
        let mut scored = Vec::new();
        for record in records {
            let Some(embedding) = &record.embedding else { continue };
            if embedding.degraded && !include_degraded {
                continue;
            }
            let Ok(score) = embedding.cosine_similarity(query_vec) else { continue };
            if score < min_similarity {
                continue;
            }
            scored.push((record, score));
        }
        scored.sort_by(tie_break);
        scored
    }

    async fn standard(&self, query: &RetrievalQuery) -> RuntimeResult<Vec<MemoryHit>> {
        let records = self.candidates(query).await?;
        let text = query.text.clone().unwrap_or_default();
        let query_vec = self.embeddings.embed(&text).await?;
        let mut scored = self
            .scored_candidates(records, &query_vec, query.min_similarity, query.include_degraded)
            .await;
        scored.truncate(query.k);
        Ok(scored.into_iter().map(|(r, s)| to_hit(&r, s)).collect())
    }

    async fn explore(&self, query: &RetrievalQuery) -> RuntimeResult<Vec<MemoryHit>> {
        let records = self.candidates(query).await?;
        let text = query.text.clone().unwrap_or_default();
        let query_vec = self.embeddings.embed(&text).await?;
        let scored = self
            .scored_candidates(records, &query_vec, query.min_similarity, query.include_degraded)
            .await;

        let mut by_domain: Vec<(String, Vec<(MemoryRecord, f32)>)> = Vec::new();
        for (record, score) in scored {
            let domain = record.payload.domain().to_string();
            match by_domain.iter_mut().find(|(d, _)| d == &domain) {
                Some((_, bucket)) => bucket.push((record, score)),
                None => by_domain.push((domain, vec![(record, score)])),
            }
        }

        let mut hits = Vec::new();
        for (_, bucket) in by_domain {
            for (record, score) in bucket.into_iter().take(EXPLORE_SAMPLE_PER_DOMAIN) {
                hits.push(to_hit(&record, score));
            }
        }
        Ok(hits)
    }

    async fn connect(&self, query: &RetrievalQuery) -> RuntimeResult<Vec<MemoryHit>> {
        let direct = self.standard(query).await?;
        let mut hits: Vec<MemoryHit> = direct
            .into_iter()
            .map(|h| tag_depth(h, 0))
            .collect();

        let intent = query.text.clone().unwrap_or_default();
        let mut follow_up_records = self.candidates(query).await?;
        follow_up_records.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));

        for hit in hits.clone().into_iter().take(CONNECT_TOP_M) {
            let seed = seed_keyword(&hit.content);
            let follow_up_text = format!("{} {}", seed, intent);
            let follow_up_vec = self.embeddings.embed(&follow_up_text).await?;
            let scored = self
                .scored_candidates(
                    follow_up_records.clone(),
                    &follow_up_vec,
                    query.min_similarity,
                    query.include_degraded,
                )
                .await;

            for (record, score) in scored.into_iter().take(query.k) {
                if hits.iter().any(|h| h.id == record.id) {
                    continue;
                }
                hits.push(tag_depth(to_hit(&record, score), 1));
            }
        }

        Ok(hits)
    }
}

fn tie_break(a: &(MemoryRecord, f32), b: &(MemoryRecord, f32)) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    use mnemo_core::EntityIdType;

    if (a.1 - b.1).abs() > TIE_EPSILON {
        return b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal);
    }
    let score_cmp = b.0.payload.score().partial_cmp(&a.0.payload.score()).unwrap_or(Ordering::Equal);
    if score_cmp != Ordering::Equal {
        return score_cmp;
    }
    let recency_cmp = b.0.updated_at.cmp(&a.0.updated_at);
    if recency_cmp != Ordering::Equal {
        return recency_cmp;
    }
    a.0.id.as_uuid().cmp(&b.0.id.as_uuid())
}

fn to_hit(record: &MemoryRecord, score: f32) -> MemoryHit {
    MemoryHit {
        id: record.id,
        kind: record.kind(),
        content: payload_to_json(&record.payload),
        score,
    }
}

fn payload_to_json(payload: &MemoryPayload) -> Json {
    serde_json::to_value(payload).unwrap_or(Json::Null)
}

fn tag_depth(mut hit: MemoryHit, depth: u32) -> MemoryHit {
    if let Json::Object(ref mut obj) = hit.content {
        obj.insert("_path_depth".into(), Json::from(depth));
    } else {
        let mut obj = Map::new();
        obj.insert("value".into(), hit.content.clone());
        obj.insert("_path_depth".into(), Json::from(depth));
        hit.content = Json::Object(obj);
    }
    hit
}

fn seed_keyword(content: &Json) -> String {
    content
        .get("concept")
        .or_else(|| content.get("skill_name"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
