//! Memory CRUD, similarity search, and consolidation.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use mnemo_core::identity::{AgentId, EntityIdType, MemoryId};
use mnemo_core::{MemoryKind, MemoryPayload, MemoryRecord, RuntimeConfig};
use mnemo_embed::EmbeddingService;
use mnemo_kernel::{QueryPlanner, RetrievalQuery};
use mnemo_storage::{check_admission, consolidate, AdmissionCandidate, PersistenceAdapter};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::state::AppState;
use crate::ws::{WsEvent, WsState};

#[derive(Debug, Deserialize)]
pub struct InsertMemoryRequest {
    pub agent_id: Option<AgentId>,
    pub payload: MemoryPayload,
    /// Text embedded to produce the record's similarity vector. Usually a
    /// rendering of the payload (concept+definition, procedure text, etc).
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct InsertMemoryResponse {
    pub id: MemoryId,
    pub rejected: Option<mnemo_core::AdmissionRejection>,
}

pub async fn insert_memory(
    State(storage): State<Arc<dyn PersistenceAdapter>>,
    State(embeddings): State<Arc<EmbeddingService>>,
    State(config): State<Arc<RuntimeConfig>>,
    State(ws): State<Arc<WsState>>,
    Json(req): Json<InsertMemoryRequest>,
) -> ApiResult<Json<InsertMemoryResponse>> {
    let kind = req.payload.kind();

    // Exact-key collision: a second store of the same (concept, domain) or
    // (skill_name, domain) always merges into the existing record rather
    // than going through admission, which only screens near-duplicates.
    if let Some(key) = req.payload.merge_key() {
        let existing = storage
            .list_by_kind(kind)
            .await?
            .into_iter()
            .find(|r| !r.deleted && r.agent_id == req.agent_id && r.payload.merge_key().as_ref() == Some(&key));

        if let Some(mut record) = existing {
            record.payload.merge_into(req.payload);
            record.embedding = Some(embeddings.embed(&req.content).await?);
            record.updated_at = chrono::Utc::now();
            let id = record.id;
            storage.update(record).await?;

            ws.broadcast(WsEvent::MemorySaved { id, kind: kind.to_string() });

            return Ok(Json(InsertMemoryResponse { id, rejected: None }));
        }
    }

    let embedding = embeddings.embed(&req.content).await?;
    let score = req.payload.score();
    let domain = req.payload.domain().to_string();

    let candidate = AdmissionCandidate {
        kind,
        agent_id: req.agent_id,
        domain: &domain,
        score,
        embedding: &embedding,
    };
    if let Some(rejection) = check_admission(storage.as_ref(), &candidate, &config.memory).await? {
        return Ok(Json(InsertMemoryResponse { id: MemoryId::nil(), rejected: Some(rejection) }));
    }

    let now = chrono::Utc::now();
    let record = MemoryRecord {
        id: MemoryId::now_v7(),
        agent_id: req.agent_id,
        payload: req.payload,
        embedding: Some(embedding),
        created_at: now,
        updated_at: now,
        access_count: 0,
        last_accessed_at: None,
        metadata: serde_json::Map::new(),
        version: 1,
        deleted: false,
    };
    let id = record.id;
    storage.insert(record).await?;

    ws.broadcast(WsEvent::MemorySaved { id, kind: kind.to_string() });

    Ok(Json(InsertMemoryResponse { id, rejected: None }))
}

pub async fn get_memory(
    State(storage): State<Arc<dyn PersistenceAdapter>>,
    Path(id): Path<MemoryId>,
) -> ApiResult<Json<MemoryRecord>> {
    let record = storage
        .get(id)
        .await?
        .filter(|r| !r.deleted)
        .ok_or_else(|| ApiError::new(ErrorCode::MemoryNotFound, format!("memory {} not found", id)))?;
    Ok(Json(record))
}

pub async fn delete_memory(
    State(storage): State<Arc<dyn PersistenceAdapter>>,
    State(ws): State<Arc<WsState>>,
    Path(id): Path<MemoryId>,
) -> ApiResult<axum::http::StatusCode> {
    storage.delete(id).await?;
    ws.broadcast(WsEvent::MemoryDeleted { id });
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SearchMemoriesQuery {
    pub text: Option<String>,
    pub kind: Option<MemoryKind>,
    pub agent_id: Option<AgentId>,
    pub domain: Option<String>,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub min_similarity: f32,
    #[serde(default)]
    pub mode: mnemo_core::RetrievalMode,
    #[serde(default)]
    pub include_degraded: bool,
}

fn default_k() -> usize {
    10
}

pub async fn search_memories(
    State(storage): State<Arc<dyn PersistenceAdapter>>,
    State(embeddings): State<Arc<EmbeddingService>>,
    Query(params): Query<SearchMemoriesQuery>,
) -> ApiResult<Json<Vec<mnemo_core::MemoryHit>>> {
    let query = RetrievalQuery {
        text: params.text,
        kinds: params.kind.map(|k| vec![k]),
        agent_id: params.agent_id,
        domain: params.domain,
        k: params.k,
        min_similarity: params.min_similarity,
        mode: params.mode,
        include_degraded: params.include_degraded,
    };
    let planner = QueryPlanner::new(storage.as_ref(), embeddings.as_ref());
    let hits = planner.retrieve(&query).await?;
    Ok(Json(hits))
}

#[derive(Debug, Deserialize)]
pub struct ConsolidateRequest {
    pub agent_id: Option<AgentId>,
}

pub async fn consolidate_memories(
    State(storage): State<Arc<dyn PersistenceAdapter>>,
    Json(req): Json<ConsolidateRequest>,
) -> ApiResult<Json<mnemo_storage::ConsolidationSummary>> {
    let summary = consolidate(storage.as_ref(), req.agent_id, chrono::Utc::now()).await?;
    Ok(Json(summary))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(insert_memory))
        .route("/search", get(search_memories))
        .route("/consolidate", post(consolidate_memories))
        .route("/{id}", get(get_memory).delete(delete_memory))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_defaults() {
        let json = serde_json::json!({});
        let q: SearchMemoriesQuery = serde_json::from_value(json).unwrap();
        assert_eq!(q.k, 10);
        assert_eq!(q.min_similarity, 0.0);
        assert!(!q.include_degraded);
    }
}
