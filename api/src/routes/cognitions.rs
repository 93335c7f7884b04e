//! Cognition submission: parse IL source, evaluate it against the running
//! memory/tool/agent state, and record the outcome.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use mnemo_agents::AgentRegistry;
use mnemo_core::identity::{AgentId, CognitionId, EntityIdType};
use mnemo_core::{CognitionOutcome, CognitionRecord, RuntimeConfig};
use mnemo_embed::EmbeddingService;
use mnemo_kernel::{CognitionContext, CognitionLimiter, Evaluator, ToolRegistry};
use mnemo_storage::PersistenceAdapter;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::validation::ValidateNonEmpty;
use crate::ws::{WsEvent, WsState};

#[derive(Debug, Deserialize)]
pub struct SubmitCognitionRequest {
    pub agent_id: AgentId,
    pub source: String,
    /// Wall-clock budget in milliseconds. Clamped to
    /// `[1, kernel.cognition_timeout_max_ms]`; defaults to
    /// `kernel.cognition_timeout_ms`.
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CognitionResponse {
    pub cognition_id: CognitionId,
    pub outcome: CognitionOutcome,
    pub output: serde_json::Value,
    pub duration_ms: i64,
    pub error: Option<String>,
}

pub async fn submit_cognition(
    State(storage): State<Arc<dyn PersistenceAdapter>>,
    State(embeddings): State<Arc<EmbeddingService>>,
    State(tools): State<Arc<ToolRegistry>>,
    State(agents): State<Arc<AgentRegistry>>,
    State(config): State<Arc<RuntimeConfig>>,
    State(ws): State<Arc<WsState>>,
    State(limiter): State<Arc<CognitionLimiter>>,
    Json(req): Json<SubmitCognitionRequest>,
) -> ApiResult<Json<CognitionResponse>> {
    req.source.validate_non_empty("source")?;

    let program = mnemo_il::parse_program(&req.source)?;

    // Held for the rest of this function; released on drop regardless of
    // how evaluation ends, so a timed-out or erroring cognition still frees
    // its slot.
    let _permit = limiter.try_acquire(req.agent_id)?;

    if req.timeout_ms == Some(0) {
        return Err(ApiError::invalid_range("timeout_ms", 1, config.kernel.cognition_timeout_max_ms as i64));
    }
    let budget_ms = req
        .timeout_ms
        .unwrap_or(config.kernel.cognition_timeout_ms)
        .clamp(1, config.kernel.cognition_timeout_max_ms);
    let cognition_id = CognitionId::now_v7();
    let submitted_at = chrono::Utc::now();
    let started = std::time::Instant::now();

    let mut ctx = CognitionContext::new(cognition_id, req.agent_id, Duration::from_millis(budget_ms));
    let evaluator = Evaluator::new(storage.as_ref(), embeddings.as_ref(), tools.as_ref(), agents.as_ref());

    let result = evaluator.eval(&program.expr, &mut ctx).await;
    let duration_ms = started.elapsed().as_millis() as i64;

    let (outcome, output, error) = match result {
        Ok(value) => {
            let json = value.to_json();
            let is_clarify = matches!(&json, serde_json::Value::Object(m) if m.contains_key("question"));
            let outcome = if is_clarify { CognitionOutcome::Clarify } else { CognitionOutcome::Success };
            (outcome, json, None)
        }
        Err(e) => (CognitionOutcome::Error, serde_json::Value::Null, Some(e.to_string())),
    };

    let record = CognitionRecord {
        cognition_id,
        il_source: req.source,
        agent_id: req.agent_id,
        submitted_at,
        result: outcome.clone(),
        output: output.clone(),
        duration_ms,
        memories_read: 0,
        memories_written: 0,
        error: error.clone(),
    };
    storage.insert_cognition(record).await?;

    ws.broadcast(WsEvent::CognitionCompleted { cognition_id, outcome: outcome.clone() });

    Ok(Json(CognitionResponse { cognition_id, outcome, output, duration_ms, error }))
}

pub async fn get_cognition(
    State(storage): State<Arc<dyn PersistenceAdapter>>,
    axum::extract::Path(id): axum::extract::Path<CognitionId>,
) -> ApiResult<Json<CognitionRecord>> {
    let record = storage
        .get_cognition(id)
        .await?
        .ok_or_else(|| ApiError::new(crate::error::ErrorCode::CognitionNotFound, format!("cognition {} not found", id)))?;
    Ok(Json(record))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_cognition))
        .route("/{id}", axum::routing::get(get_cognition))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_cognition_request_deserializes() {
        let json = serde_json::json!({
            "agent_id": AgentId::nil().to_string(),
            "source": "(QUERY \"hello\")",
        });
        let req: SubmitCognitionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.source, "(QUERY \"hello\")");
        assert!(req.timeout_ms.is_none());
    }
}
