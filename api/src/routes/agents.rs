//! Agent registry and messaging endpoints.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use mnemo_agents::{AgentMessage, AgentRecord, AgentRegistry};
use mnemo_core::identity::{AgentId, MessageId};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::validation::ValidateNonEmpty;
use crate::ws::{WsEvent, WsState};

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub agent_id: AgentId,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

pub async fn register_agent(
    State(agents): State<Arc<AgentRegistry>>,
    State(ws): State<Arc<WsState>>,
    Json(req): Json<RegisterAgentRequest>,
) -> ApiResult<Json<AgentRecord>> {
    agents.register(req.agent_id, req.capabilities).await?;
    let record = agents.get(req.agent_id).await.expect("just registered");
    ws.broadcast(WsEvent::AgentRegistered { agent_id: req.agent_id });
    Ok(Json(record))
}

pub async fn deregister_agent(
    State(agents): State<Arc<AgentRegistry>>,
    State(ws): State<Arc<WsState>>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<axum::http::StatusCode> {
    agents.deregister(agent_id).await?;
    ws.broadcast(WsEvent::AgentDeregistered { agent_id });
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn list_agents(State(agents): State<Arc<AgentRegistry>>) -> Json<Vec<AgentRecord>> {
    Json(agents.list().await)
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub from: AgentId,
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: MessageId,
}

pub async fn send_message(
    State(agents): State<Arc<AgentRegistry>>,
    Path(to): Path<AgentId>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<SendMessageResponse>> {
    let message_id = agents.send_message(req.from, to, req.payload).await?;
    Ok(Json(SendMessageResponse { message_id }))
}

#[derive(Debug, Deserialize)]
pub struct ReceiveQuery {
    pub timeout_ms: Option<u64>,
}

pub async fn receive_message(
    State(agents): State<Arc<AgentRegistry>>,
    Path(agent_id): Path<AgentId>,
    Query(params): Query<ReceiveQuery>,
) -> ApiResult<Json<Option<AgentMessage>>> {
    let timeout = params.timeout_ms.map(Duration::from_millis);
    let message = agents.receive(agent_id, timeout).await?;
    Ok(Json(message))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_agents).post(register_agent))
        .route("/{id}", axum::routing::delete(deregister_agent))
        .route("/{id}/messages", post(send_message).get(receive_message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_defaults_capabilities() {
        use mnemo_core::identity::EntityIdType;
        let req: RegisterAgentRequest = serde_json::from_value(serde_json::json!({
            "agent_id": AgentId::nil().to_string(),
        }))
        .unwrap();
        assert!(req.capabilities.is_empty());
    }
}
