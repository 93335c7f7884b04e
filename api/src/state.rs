//! Shared application state for Axum routers.

use std::sync::Arc;

use mnemo_agents::AgentRegistry;
use mnemo_core::RuntimeConfig;
use mnemo_embed::EmbeddingService;
use mnemo_kernel::{CognitionLimiter, ToolRegistry};
use mnemo_storage::PersistenceAdapter;

use crate::ws::WsState;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn PersistenceAdapter>,
    pub embeddings: Arc<EmbeddingService>,
    pub tools: Arc<ToolRegistry>,
    pub agents: Arc<AgentRegistry>,
    pub config: Arc<RuntimeConfig>,
    pub ws: Arc<WsState>,
    pub limiter: Arc<CognitionLimiter>,
    pub start_time: std::time::Instant,
}

crate::impl_from_ref!(Arc<dyn PersistenceAdapter>, storage);
crate::impl_from_ref!(Arc<EmbeddingService>, embeddings);
crate::impl_from_ref!(Arc<ToolRegistry>, tools);
crate::impl_from_ref!(Arc<AgentRegistry>, agents);
crate::impl_from_ref!(Arc<RuntimeConfig>, config);
crate::impl_from_ref!(Arc<WsState>, ws);
crate::impl_from_ref!(Arc<CognitionLimiter>, limiter);
crate::impl_from_ref!(std::time::Instant, start_time);
