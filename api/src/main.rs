//! mnemo API server entry point.
//!
//! Bootstraps the runtime configuration, wires up storage/embedding/tool/
//! agent state, and starts the Axum HTTP+WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use mnemo_agents::AgentRegistry;
use mnemo_api::{create_api_router, ApiError, ApiResult, AppState, WsState};
use mnemo_core::{EmbeddingError, EmbeddingVector, RuntimeConfig, RuntimeError, RuntimeResult};
use mnemo_embed::{EmbeddingProvider, EmbeddingService, HttpEmbeddingProvider};
use mnemo_kernel::{CognitionLimiter, ToolRegistry};
use mnemo_storage::InMemoryAdapter;

/// Used when no embedding backend is configured. Every call fails, so
/// `EmbeddingService` falls back to its deterministic degraded embedding
/// on the first retry rather than ever reaching a real network call.
struct NullEmbeddingProvider {
    dimensions: usize,
}

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    async fn embed(&self, _text: &str) -> RuntimeResult<EmbeddingVector> {
        Err(RuntimeError::Embedding(EmbeddingError::Unavailable {
            reason: "no embedding endpoint configured".to_string(),
        }))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "null-provider"
    }
}

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = Arc::new(RuntimeConfig::from_env());
    config.validate()?;

    let storage: Arc<dyn mnemo_storage::PersistenceAdapter> = Arc::new(InMemoryAdapter::new());

    let provider: Arc<dyn EmbeddingProvider> = match &config.embedding.endpoint {
        Some(endpoint) => Arc::new(HttpEmbeddingProvider::new(
            endpoint.clone(),
            config.embedding.dim,
            "configured-embedding-backend",
        )),
        None => {
            tracing::warn!("no embedding endpoint configured; running degraded-only");
            Arc::new(NullEmbeddingProvider { dimensions: config.embedding.dim })
        }
    };
    let embeddings = Arc::new(EmbeddingService::new(provider, &config.embedding));

    let tools = Arc::new(ToolRegistry::new());
    let agents = Arc::new(AgentRegistry::new(&config.bus));
    let limiter = Arc::new(CognitionLimiter::new(&config.kernel));

    let ws_capacity = std::env::var("MNEMO_WS_CAPACITY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(1000);
    let ws = Arc::new(WsState::new(ws_capacity));

    let state = AppState {
        storage,
        embeddings,
        tools,
        agents,
        config,
        ws,
        limiter,
        start_time: std::time::Instant::now(),
    };

    let app = create_api_router(state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "starting mnemo API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("failed to bind {}: {}", addr, e)))?;

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result.map_err(|e| ApiError::internal_error(format!("server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("MNEMO_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("MNEMO_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("invalid bind address {}: {}", addr, e)))
}
