//! WebSocket Event Broadcasting
//!
//! Clients connect via WebSocket to receive live updates about cognition
//! completions, memory writes, and agent registry changes.
//!
//! - Uses a tokio broadcast channel for event distribution
//! - No per-connection filtering: every client sees every event
//! - JSON-serialized events using the `WsEvent` enum

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use mnemo_core::identity::{AgentId, CognitionId, MemoryId, MessageId};
use mnemo_core::CognitionOutcome;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::ApiResult;

/// Events broadcast to connected WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    Connected,
    Disconnected { reason: String },
    Error { message: String },
    CognitionCompleted { cognition_id: CognitionId, outcome: CognitionOutcome },
    MemorySaved { id: MemoryId, kind: String },
    MemoryDeleted { id: MemoryId },
    AgentRegistered { agent_id: AgentId },
    AgentDeregistered { agent_id: AgentId },
    MessageDropped { message_id: MessageId, recipient: AgentId },
}

impl WsEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WsEvent::Connected => "connected",
            WsEvent::Disconnected { .. } => "disconnected",
            WsEvent::Error { .. } => "error",
            WsEvent::CognitionCompleted { .. } => "cognition_completed",
            WsEvent::MemorySaved { .. } => "memory_saved",
            WsEvent::MemoryDeleted { .. } => "memory_deleted",
            WsEvent::AgentRegistered { .. } => "agent_registered",
            WsEvent::AgentDeregistered { .. } => "agent_deregistered",
            WsEvent::MessageDropped { .. } => "message_dropped",
        }
    }
}

/// WebSocket state shared across the application.
#[derive(Clone)]
pub struct WsState {
    tx: broadcast::Sender<WsEvent>,
}

impl WsState {
    /// Create a new WebSocket state with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcast an event to all connected clients. Non-blocking; dropped
    /// silently if nobody is listening.
    pub fn broadcast(&self, event: WsEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => debug!(event_type, receivers, "broadcast event"),
            Err(_) => debug!(event_type, "no receivers for event"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.tx.subscribe()
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
) -> ApiResult<Response> {
    info!("WebSocket connection request");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state)))
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    info!("WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.subscribe();

    if let Err(e) = send_event(&mut sender, WsEvent::Connected).await {
        error!(error = %e, "failed to send Connected event");
        return;
    }

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("client sent close frame");
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Text(text)) => {
                    debug!(text = %text, "received text message (ignored)");
                }
                Ok(Message::Binary(data)) => {
                    debug!(len = data.len(), "received binary message (ignored)");
                }
                Err(e) => {
                    warn!(error = %e, "websocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Err(e) = send_event(&mut sender, event).await {
                            error!(error = %e, "failed to send event, closing connection");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "client lagged, some events were dropped");
                        let error_event = WsEvent::Error {
                            message: format!("lagged: {} events dropped", skipped),
                        };
                        if let Err(e) = send_event(&mut sender, error_event).await {
                            error!(error = %e, "failed to send error event");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("broadcast channel closed");
                        break;
                    }
                }
            }
            _ = &mut recv_task => {
                debug!("receiver task finished");
                break;
            }
        }
    }

    let disconnected = WsEvent::Disconnected { reason: "connection closed".to_string() };
    let _ = send_event(&mut sender, disconnected).await;
    info!("WebSocket disconnected");
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: WsEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(&event).map_err(|e| {
        error!(error = %e, "failed to serialize event");
        axum::Error::new(e)
    })?;
    sender.send(Message::Text(json.into())).await
}
