//! mnemo-api - HTTP/WebSocket surface over the memory subsystem, kernel,
//! and agent registry.
//!
//! Exposes cognition submission, memory CRUD/search/consolidation, and
//! agent registry/messaging as REST endpoints, plus a WebSocket stream of
//! the same events for live consumers.

pub mod error;
pub mod macros;
pub mod routes;
pub mod state;
pub mod validation;
pub mod ws;

pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::AppState;
pub use ws::{WsEvent, WsState};
