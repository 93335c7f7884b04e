//! Error types for the HTTP/WebSocket API.
//!
//! `ApiError` is the one error type every handler returns. It wraps an
//! `ErrorCode` (stable, machine-readable) plus a human message and renders
//! itself as a JSON body with the matching HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mnemo_core::error::{AgentError, ConfigError, EmbeddingError, KernelError, RuntimeError, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation (400)
    ValidationFailed,
    InvalidInput,
    MissingField,
    InvalidRange,
    InvalidFormat,

    // Not found (404)
    MemoryNotFound,
    AgentNotFound,
    CognitionNotFound,
    ToolNotFound,

    // Conflict (409)
    EntityAlreadyExists,
    ConcurrentModification,
    StateConflict,

    // Forbidden (403) - sandbox/capability denial, not auth
    Forbidden,

    // Backpressure / timeout
    BackpressureRejected,
    Timeout,

    // Upstream failures
    ToolCallFailed,
    EmbeddingUnavailable,
    StorageUnavailable,

    // Server
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidRange
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,

            ErrorCode::MemoryNotFound
            | ErrorCode::AgentNotFound
            | ErrorCode::CognitionNotFound
            | ErrorCode::ToolNotFound => StatusCode::NOT_FOUND,

            ErrorCode::EntityAlreadyExists
            | ErrorCode::ConcurrentModification
            | ErrorCode::StateConflict => StatusCode::CONFLICT,

            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::BackpressureRejected => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::ToolCallFailed => StatusCode::BAD_GATEWAY,
            ErrorCode::EmbeddingUnavailable | ErrorCode::StorageUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidRange => "Value is out of valid range",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::MemoryNotFound => "Memory not found",
            ErrorCode::AgentNotFound => "Agent not found",
            ErrorCode::CognitionNotFound => "Cognition not found",
            ErrorCode::ToolNotFound => "Tool not found",
            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::ConcurrentModification => "Concurrent modification detected",
            ErrorCode::StateConflict => "Operation conflicts with current state",
            ErrorCode::Forbidden => "Operation not permitted",
            ErrorCode::BackpressureRejected => "Too many concurrent cognitions",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::ToolCallFailed => "Tool call failed",
            ErrorCode::EmbeddingUnavailable => "Embedding service unavailable",
            ErrorCode::StorageUnavailable => "Storage backend unavailable",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Structured error response returned by every handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn invalid_range(field: &str, min: impl fmt::Display, max: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidRange,
            format!("Field '{}' must be between {} and {}", field, min, max),
        )
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { id } => {
                Self::new(ErrorCode::MemoryNotFound, format!("memory {} not found", id))
            }
            StorageError::Conflict { id, expected, actual } => Self::new(
                ErrorCode::ConcurrentModification,
                format!(
                    "memory {} was modified concurrently (expected version {}, found {})",
                    id, expected, actual
                ),
            ),
            StorageError::InvalidRecord { reason } => Self::new(ErrorCode::InvalidInput, reason),
            StorageError::Unavailable { reason } => {
                Self::new(ErrorCode::StorageUnavailable, reason)
            }
        }
    }
}

impl From<EmbeddingError> for ApiError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::DimensionMismatch { expected, got } => Self::new(
                ErrorCode::InvalidInput,
                format!("embedding dimension mismatch: expected {}, got {}", expected, got),
            ),
            EmbeddingError::InvalidVector { reason } => Self::new(ErrorCode::InvalidInput, reason),
            EmbeddingError::Unavailable { reason } => {
                Self::new(ErrorCode::EmbeddingUnavailable, reason)
            }
        }
    }
}

impl From<KernelError> for ApiError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::UnknownAgent { id } => {
                Self::new(ErrorCode::AgentNotFound, format!("agent {} not found", id))
            }
            KernelError::UnknownTool { name } => {
                Self::new(ErrorCode::ToolNotFound, format!("tool '{}' not registered", name))
            }
            KernelError::BackpressureRejected => Self::from_code(ErrorCode::BackpressureRejected),
            KernelError::AwaitTimeout | KernelError::CognitionTimeout { .. } => {
                Self::from_code(ErrorCode::Timeout)
            }
            KernelError::Cancelled { id } => Self::new(
                ErrorCode::StateConflict,
                format!("cognition {} was cancelled", id),
            ),
            KernelError::SandboxViolation { limit, observed } => Self::new(
                ErrorCode::Forbidden,
                format!("sandbox {} limit exceeded (observed {})", limit, observed),
            ),
            KernelError::ToolCallFailed { id, reason } => Self::new(
                ErrorCode::ToolCallFailed,
                format!("tool call {} failed: {}", id, reason),
            ),
            KernelError::UnknownOperator { operator } => Self::new(
                ErrorCode::ValidationFailed,
                format!("unknown operator '{}'", operator),
            ),
            KernelError::ArityError { operator, expected, got } => Self::new(
                ErrorCode::ValidationFailed,
                format!("{} expects {} arguments, got {}", operator, expected, got),
            ),
            KernelError::UnknownVariable { name } => Self::new(
                ErrorCode::ValidationFailed,
                format!("unknown variable '${}'", name),
            ),
            KernelError::ArgumentError { reason } => Self::new(ErrorCode::ValidationFailed, reason),
            KernelError::EmptyQuery => {
                Self::new(ErrorCode::ValidationFailed, "query has no selection criteria")
            }
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::NotRegistered { agent_id } => {
                Self::new(ErrorCode::AgentNotFound, format!("agent {} not registered", agent_id))
            }
            AgentError::AlreadyRegistered { agent_id } => Self::new(
                ErrorCode::EntityAlreadyExists,
                format!("agent {} already registered", agent_id),
            ),
            AgentError::MessageDeliveryFailed { message_id, reason } => Self::new(
                ErrorCode::InternalError,
                format!("message {} delivery failed: {}", message_id, reason),
            ),
            AgentError::PermissionDenied { agent_id, action } => Self::new(
                ErrorCode::Forbidden,
                format!("agent {} may not {}", agent_id, action),
            ),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::MissingRequired { field } => Self::missing_field(&field),
            ConfigError::InvalidValue { field, value, reason } => Self::new(
                ErrorCode::ValidationFailed,
                format!("field '{}' has invalid value '{}': {}", field, value, reason),
            ),
            ConfigError::IncompatibleOptions { option_a, option_b } => Self::new(
                ErrorCode::ValidationFailed,
                format!("'{}' is incompatible with '{}'", option_a, option_b),
            ),
        }
    }
}

impl From<mnemo_core::error::ParseError> for ApiError {
    fn from(err: mnemo_core::error::ParseError) -> Self {
        Self::new(
            ErrorCode::ValidationFailed,
            format!("{}:{}: {}", err.line, err.column, err.message),
        )
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Storage(e) => e.into(),
            RuntimeError::Embedding(e) => e.into(),
            RuntimeError::Parse(e) => e.into(),
            RuntimeError::Kernel(e) => e.into(),
            RuntimeError::Agent(e) => e.into(),
            RuntimeError::Config(e) => e.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        ApiError::new(ErrorCode::InvalidInput, format!("invalid JSON: {}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::EntityIdType;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::MemoryNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::EntityAlreadyExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::BackpressureRejected.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_api_error_constructors() {
        let err = ApiError::missing_field("text");
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("text"));
    }

    #[test]
    fn test_storage_not_found_maps_to_memory_not_found() {
        let id = mnemo_core::identity::MemoryId::now_v7();
        let err: ApiError = StorageError::NotFound { id }.into();
        assert_eq!(err.code, ErrorCode::MemoryNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_kernel_backpressure_maps_to_429() {
        let err: ApiError = KernelError::BackpressureRejected.into();
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::validation_failed("bad input");
        let json = serde_json::to_string(&err)?;
        assert!(json.contains("VALIDATION_FAILED"));
        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    use proptest::prelude::*;

    fn any_error_code() -> impl Strategy<Value = ErrorCode> {
        prop_oneof![
            Just(ErrorCode::ValidationFailed),
            Just(ErrorCode::InvalidInput),
            Just(ErrorCode::MissingField),
            Just(ErrorCode::InvalidRange),
            Just(ErrorCode::InvalidFormat),
            Just(ErrorCode::MemoryNotFound),
            Just(ErrorCode::AgentNotFound),
            Just(ErrorCode::CognitionNotFound),
            Just(ErrorCode::ToolNotFound),
            Just(ErrorCode::EntityAlreadyExists),
            Just(ErrorCode::ConcurrentModification),
            Just(ErrorCode::StateConflict),
            Just(ErrorCode::Forbidden),
            Just(ErrorCode::BackpressureRejected),
            Just(ErrorCode::Timeout),
            Just(ErrorCode::ToolCallFailed),
            Just(ErrorCode::EmbeddingUnavailable),
            Just(ErrorCode::StorageUnavailable),
            Just(ErrorCode::InternalError),
        ]
    }

    proptest! {
        /// Every `ApiError`, for any code and message, serializes to JSON
        /// and back to an identical value, and its status code is stable
        /// across that round trip.
        #[test]
        fn api_error_round_trips_through_json(code in any_error_code(), message in "[a-zA-Z0-9 ]{0,40}") {
            let err = ApiError::new(code, message);
            let json = serde_json::to_string(&err).unwrap();
            let deserialized: ApiError = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(&deserialized, &err);
            prop_assert_eq!(deserialized.status_code(), err.status_code());
        }
    }
}
