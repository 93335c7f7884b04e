//! Error types for mnemo runtime operations

use crate::identity::{AgentId, CognitionId, MemoryId, MessageId, ToolCallId};
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("memory not found: {id}")]
    NotFound { id: MemoryId },

    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("optimistic concurrency conflict on {id}: expected version {expected}, found {actual}")]
    Conflict {
        id: MemoryId,
        expected: u64,
        actual: u64,
    },

    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },
}

/// Embedding/similarity service errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("embedding backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid vector: {reason}")]
    InvalidVector { reason: String },
}

/// IL parse error with source-location information, as required by the
/// parser's `ParseError { line, column, message }` contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Kernel (IL evaluator) errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum KernelError {
    #[error("unknown operator: {operator}")]
    UnknownOperator { operator: String },

    #[error("arity error for {operator}: expected {expected}, got {got}")]
    ArityError {
        operator: String,
        expected: String,
        got: usize,
    },

    #[error("unknown variable: {name}")]
    UnknownVariable { name: String },

    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("argument error: {reason}")]
    ArgumentError { reason: String },

    #[error("unknown agent: {id}")]
    UnknownAgent { id: AgentId },

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("sandbox violation: {limit} limit exceeded (observed {observed})")]
    SandboxViolation { limit: String, observed: f64 },

    #[error("await timed out waiting for event")]
    AwaitTimeout,

    #[error("cognition {id} exceeded its wall-clock budget")]
    CognitionTimeout { id: CognitionId },

    #[error("cognition rejected due to backpressure")]
    BackpressureRejected,

    #[error("cognition {id} was cancelled")]
    Cancelled { id: CognitionId },

    #[error("tool call {id} failed: {reason}")]
    ToolCallFailed { id: ToolCallId, reason: String },
}

/// Agent registry and message bus errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("agent not registered: {agent_id}")]
    NotRegistered { agent_id: AgentId },

    #[error("agent already registered: {agent_id}")]
    AlreadyRegistered { agent_id: AgentId },

    #[error("message delivery failed for {message_id}: {reason}")]
    MessageDeliveryFailed {
        message_id: MessageId,
        reason: String,
    },

    #[error("permission denied for agent {agent_id}: {action}")]
    PermissionDenied { agent_id: AgentId, action: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Top-level error type for all mnemo runtime operations.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for mnemo runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
