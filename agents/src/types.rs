//! Data types shared by the agent registry and message bus.
//!
//! Grounded on `caliber-agents::Agent`/`AgentMessage`'s field shape and
//! builder-method style (`to_agent`, `with_priority`, `mark_delivered`), but
//! trimmed to a plain agent-record shape (id, registration time,
//! capability tags, inbox) and message envelope; CALIBER's delegation,
//! handoff, conflict-resolution, and distributed-lock types have no
//! counterpart in a plain registry-and-bus coordination layer and are
//! dropped.

use mnemo_core::{AgentId, EntityIdType, MessageId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A registered agent: identity, when it joined, and the capability tags
/// other agents or the query planner may filter on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub registered_at: Timestamp,
    pub capabilities: BTreeSet<String>,
}

impl AgentRecord {
    pub fn new(agent_id: AgentId, registered_at: Timestamp, capabilities: BTreeSet<String>) -> Self {
        Self { agent_id, registered_at, capabilities }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// One message enqueued on a recipient's inbox by `COMMUNICATE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: MessageId,
    pub from: AgentId,
    pub to: AgentId,
    pub payload: Value,
    pub sent_at: Timestamp,
}

impl AgentMessage {
    pub fn new(from: AgentId, to: AgentId, payload: Value, sent_at: Timestamp) -> Self {
        Self { message_id: MessageId::now_v7(), from, to, payload, sent_at }
    }
}

/// An event published on the bus, matched against pending `AWAIT` selectors
/// by `(type, source)` equality plus every key in the selector's filter.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub event_type: String,
    pub source: String,
    pub payload: Map<String, Value>,
}
