//! mnemo-agents - agent registry, per-agent inboxes, and the event bus
//! `COMMUNICATE`, `AWAIT`, and `EVENT` are built on.

pub mod events;
pub mod inbox;
pub mod registry;
pub mod types;

pub use events::EventBus;
pub use inbox::Inbox;
pub use registry::AgentRegistry;
pub use types::{AgentMessage, AgentRecord, PublishedEvent};
