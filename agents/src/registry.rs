//! Agent registry and message bus: registration, per-agent inboxes, and
//! the event bus `AWAIT`/`EVENT` sit on top of.
//!
//! Grounded on `caliber-agents::Agent`'s registration fields and on
//! `caliber-agents::AgentMessage`'s builder-style send shape, generalized
//! from CALIBER's trajectory-sharing message types down to the plain
//! send/receive/publish surface a registry-and-bus layer needs.

use crate::events::EventBus;
use crate::inbox::Inbox;
use crate::types::{AgentMessage, AgentRecord, PublishedEvent};
use chrono::Utc;
use mnemo_core::{AgentError, AgentId, BusConfig, EventDef, RuntimeError, RuntimeResult};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, RwLock};

/// Coordinates every registered agent's identity, inbox, and subscription
/// to the shared event bus.
pub struct AgentRegistry {
    agents: RwLock<HashMap<AgentId, AgentRecord>>,
    inboxes: RwLock<HashMap<AgentId, Arc<Inbox>>>,
    events: EventBus,
    deregistered: broadcast::Sender<AgentId>,
    inbox_capacity: usize,
}

impl AgentRegistry {
    pub fn new(config: &BusConfig) -> Self {
        let (deregistered, _) = broadcast::channel(64);
        Self {
            agents: RwLock::new(HashMap::new()),
            inboxes: RwLock::new(HashMap::new()),
            events: EventBus::new(),
            deregistered,
            inbox_capacity: config.inbox_capacity,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribes to agent deregistration so the kernel can cancel any
    /// cognitions that agent still owns.
    pub fn deregistration_feed(&self) -> broadcast::Receiver<AgentId> {
        self.deregistered.subscribe()
    }

    pub async fn register(&self, agent_id: AgentId, capabilities: BTreeSet<String>) -> RuntimeResult<()> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(&agent_id) {
            return Err(RuntimeError::Agent(AgentError::AlreadyRegistered { agent_id }));
        }
        agents.insert(agent_id, AgentRecord::new(agent_id, Utc::now(), capabilities));
        drop(agents);
        self.inboxes.write().await.insert(agent_id, Arc::new(Inbox::new(self.inbox_capacity)));
        Ok(())
    }

    /// Removes the agent's registration and drains its inbox. Cancelling
    /// its in-flight cognitions is the kernel's responsibility; it learns
    /// about the deregistration through `deregistration_feed`.
    pub async fn deregister(&self, agent_id: AgentId) -> RuntimeResult<()> {
        let removed = self.agents.write().await.remove(&agent_id);
        if removed.is_none() {
            return Err(RuntimeError::Agent(AgentError::NotRegistered { agent_id }));
        }
        self.inboxes.write().await.remove(&agent_id);
        let _ = self.deregistered.send(agent_id);
        Ok(())
    }

    pub async fn is_registered(&self, agent_id: AgentId) -> bool {
        self.agents.read().await.contains_key(&agent_id)
    }

    pub async fn get(&self, agent_id: AgentId) -> Option<AgentRecord> {
        self.agents.read().await.get(&agent_id).cloned()
    }

    pub async fn list(&self) -> Vec<AgentRecord> {
        self.agents.read().await.values().cloned().collect()
    }

    /// Enqueues `payload` on `to`'s inbox. When the inbox was full and a
    /// message had to be dropped to make room, publishes a
    /// `message.dropped` event sourced from the evicted message's sender.
    pub async fn send_message(&self, from: AgentId, to: AgentId, payload: Value) -> RuntimeResult<mnemo_core::MessageId> {
        if !self.is_registered(to).await {
            return Err(RuntimeError::Agent(AgentError::NotRegistered { agent_id: to }));
        }
        let inbox = {
            let inboxes = self.inboxes.read().await;
            inboxes.get(&to).cloned().expect("registered agent always has an inbox")
        };
        let message = AgentMessage::new(from, to, payload, Utc::now());
        let message_id = message.message_id;
        if let Some(evicted) = inbox.push(message).await {
            let mut dropped_payload = Map::new();
            dropped_payload.insert("message_id".into(), Value::String(evicted.message_id.to_string()));
            dropped_payload.insert("recipient".into(), Value::String(to.to_string()));
            self.events
                .publish(PublishedEvent {
                    event_type: "message.dropped".into(),
                    source: evicted.from.to_string(),
                    payload: dropped_payload,
                })
                .await;
        }
        Ok(message_id)
    }

    /// Pops the oldest queued message for `agent_id`, waiting up to
    /// `timeout` (or indefinitely if `None`).
    pub async fn receive(&self, agent_id: AgentId, timeout: Option<Duration>) -> RuntimeResult<Option<AgentMessage>> {
        let inbox = {
            let inboxes = self.inboxes.read().await;
            inboxes
                .get(&agent_id)
                .cloned()
                .ok_or(RuntimeError::Agent(AgentError::NotRegistered { agent_id }))?
        };
        Ok(inbox.pop(timeout).await)
    }

    /// Registers an `AWAIT` selector and returns a receiver resolving on
    /// the first matching `publish_event` call.
    pub async fn subscribe(&self, selector: EventDef) -> oneshot::Receiver<PublishedEvent> {
        self.events.subscribe(selector).await
    }

    pub async fn unsubscribe(&self, selector: &EventDef) {
        self.events.unsubscribe(selector).await;
    }

    pub async fn publish_event(&self, event_type: impl Into<String>, source: impl Into<String>, payload: Map<String, Value>) {
        self.events.publish(PublishedEvent { event_type: event_type.into(), source: source.into(), payload }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::EntityIdType;

    fn config() -> BusConfig {
        BusConfig { inbox_capacity: 2 }
    }

    #[tokio::test]
    async fn registering_the_same_agent_twice_is_rejected() {
        let registry = AgentRegistry::new(&config());
        let agent_id = AgentId::now_v7();
        registry.register(agent_id, BTreeSet::new()).await.unwrap();
        let err = registry.register(agent_id, BTreeSet::new()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Agent(AgentError::AlreadyRegistered { .. })));
    }

    #[tokio::test]
    async fn sending_to_an_unknown_agent_is_rejected() {
        let registry = AgentRegistry::new(&config());
        let err = registry
            .send_message(AgentId::now_v7(), AgentId::now_v7(), Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Agent(AgentError::NotRegistered { .. })));
    }

    #[tokio::test]
    async fn sent_message_is_received_by_recipient() {
        let registry = AgentRegistry::new(&config());
        let sender = AgentId::now_v7();
        let recipient = AgentId::now_v7();
        registry.register(sender, BTreeSet::new()).await.unwrap();
        registry.register(recipient, BTreeSet::new()).await.unwrap();

        registry.send_message(sender, recipient, Value::String("hi".into())).await.unwrap();
        let received = registry.receive(recipient, Some(Duration::from_millis(50))).await.unwrap();
        assert_eq!(received.unwrap().payload, Value::String("hi".into()));
    }

    #[tokio::test]
    async fn deregistering_an_unknown_agent_is_rejected() {
        let registry = AgentRegistry::new(&config());
        let err = registry.deregister(AgentId::now_v7()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Agent(AgentError::NotRegistered { .. })));
    }

    #[tokio::test]
    async fn deregistering_an_agent_notifies_the_deregistration_feed() {
        let registry = AgentRegistry::new(&config());
        let agent_id = AgentId::now_v7();
        registry.register(agent_id, BTreeSet::new()).await.unwrap();
        let mut feed = registry.deregistration_feed();
        registry.deregister(agent_id).await.unwrap();
        assert_eq!(feed.recv().await.unwrap(), agent_id);
    }

    #[tokio::test]
    async fn dropping_a_message_on_a_full_inbox_publishes_message_dropped() {
        let registry = AgentRegistry::new(&config());
        let sender = AgentId::now_v7();
        let recipient = AgentId::now_v7();
        registry.register(sender, BTreeSet::new()).await.unwrap();
        registry.register(recipient, BTreeSet::new()).await.unwrap();

        let selector = EventDef { event_type: "message.dropped".into(), source: sender.to_string(), filter: None, timeout: None };
        let rx = registry.subscribe(selector).await;

        registry.send_message(sender, recipient, Value::from(1)).await.unwrap();
        registry.send_message(sender, recipient, Value::from(2)).await.unwrap();
        registry.send_message(sender, recipient, Value::from(3)).await.unwrap();

        let event = tokio::time::timeout(Duration::from_millis(200), rx).await.unwrap().unwrap();
        assert_eq!(event.event_type, "message.dropped");
    }
}
