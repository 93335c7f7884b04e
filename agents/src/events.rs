//! Publish/subscribe event bus backing `AWAIT` and `EVENT`.
//!
//! Fresh module; grounded on `mnemo_core::EventDef::matches` for the
//! matching rule and on the same mutex-guarded-registry idiom as
//! `caliber-agents::LockManager`. Each matching awaiter gets its own copy
//! of the event, delivered via a one-shot channel it alone owns.

use crate::types::PublishedEvent;
use mnemo_core::EventDef;
use tokio::sync::{oneshot, Mutex};

pub struct EventBus {
    awaiters: Mutex<Vec<(EventDef, oneshot::Sender<PublishedEvent>)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { awaiters: Mutex::new(Vec::new()) }
    }

    /// Registers interest in events matching `selector`. The returned
    /// receiver resolves the first time a published event matches.
    pub async fn subscribe(&self, selector: EventDef) -> oneshot::Receiver<PublishedEvent> {
        let (tx, rx) = oneshot::channel();
        self.awaiters.lock().await.push((selector, tx));
        rx
    }

    /// Removes a subscription that was never delivered, e.g. because its
    /// `AWAIT` timed out or its cognition was cancelled.
    pub async fn unsubscribe(&self, selector: &EventDef) {
        let mut awaiters = self.awaiters.lock().await;
        if let Some(pos) = awaiters.iter().position(|(s, _)| s == selector) {
            awaiters.remove(pos);
        }
    }

    /// Delivers `event` to every currently registered selector it matches,
    /// in the order subscriptions were registered.
    pub async fn publish(&self, event: PublishedEvent) {
        let mut awaiters = self.awaiters.lock().await;
        let pending = std::mem::take(&mut *awaiters);
        let mut remaining = Vec::with_capacity(pending.len());
        for (selector, sender) in pending {
            if selector.matches(&event.event_type, &event.source, &event.payload) {
                let _ = sender.send(event.clone());
            } else {
                remaining.push((selector, sender));
            }
        }
        *awaiters = remaining;
    }

    pub async fn pending_count(&self) -> usize {
        self.awaiters.lock().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn selector(event_type: &str, source: &str) -> EventDef {
        EventDef { event_type: event_type.into(), source: source.into(), filter: None, timeout: None }
    }

    fn event(event_type: &str, source: &str) -> PublishedEvent {
        PublishedEvent { event_type: event_type.into(), source: source.into(), payload: Map::new() }
    }

    #[tokio::test]
    async fn matching_publish_resolves_the_subscriber() {
        let bus = EventBus::new();
        let rx = bus.subscribe(selector("task.done", "worker-1")).await;
        bus.publish(event("task.done", "worker-1")).await;
        let received = rx.await.unwrap();
        assert_eq!(received.event_type, "task.done");
    }

    #[tokio::test]
    async fn non_matching_publish_leaves_the_subscription_pending() {
        let bus = EventBus::new();
        let rx = bus.subscribe(selector("task.done", "worker-1")).await;
        bus.publish(event("task.done", "worker-2")).await;
        assert_eq!(bus.pending_count().await, 1);
        drop(rx);
    }

    #[tokio::test]
    async fn each_matching_subscriber_gets_its_own_copy() {
        let bus = EventBus::new();
        let rx_a = bus.subscribe(selector("task.done", "worker-1")).await;
        let rx_b = bus.subscribe(selector("task.done", "worker-1")).await;
        bus.publish(event("task.done", "worker-1")).await;
        assert!(rx_a.await.is_ok());
        assert!(rx_b.await.is_ok());
    }

    #[tokio::test]
    async fn unsubscribe_removes_a_pending_selector() {
        let bus = EventBus::new();
        let selector = selector("task.done", "worker-1");
        let _rx = bus.subscribe(selector.clone()).await;
        bus.unsubscribe(&selector).await;
        assert_eq!(bus.pending_count().await, 0);
    }
}
