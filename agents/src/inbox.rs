//! A bounded, drop-oldest-on-full mailbox for one agent.
//!
//! Grounded on `caliber-agents::LockManager`'s general queue-plus-notify
//! idiom (guards a shared map behind a mutex and exposes an async acquire);
//! there is no backpressure policy there to adapt since its message types
//! assume unbounded delivery.

use crate::types::AgentMessage;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// Blocks a full inbox for this long waiting for a reader to make room
/// before giving up and dropping the oldest queued message.
const ADMISSION_WAIT: Duration = Duration::from_millis(100);

pub struct Inbox {
    queue: Mutex<VecDeque<AgentMessage>>,
    capacity: usize,
    notify: Notify,
}

impl Inbox {
    pub fn new(capacity: usize) -> Self {
        Self { queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))), capacity, notify: Notify::new() }
    }

    /// Enqueues `message`. Returns the message that was evicted to make
    /// room, if the inbox was still full after waiting for a reader.
    pub async fn push(&self, message: AgentMessage) -> Option<AgentMessage> {
        {
            let mut queue = self.queue.lock().await;
            if queue.len() < self.capacity {
                queue.push_back(message);
                drop(queue);
                self.notify.notify_waiters();
                return None;
            }
        }

        let _ = tokio::time::timeout(ADMISSION_WAIT, self.wait_for_space()).await;

        let mut queue = self.queue.lock().await;
        if queue.len() < self.capacity {
            queue.push_back(message);
            drop(queue);
            self.notify.notify_waiters();
            None
        } else {
            let evicted = queue.pop_front();
            queue.push_back(message);
            evicted
        }
    }

    async fn wait_for_space(&self) {
        loop {
            self.notify.notified().await;
            if self.queue.lock().await.len() < self.capacity {
                return;
            }
        }
    }

    /// Pops the oldest message, waiting up to `timeout` for one to arrive.
    /// `None` timeout waits indefinitely.
    pub async fn pop(&self, timeout: Option<Duration>) -> Option<AgentMessage> {
        loop {
            {
                let mut queue = self.queue.lock().await;
                if let Some(message) = queue.pop_front() {
                    return Some(message);
                }
            }
            let wait = self.notify.notified();
            match timeout {
                Some(duration) => {
                    if tokio::time::timeout(duration, wait).await.is_err() {
                        return None;
                    }
                }
                None => wait.await,
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::EntityIdType;
    use mnemo_core::{AgentId, Timestamp};
    use serde_json::Value;

    fn msg() -> AgentMessage {
        AgentMessage::new(AgentId::now_v7(), AgentId::now_v7(), Value::Null, Timestamp::default())
    }

    #[tokio::test]
    async fn push_then_pop_round_trips_a_message() {
        let inbox = Inbox::new(4);
        let sent = msg();
        assert!(inbox.push(sent.clone()).await.is_none());
        let received = inbox.pop(Some(Duration::from_millis(50))).await.unwrap();
        assert_eq!(received.message_id, sent.message_id);
    }

    #[tokio::test]
    async fn pop_on_empty_inbox_times_out() {
        let inbox = Inbox::new(4);
        let result = inbox.pop(Some(Duration::from_millis(20))).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn full_inbox_drops_oldest_message() {
        let inbox = Inbox::new(1);
        let first = msg();
        assert!(inbox.push(first.clone()).await.is_none());
        let second = msg();
        let evicted = inbox.push(second.clone()).await;
        assert_eq!(evicted.unwrap().message_id, first.message_id);
        assert_eq!(inbox.pop(None).await.unwrap().message_id, second.message_id);
    }

    use proptest::prelude::*;

    proptest! {
        /// P6: messages pushed in order and popped back out preserve send
        /// order (FIFO per sender), for any count within capacity.
        #[test]
        fn push_order_is_preserved_within_capacity(count in 1usize..16) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let inbox = Inbox::new(16);
                let sent: Vec<AgentMessage> = (0..count).map(|_| msg()).collect();
                for m in &sent {
                    prop_assert!(inbox.push(m.clone()).await.is_none());
                }
                for expected in &sent {
                    let received = inbox.pop(Some(Duration::from_millis(50))).await.unwrap();
                    prop_assert_eq!(received.message_id, expected.message_id);
                }
                Ok(())
            });
            result?;
        }
    }
}
