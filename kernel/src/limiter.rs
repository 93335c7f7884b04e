//! Admission control over how many cognitions may be running at once.
//!
//! Two counters: a global ceiling and a per-agent ceiling, both checked
//! before a cognition starts evaluating. Fresh module; grounded on the
//! same compare-and-swap style `mnemo_storage`'s optimistic-concurrency
//! `update()` uses, applied to an in-memory counter instead of a stored
//! record's version field.

use mnemo_core::{AgentId, KernelConfig, KernelError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct CognitionLimiter {
    total: AtomicUsize,
    per_agent: Mutex<HashMap<AgentId, usize>>,
    max_per_agent: usize,
    max_total: usize,
}

impl CognitionLimiter {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            total: AtomicUsize::new(0),
            per_agent: Mutex::new(HashMap::new()),
            max_per_agent: config.max_concurrent_per_agent,
            max_total: config.max_concurrent_total,
        }
    }

    /// Reserves a slot for `agent_id`, or rejects if either ceiling is
    /// already at capacity. The returned permit releases both counters
    /// when dropped, so a permit held for the lifetime of one evaluation
    /// is enough to keep the counts accurate even if the evaluator
    /// returns early on error or cancellation.
    pub fn try_acquire(&self, agent_id: AgentId) -> Result<CognitionPermit<'_>, KernelError> {
        loop {
            let current = self.total.load(Ordering::SeqCst);
            if current >= self.max_total {
                return Err(KernelError::BackpressureRejected);
            }
            if self
                .total
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }

        let mut per_agent = self.per_agent.lock().expect("limiter mutex poisoned");
        let count = per_agent.entry(agent_id).or_insert(0);
        if *count >= self.max_per_agent {
            drop(per_agent);
            self.total.fetch_sub(1, Ordering::SeqCst);
            return Err(KernelError::BackpressureRejected);
        }
        *count += 1;
        drop(per_agent);

        Ok(CognitionPermit { limiter: self, agent_id })
    }

    fn release(&self, agent_id: AgentId) {
        self.total.fetch_sub(1, Ordering::SeqCst);
        let mut per_agent = self.per_agent.lock().expect("limiter mutex poisoned");
        if let Some(count) = per_agent.get_mut(&agent_id) {
            *count -= 1;
            if *count == 0 {
                per_agent.remove(&agent_id);
            }
        }
    }

    pub fn active_total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Held for the duration of one cognition's evaluation. Releases its slot
/// on drop regardless of how the evaluation ended.
pub struct CognitionPermit<'a> {
    limiter: &'a CognitionLimiter,
    agent_id: AgentId,
}

impl Drop for CognitionPermit<'_> {
    fn drop(&mut self) {
        self.limiter.release(self.agent_id);
    }
}
