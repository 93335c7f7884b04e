//! Per-cognition execution context: cancellation, wall-clock budget, and the
//! lexical scope a running evaluation owns.

use crate::scope::ScopeStack;
use mnemo_core::{AgentId, CognitionId, KernelError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A cooperative cancellation handle. Cancelling sets a flag and wakes every
/// task currently awaiting `cancelled()`; cancellation is observed at the
/// evaluator's suspension points, never pre-empted mid-expression.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves immediately if already cancelled, else waits for `cancel()`.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one evaluation of a submitted cognition owns: its variable
/// scope stack, cancellation handle, and wall-clock deadline.
pub struct CognitionContext {
    pub cognition_id: CognitionId,
    pub agent_id: AgentId,
    pub scope: ScopeStack,
    pub cancellation: CancellationToken,
    deadline: Instant,
}

impl CognitionContext {
    pub fn new(cognition_id: CognitionId, agent_id: AgentId, budget: Duration) -> Self {
        Self {
            cognition_id,
            agent_id,
            scope: ScopeStack::new(),
            cancellation: CancellationToken::new(),
            deadline: Instant::now() + budget,
        }
    }

    /// Checked at every suspension point and between top-level AST nodes.
    pub fn check_live(&self) -> Result<(), KernelError> {
        if self.cancellation.is_cancelled() {
            return Err(KernelError::Cancelled { id: self.cognition_id });
        }
        if Instant::now() >= self.deadline {
            return Err(KernelError::CognitionTimeout { id: self.cognition_id });
        }
        Ok(())
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::EntityIdType;

    #[tokio::test]
    async fn cancelling_before_waiting_resolves_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("cancelled() must resolve immediately once already cancelled");
    }

    #[test]
    fn expired_budget_is_reported_as_cognition_timeout() {
        let ctx = CognitionContext::new(CognitionId::now_v7(), AgentId::now_v7(), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(ctx.check_live(), Err(KernelError::CognitionTimeout { .. })));
    }

    #[test]
    fn cancelled_context_is_reported_as_cancelled() {
        let ctx = CognitionContext::new(CognitionId::now_v7(), AgentId::now_v7(), Duration::from_secs(60));
        ctx.cancellation.cancel();
        assert!(matches!(ctx.check_live(), Err(KernelError::Cancelled { .. })));
    }
}
