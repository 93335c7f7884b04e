//! Tool registry and sandboxed dispatch.
//!
//! Tools remain a registry keyed by name rather than a closed enum, per the
//! same redesign guidance that made the instruction-language operator set a
//! closed sum type: a fixed, small operator grammar is represented as a
//! tagged variant, but the open-ended set of host tools is a handler table.

use crate::value::Value;
use async_trait::async_trait;
use mnemo_core::{KernelError, ResourceLimits, ToolDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Characters rejected in string arguments unless the tool declares the
/// parameter as a `raw-string` input (via `"raw_string_params": [...]` in
/// its `input_schema`).
const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '$', '`', '>', '<', '\n'];

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> Result<Value, KernelError>;
}

struct Registered {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

/// Shared, read-mostly table of registered tools. Registration takes an
/// exclusive write lock; dispatch only needs a read lock.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Registered>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-registering an existing name atomically replaces its entry.
    pub async fn register(&self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) {
        let name = descriptor.name.clone();
        self.tools.write().await.insert(name, Registered { descriptor, handler });
    }

    pub async fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.read().await.get(name).map(|r| r.descriptor.clone())
    }

    /// Dispatches `name(args)`. `sandboxed` must be true for any tool whose
    /// descriptor sets `requires_sandbox`; `limits` overrides the tool's
    /// declared defaults when provided.
    pub async fn invoke(
        &self,
        name: &str,
        args: Vec<Value>,
        sandboxed: bool,
        limits: Option<ResourceLimits>,
    ) -> Result<Value, KernelError> {
        let (descriptor, handler) = {
            let tools = self.tools.read().await;
            let entry = tools
                .get(name)
                .ok_or_else(|| KernelError::UnknownTool { name: name.to_string() })?;
            (entry.descriptor.clone(), entry.handler.clone())
        };

        if descriptor.requires_sandbox && !sandboxed {
            return Err(KernelError::SandboxViolation {
                limit: "requires_sandbox".into(),
                observed: 0.0,
            });
        }

        if sandboxed {
            let effective_limits = limits.unwrap_or(descriptor.resource_limits);

            if descriptor.requires_network && !effective_limits.network_allowed {
                return Err(KernelError::SandboxViolation {
                    limit: "network_allowed".into(),
                    observed: 0.0,
                });
            }

            scrub_args(&descriptor, &args)?;

            // No real process/container isolation here: CPU time isn't
            // separately observable for an in-process async handler, so
            // cpu-seconds is enforced as a second wall-clock cap, whichever
            // of the two is tighter.
            let (budget_secs, budget_limit) =
                if effective_limits.cpu_seconds <= effective_limits.wall_clock_seconds {
                    (effective_limits.cpu_seconds, "cpu_seconds")
                } else {
                    (effective_limits.wall_clock_seconds, "wall_clock_seconds")
                };
            let budget = Duration::from_secs(budget_secs);

            let result = match tokio::time::timeout(budget, handler.call(args)).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(KernelError::SandboxViolation {
                        limit: budget_limit.into(),
                        observed: budget_secs as f64,
                    })
                }
            }?;

            let observed_bytes = serde_json::to_vec(&result.to_json()).map(|v| v.len()).unwrap_or(0);
            if observed_bytes as u64 > effective_limits.memory_bytes {
                return Err(KernelError::SandboxViolation {
                    limit: "memory_bytes".into(),
                    observed: observed_bytes as f64,
                });
            }

            return Ok(result);
        }

        handler.call(args).await
    }
}

fn scrub_args(descriptor: &ToolDescriptor, args: &[Value]) -> Result<(), KernelError> {
    let raw_string_params: Vec<&str> = descriptor
        .input_schema
        .get("raw_string_params")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    if !raw_string_params.is_empty() {
        // The tool has opted some parameters out of scrubbing; with no
        // positional parameter names available at this layer, a declared
        // raw-string allowance exempts the whole call.
        return Ok(());
    }

    for arg in args {
        if let Value::String(s) = arg {
            if s.contains(SHELL_METACHARACTERS) {
                return Err(KernelError::ArgumentError {
                    reason: format!("argument contains a shell metacharacter: {:?}", s),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, args: Vec<Value>) -> Result<Value, KernelError> {
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        }
    }

    struct Slow;

    #[async_trait]
    impl ToolHandler for Slow {
        async fn call(&self, _args: Vec<Value>) -> Result<Value, KernelError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(Value::Null)
        }
    }

    fn descriptor(name: &str, requires_sandbox: bool) -> ToolDescriptor {
        ToolDescriptor {
            name: name.into(),
            input_schema: json!({}),
            output_schema: json!({}),
            requires_sandbox,
            requires_network: false,
            resource_limits: ResourceLimits { wall_clock_seconds: 1, ..Default::default() },
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("missing", vec![], false, None).await.unwrap_err();
        assert!(matches!(err, KernelError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn sandbox_required_tool_refuses_unsandboxed_invocation() {
        let registry = ToolRegistry::new();
        registry.register(descriptor("danger", true), Arc::new(Echo)).await;
        let err = registry.invoke("danger", vec![], false, None).await.unwrap_err();
        assert!(matches!(err, KernelError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn shell_metacharacters_are_rejected_when_sandboxed() {
        let registry = ToolRegistry::new();
        registry.register(descriptor("run", false), Arc::new(Echo)).await;
        let err = registry
            .invoke("run", vec![Value::String("ls; rm -rf /".into())], true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::ArgumentError { .. }));
    }

    #[tokio::test]
    async fn sandboxed_call_exceeding_wall_clock_is_a_sandbox_violation() {
        let registry = ToolRegistry::new();
        registry.register(descriptor("slow", false), Arc::new(Slow)).await;
        let err = registry.invoke("slow", vec![], true, None).await.unwrap_err();
        assert!(matches!(err, KernelError::SandboxViolation { limit, .. } if limit == "wall_clock_seconds"));
    }

    #[tokio::test]
    async fn sandboxed_call_exceeding_cpu_seconds_is_a_sandbox_violation() {
        let registry = ToolRegistry::new();
        let mut desc = descriptor("slow", false);
        desc.resource_limits = ResourceLimits { cpu_seconds: 1, wall_clock_seconds: 10, ..Default::default() };
        registry.register(desc, Arc::new(Slow)).await;
        let err = registry.invoke("slow", vec![], true, None).await.unwrap_err();
        assert!(matches!(err, KernelError::SandboxViolation { limit, .. } if limit == "cpu_seconds"));
    }

    #[tokio::test]
    async fn sandboxed_call_requiring_network_without_allowance_is_a_sandbox_violation() {
        let registry = ToolRegistry::new();
        let mut desc = descriptor("fetch", false);
        desc.requires_network = true;
        registry.register(desc, Arc::new(Echo)).await;
        let err = registry.invoke("fetch", vec![], true, None).await.unwrap_err();
        assert!(matches!(err, KernelError::SandboxViolation { limit, .. } if limit == "network_allowed"));
    }

    #[tokio::test]
    async fn sandboxed_call_exceeding_memory_bytes_is_a_sandbox_violation() {
        let registry = ToolRegistry::new();
        let mut desc = descriptor("echo", false);
        desc.resource_limits = ResourceLimits { memory_bytes: 4, ..Default::default() };
        registry.register(desc, Arc::new(Echo)).await;
        let err = registry
            .invoke("echo", vec![Value::String("this reply is far longer than 4 bytes".into())], true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::SandboxViolation { limit, .. } if limit == "memory_bytes"));
    }

    #[tokio::test]
    async fn re_registering_a_name_replaces_the_handler() {
        let registry = ToolRegistry::new();
        registry.register(descriptor("t", false), Arc::new(Echo)).await;
        registry.register(descriptor("t", true), Arc::new(Echo)).await;
        assert!(registry.get("t").await.unwrap().requires_sandbox);
    }
}
