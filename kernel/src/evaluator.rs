//! The instruction-language evaluator: a recursive, cooperatively-suspending
//! walk over an `mnemo_il::Expr` tree.
//!
//! Cancellation and timeouts are observed cooperatively at suspension
//! points rather than by pre-emption; `caliber-pcp`'s pattern of threading
//! an explicit state struct through every call instead of a singleton is
//! kept (`CognitionContext` here plays that role).

use crate::cognition::CognitionContext;
use crate::planner::{QueryPlanner, RetrievalQuery};
use crate::tools::ToolRegistry;
use crate::value::Value;
use mnemo_agents::AgentRegistry;
use mnemo_core::{
    AgentError, AgentId, EntityIdType, EventDef, KernelError, MemoryHit, MemoryKind,
    ResourceLimits, RetrievalMode, RuntimeError, RuntimeResult,
};
use mnemo_embed::EmbeddingService;
use mnemo_il::{Atom, Binding, Expr, Metadata};
use mnemo_storage::PersistenceAdapter;
use serde_json::{Map, Value as Json};
use std::str::FromStr;
use std::time::Duration;

/// Beyond this, an `AWAIT` with no explicit `timeout` is treated as having
/// none; the cognition's own wall-clock budget is what eventually ends it.
const NO_EXPLICIT_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 50);

pub struct Evaluator<'a> {
    storage: &'a dyn PersistenceAdapter,
    embeddings: &'a EmbeddingService,
    tools: &'a ToolRegistry,
    agents: &'a AgentRegistry,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        storage: &'a dyn PersistenceAdapter,
        embeddings: &'a EmbeddingService,
        tools: &'a ToolRegistry,
        agents: &'a AgentRegistry,
    ) -> Self {
        Self { storage, embeddings, tools, agents }
    }

    /// Evaluates one node, recursing into its children. Every branch checks
    /// `ctx.check_live()` before doing I/O so cancellation and the wall-clock
    /// budget are observed between AST nodes, not just at suspension points.
    pub fn eval<'b>(
        &'b self,
        expr: &'b Expr,
        ctx: &'b mut CognitionContext,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = RuntimeResult<Value>> + Send + 'b>>
    where
        'a: 'b,
    {
        Box::pin(async move {
            ctx.check_live()?;

            match expr {
                Expr::Atom { value, .. } => self.eval_atom(value, ctx),

                Expr::Query { intent, meta, .. } => {
                    let intent_value = self.eval(intent, ctx).await?;
                    let query = self.retrieval_query(value_to_text(&intent_value), meta.as_ref())?;
                    let planner = QueryPlanner::new(self.storage, self.embeddings);
                    let hits = planner.retrieve(&query).await?;
                    self.touch(&hits).await;
                    Ok(Value::Hits(hits))
                }

                Expr::Execute { tool, args, .. } => {
                    let values = self.eval_all(args, ctx).await?;
                    let descriptor = self
                        .tools
                        .get(tool)
                        .await
                        .ok_or_else(|| RuntimeError::Kernel(KernelError::UnknownTool { name: tool.clone() }))?;
                    validate_arity(&descriptor.input_schema, &values)?;
                    self.tools.invoke(tool, values, false, None).await.map_err(RuntimeError::Kernel)
                }

                Expr::Plan { steps, .. } => {
                    let mut last = Value::Null;
                    for step in steps {
                        last = self.eval(step, ctx).await?;
                        ctx.check_live()?;
                    }
                    Ok(last)
                }

                Expr::Communicate { recipient, message, .. } => {
                    let recipient_value = self.eval(recipient, ctx).await?;
                    let to = value_to_agent_id(&recipient_value).ok_or_else(|| {
                        RuntimeError::Kernel(KernelError::ArgumentError {
                            reason: "COMMUNICATE recipient must be an agent id".into(),
                        })
                    })?;
                    let message_value = self.eval(message, ctx).await?;
                    match self.agents.send_message(ctx.agent_id, to, message_value.to_json()).await {
                        Ok(message_id) => Ok(Value::MessageId(message_id)),
                        Err(RuntimeError::Agent(AgentError::NotRegistered { agent_id })) => {
                            Err(RuntimeError::Kernel(KernelError::UnknownAgent { id: agent_id }))
                        }
                        Err(other) => Err(other),
                    }
                }

                Expr::Let { bindings, body, .. } => self.eval_let(bindings, body, ctx).await,

                Expr::Try { body, fail_body, .. } => self.eval_try(body, fail_body, ctx).await,

                Expr::Await { event, meta, .. } => {
                    let selector = self.eval(event, ctx).await?;
                    let (event_type, source, filter) = match selector {
                        Value::EventSelector { event_type, source, filter } => (event_type, source, filter),
                        other => {
                            return Err(RuntimeError::Kernel(KernelError::ArgumentError {
                                reason: format!("AWAIT requires an event selector, got {other:?}"),
                            }))
                        }
                    };
                    let timeout = metadata_number(meta.as_ref(), "timeout").map(|ms| Duration::from_millis(ms.max(0.0) as u64));
                    let event_def = EventDef { event_type, source, filter, timeout };
                    self.await_event(event_def, ctx).await
                }

                Expr::SandboxedExecute { tool, args, limits, .. } => {
                    let values = self.eval_all(args, ctx).await?;
                    let descriptor = self
                        .tools
                        .get(tool)
                        .await
                        .ok_or_else(|| RuntimeError::Kernel(KernelError::UnknownTool { name: tool.clone() }))?;
                    validate_arity(&descriptor.input_schema, &values)?;
                    let resource_limits = resource_limits_from_metadata(limits.as_ref());
                    self.tools
                        .invoke(tool, values, true, Some(resource_limits))
                        .await
                        .map_err(RuntimeError::Kernel)
                }

                Expr::Clarify { question, options, .. } => {
                    let question_value = self.eval(question, ctx).await?;
                    let mut rendered_options = Vec::with_capacity(options.len());
                    for option in options {
                        rendered_options.push(value_to_text(&self.eval(option, ctx).await?));
                    }
                    Ok(Value::Clarify { question: value_to_text(&question_value), options: rendered_options })
                }

                Expr::Event { meta, .. } => Ok(Value::EventSelector {
                    event_type: metadata_string(Some(meta), "type").unwrap_or_default(),
                    source: metadata_string(Some(meta), "source").unwrap_or_default(),
                    filter: metadata_filter(Some(meta)),
                }),
            }
        })
    }

    fn eval_atom(&self, atom: &Atom, ctx: &CognitionContext) -> RuntimeResult<Value> {
        match atom {
            Atom::String(s) => Ok(Value::String(s.clone())),
            Atom::Number(n) => Ok(Value::Number(*n)),
            Atom::Boolean(b) => Ok(Value::Bool(*b)),
            Atom::Identifier(s) => Ok(Value::String(s.clone())),
            Atom::Variable(name) => ctx
                .scope
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::Kernel(KernelError::UnknownVariable { name: name.clone() })),
        }
    }

    async fn eval_all<'b>(&'b self, exprs: &'b [Expr], ctx: &'b mut CognitionContext) -> RuntimeResult<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval(expr, ctx).await?);
        }
        Ok(values)
    }

    async fn eval_let<'b>(
        &'b self,
        bindings: &'b [Binding],
        body: &'b Expr,
        ctx: &'b mut CognitionContext,
    ) -> RuntimeResult<Value> {
        ctx.scope.push_frame();
        for binding in bindings {
            match self.eval(&binding.value, ctx).await {
                Ok(value) => ctx.scope.bind(binding.name.clone(), value),
                Err(err) => {
                    ctx.scope.pop_frame();
                    return Err(err);
                }
            }
        }
        let result = self.eval(body, ctx).await;
        ctx.scope.pop_frame();
        result
    }

    async fn eval_try<'b>(
        &'b self,
        body: &'b Expr,
        fail_body: &'b Expr,
        ctx: &'b mut CognitionContext,
    ) -> RuntimeResult<Value> {
        match self.eval(body, ctx).await {
            Ok(value) => Ok(value),
            Err(err) if is_fatal(&err) => Err(err),
            Err(err) => {
                ctx.scope.push_frame();
                ctx.scope.bind("error", error_to_value(&err, body));
                let result = self.eval(fail_body, ctx).await;
                ctx.scope.pop_frame();
                result
            }
        }
    }

    async fn await_event(&self, event_def: EventDef, ctx: &CognitionContext) -> RuntimeResult<Value> {
        let explicit_timeout = event_def.timeout.unwrap_or(NO_EXPLICIT_TIMEOUT);
        let overall_deadline = ctx.remaining();
        let receiver = self.agents.subscribe(event_def.clone()).await;

        tokio::select! {
            result = receiver => {
                self.agents.unsubscribe(&event_def).await;
                match result {
                    Ok(event) => Ok(published_event_to_value(&event)),
                    Err(_) => Err(RuntimeError::Kernel(KernelError::AwaitTimeout)),
                }
            }
            _ = ctx.cancellation.cancelled() => {
                self.agents.unsubscribe(&event_def).await;
                Err(RuntimeError::Kernel(KernelError::Cancelled { id: ctx.cognition_id }))
            }
            _ = tokio::time::sleep(explicit_timeout) => {
                self.agents.unsubscribe(&event_def).await;
                Err(RuntimeError::Kernel(KernelError::AwaitTimeout))
            }
            _ = tokio::time::sleep(overall_deadline) => {
                self.agents.unsubscribe(&event_def).await;
                Err(RuntimeError::Kernel(KernelError::CognitionTimeout { id: ctx.cognition_id }))
            }
        }
    }

    /// Retries on `update()` before giving up on one hit.
    const TOUCH_MAX_RETRIES: u32 = 3;

    /// Bumps `access_count`/`last_accessed_at` for every returned hit.
    /// Best-effort: a record that still loses the optimistic-concurrency
    /// race after every retry just skips that one hit rather than failing
    /// the whole query.
    async fn touch(&self, hits: &[MemoryHit]) {
        for hit in hits {
            self.touch_one(hit.id).await;
        }
    }

    async fn touch_one(&self, id: mnemo_core::MemoryId) {
        for _ in 0..=Self::TOUCH_MAX_RETRIES {
            let Ok(Some(mut record)) = self.storage.get(id).await else { return };
            record.access_count += 1;
            record.last_accessed_at = Some(chrono::Utc::now());
            match self.storage.update(record).await {
                Ok(()) => return,
                Err(RuntimeError::Storage(mnemo_core::StorageError::Conflict { .. })) => continue,
                Err(_) => return,
            }
        }
    }

    fn retrieval_query(&self, text: String, meta: Option<&Metadata>) -> RuntimeResult<RetrievalQuery> {
        let mut query = RetrievalQuery { text: Some(text), ..RetrievalQuery::default() };
        query.kinds = metadata_string(meta, "kind").map(|raw| {
            raw.split(',').filter_map(|s| parse_memory_kind(s.trim())).collect::<Vec<_>>()
        });
        query.agent_id = metadata_string(meta, "agent").and_then(|s| AgentId::from_str(&s).ok());
        query.domain = metadata_string(meta, "domain");
        if let Some(k) = metadata_number(meta, "k") {
            if k < 0.0 {
                return Err(RuntimeError::Kernel(KernelError::ArgumentError {
                    reason: format!("k must not be negative, got {}", k),
                }));
            }
            query.k = k as usize;
        }
        if let Some(min_similarity) = metadata_number(meta, "min-similarity") {
            query.min_similarity = min_similarity as f32;
        }
        if let Some(mode) = metadata_string(meta, "mode") {
            query.mode = match mode.as_str() {
                "explore" => RetrievalMode::Explore,
                "connect" => RetrievalMode::Connect,
                _ => RetrievalMode::Standard,
            };
        }
        if let Some(include_degraded) = metadata_bool(meta, "include-degraded") {
            query.include_degraded = include_degraded;
        }
        Ok(query)
    }
}

fn is_fatal(err: &RuntimeError) -> bool {
    matches!(
        err,
        RuntimeError::Kernel(KernelError::CognitionTimeout { .. }) | RuntimeError::Kernel(KernelError::Cancelled { .. })
    )
}

fn error_to_value(err: &RuntimeError, failed_expr: &Expr) -> Value {
    let span = failed_expr.span();
    let mut map = std::collections::BTreeMap::new();
    map.insert("kind".into(), Value::String(error_kind(err)));
    map.insert("message".into(), Value::String(err.to_string()));
    map.insert("source-span".into(), Value::String(format!("{}:{}", span.line, span.column)));
    Value::Map(map)
}

fn error_kind(err: &RuntimeError) -> String {
    match err {
        RuntimeError::Storage(_) => "StorageUnavailable".into(),
        RuntimeError::Embedding(_) => "EmbeddingUnavailable".into(),
        RuntimeError::Parse(_) => "ParseError".into(),
        RuntimeError::Kernel(k) => kernel_error_kind(k),
        RuntimeError::Agent(_) => "UnknownAgent".into(),
        RuntimeError::Config(_) => "ConfigError".into(),
    }
}

fn kernel_error_kind(err: &KernelError) -> String {
    match err {
        KernelError::UnknownOperator { .. } => "UnknownOperator",
        KernelError::ArityError { .. } => "ArityError",
        KernelError::UnknownVariable { .. } => "UnknownVariable",
        KernelError::UnknownTool { .. } => "UnknownTool",
        KernelError::ArgumentError { .. } => "ArgumentError",
        KernelError::UnknownAgent { .. } => "UnknownAgent",
        KernelError::EmptyQuery => "EmptyQuery",
        KernelError::SandboxViolation { .. } => "SandboxViolation",
        KernelError::AwaitTimeout => "AwaitTimeout",
        KernelError::CognitionTimeout { .. } => "CognitionTimeout",
        KernelError::BackpressureRejected => "BackpressureRejected",
        KernelError::Cancelled { .. } => "Cancelled",
        KernelError::ToolCallFailed { .. } => "ToolCallFailed",
    }
    .to_string()
}

fn validate_arity(input_schema: &Json, args: &[Value]) -> RuntimeResult<()> {
    let len = args.len() as u64;
    if let Some(min) = input_schema.get("minItems").and_then(Json::as_u64) {
        if len < min {
            return Err(RuntimeError::Kernel(KernelError::ArityError {
                operator: "EXECUTE".into(),
                expected: format!("at least {min}"),
                got: args.len(),
            }));
        }
    }
    if let Some(max) = input_schema.get("maxItems").and_then(Json::as_u64) {
        if len > max {
            return Err(RuntimeError::Kernel(KernelError::ArityError {
                operator: "EXECUTE".into(),
                expected: format!("at most {max}"),
                got: args.len(),
            }));
        }
    }
    Ok(())
}

fn resource_limits_from_metadata(limits: Option<&Metadata>) -> ResourceLimits {
    let mut resolved = ResourceLimits::default();
    if let Some(cpu) = metadata_number(limits, "cpu-seconds") {
        resolved.cpu_seconds = cpu as u64;
    }
    if let Some(memory) = metadata_number(limits, "memory-bytes") {
        resolved.memory_bytes = memory as u64;
    }
    if let Some(wall_clock) = metadata_number(limits, "wall-clock-seconds") {
        resolved.wall_clock_seconds = wall_clock as u64;
    }
    if let Some(network) = metadata_bool(limits, "network-allowed") {
        resolved.network_allowed = network;
    }
    resolved
}

fn metadata_string(meta: Option<&Metadata>, key: &str) -> Option<String> {
    match meta?.get(key)? {
        Atom::String(s) | Atom::Identifier(s) => Some(s.clone()),
        Atom::Number(n) => Some(n.to_string()),
        Atom::Boolean(b) => Some(b.to_string()),
        Atom::Variable(_) => None,
    }
}

fn metadata_number(meta: Option<&Metadata>, key: &str) -> Option<f64> {
    match meta?.get(key)? {
        Atom::Number(n) => Some(*n),
        _ => None,
    }
}

fn metadata_bool(meta: Option<&Metadata>, key: &str) -> Option<bool> {
    match meta?.get(key)? {
        Atom::Boolean(b) => Some(*b),
        _ => None,
    }
}

fn metadata_filter(meta: Option<&Metadata>) -> Option<Map<String, Json>> {
    let meta = meta?;
    let mut filter = Map::new();
    for (key, atom) in &meta.entries {
        if key == "type" || key == "source" || key == "timeout" {
            continue;
        }
        filter.insert(key.clone(), atom_to_json(atom));
    }
    if filter.is_empty() {
        None
    } else {
        Some(filter)
    }
}

fn atom_to_json(atom: &Atom) -> Json {
    match atom {
        Atom::String(s) | Atom::Identifier(s) => Json::String(s.clone()),
        Atom::Number(n) => serde_json::Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
        Atom::Boolean(b) => Json::Bool(*b),
        Atom::Variable(_) => Json::Null,
    }
}

fn parse_memory_kind(s: &str) -> Option<MemoryKind> {
    match s.to_ascii_lowercase().as_str() {
        "episodic" => Some(MemoryKind::Episodic),
        "semantic" => Some(MemoryKind::Semantic),
        "procedural" => Some(MemoryKind::Procedural),
        _ => None,
    }
}

fn value_to_agent_id(value: &Value) -> Option<AgentId> {
    value.as_str().and_then(|s| AgentId::from_str(s).ok())
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_json().to_string(),
    }
}

fn published_event_to_value(event: &mnemo_agents::PublishedEvent) -> Value {
    let mut map = std::collections::BTreeMap::new();
    map.insert("type".into(), Value::String(event.event_type.clone()));
    map.insert("source".into(), Value::String(event.source.clone()));
    for (key, value) in &event.payload {
        map.insert(key.clone(), Value::from_json(value));
    }
    Value::Map(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolHandler;
    use async_trait::async_trait;
    use mnemo_core::{BusConfig, CognitionId, EmbeddingConfig, ToolDescriptor};
    use mnemo_embed::provider::test_support::StubEmbeddingProvider;
    use mnemo_il::parse_program;
    use mnemo_storage::InMemoryAdapter;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn embeddings() -> EmbeddingService {
        let provider = Arc::new(StubEmbeddingProvider { dimensions: 8, model_id: "s".into(), fail: false });
        EmbeddingService::new(provider, &EmbeddingConfig { dim: 8, cache_ttl_seconds: 3600, cache_capacity: 10, endpoint: None })
    }

    fn ctx() -> CognitionContext {
        CognitionContext::new(CognitionId::now_v7(), AgentId::now_v7(), Duration::from_secs(60))
    }

    async fn eval_source(source: &str) -> RuntimeResult<Value> {
        let program = parse_program(source).expect("valid IL source");
        let storage = InMemoryAdapter::new();
        let embed = embeddings();
        let tools = ToolRegistry::new();
        let agents = AgentRegistry::new(&BusConfig::default());
        let evaluator = Evaluator::new(&storage, &embed, &tools, &agents);
        let mut context = ctx();
        evaluator.eval(&program.expr, &mut context).await
    }

    #[tokio::test]
    async fn plan_evaluates_steps_in_order_and_returns_the_last_value() {
        let value = eval_source(r#"(PLAN "first" "second" 3)"#).await.unwrap();
        assert_eq!(value, Value::Number(3.0));
    }

    #[tokio::test]
    async fn let_binding_is_visible_in_body_and_not_after() {
        let value = eval_source(r#"(LET ((x 5)) $x)"#).await.unwrap();
        assert_eq!(value, Value::Number(5.0));
    }

    #[tokio::test]
    async fn unbound_variable_is_rejected() {
        let err = eval_source("$missing").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Kernel(KernelError::UnknownVariable { .. })));
    }

    #[tokio::test]
    async fn try_catches_a_non_fatal_error_and_binds_dollar_error() {
        let value = eval_source(r#"(TRY $missing ON-FAIL $error)"#).await.unwrap();
        match value {
            Value::Map(map) => assert_eq!(map.get("kind"), Some(&Value::String("UnknownVariable".into()))),
            other => panic!("expected a map, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dollar_error_does_not_leak_past_try() {
        let err = eval_source(r#"(PLAN (TRY $missing ON-FAIL "recovered") $error)"#).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Kernel(KernelError::UnknownVariable { .. })));
    }

    #[tokio::test]
    async fn clarify_short_circuits_with_a_clarification_value() {
        let value = eval_source(r#"(CLARIFY "pick one" "a" "b")"#).await.unwrap();
        assert!(matches!(value, Value::Clarify { .. }));
    }

    #[tokio::test]
    async fn query_with_k_zero_returns_no_hits() {
        let value = eval_source(r#"(QUERY "anything" {k=0})"#).await.unwrap();
        assert_eq!(value, Value::Hits(vec![]));
    }

    #[tokio::test]
    async fn query_with_negative_k_is_an_argument_error() {
        let err = eval_source(r#"(QUERY "anything" {k=-1})"#).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Kernel(KernelError::ArgumentError { .. })));
    }

    #[tokio::test]
    async fn execute_of_an_unregistered_tool_is_unknown_tool() {
        let err = eval_source(r#"(EXECUTE missing-tool)"#).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Kernel(KernelError::UnknownTool { .. })));
    }

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, args: Vec<Value>) -> Result<Value, KernelError> {
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        }
    }

    #[tokio::test]
    async fn execute_dispatches_to_a_registered_tool() {
        let program = parse_program(r#"(EXECUTE echo "hi")"#).unwrap();
        let storage = InMemoryAdapter::new();
        let embed = embeddings();
        let tools = ToolRegistry::new();
        tools
            .register(
                ToolDescriptor {
                    name: "echo".into(),
                    input_schema: serde_json::json!({}),
                    output_schema: serde_json::json!({}),
                    requires_sandbox: false,
                    requires_network: false,
                    resource_limits: ResourceLimits::default(),
                },
                Arc::new(Echo),
            )
            .await;
        let agents = AgentRegistry::new(&BusConfig::default());
        let evaluator = Evaluator::new(&storage, &embed, &tools, &agents);
        let mut context = ctx();
        let value = evaluator.eval(&program.expr, &mut context).await.unwrap();
        assert_eq!(value, Value::String("hi".into()));
    }

    #[tokio::test]
    async fn communicate_to_an_unknown_agent_is_rejected() {
        let err = eval_source(r#"(COMMUNICATE "00000000-0000-0000-0000-000000000000" "hi")"#).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Kernel(KernelError::UnknownAgent { .. })));
    }

    #[tokio::test]
    async fn communicate_enqueues_a_message_on_the_recipient_inbox() {
        let program = parse_program(r#"(COMMUNICATE $to "hello")"#).unwrap();
        let storage = InMemoryAdapter::new();
        let embed = embeddings();
        let tools = ToolRegistry::new();
        let agents = AgentRegistry::new(&BusConfig::default());
        let recipient = AgentId::now_v7();
        agents.register(recipient, BTreeSet::new()).await.unwrap();
        let evaluator = Evaluator::new(&storage, &embed, &tools, &agents);
        let mut context = ctx();
        context.scope.bind("to", Value::String(recipient.to_string()));
        let value = evaluator.eval(&program.expr, &mut context).await.unwrap();
        assert!(matches!(value, Value::MessageId(_)));
        let received = agents.receive(recipient, Some(Duration::from_millis(50))).await.unwrap();
        assert_eq!(received.unwrap().payload, Json::String("hello".into()));
    }

    #[tokio::test]
    async fn await_with_an_explicit_timeout_times_out_when_nothing_is_published() {
        let program = parse_program(r#"(AWAIT (EVENT {type=done, source=worker}) {timeout=10})"#).unwrap();
        let storage = InMemoryAdapter::new();
        let embed = embeddings();
        let tools = ToolRegistry::new();
        let agents = AgentRegistry::new(&BusConfig::default());
        let evaluator = Evaluator::new(&storage, &embed, &tools, &agents);
        let mut context = ctx();
        let err = evaluator.eval(&program.expr, &mut context).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Kernel(KernelError::AwaitTimeout)));
    }

    #[tokio::test]
    async fn cancelling_a_cognition_interrupts_a_pending_await() {
        let program = parse_program(r#"(AWAIT (EVENT {type=done, source=worker}))"#).unwrap();
        let storage = InMemoryAdapter::new();
        let embed = embeddings();
        let tools = ToolRegistry::new();
        let agents = AgentRegistry::new(&BusConfig::default());
        let evaluator = Evaluator::new(&storage, &embed, &tools, &agents);
        let mut context = ctx();
        let cancellation = context.cancellation.clone();
        let eval_future = evaluator.eval(&program.expr, &mut context);
        tokio::pin!(eval_future);
        cancellation.cancel();
        let err = eval_future.await.unwrap_err();
        assert!(matches!(err, RuntimeError::Kernel(KernelError::Cancelled { .. })));
    }
}
