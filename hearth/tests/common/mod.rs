//! Shared fixtures: scripted gateway harness, stub tools, event collection.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use agent_stream::{EventEnvelope, EventStream};
use hearth::llm::MockLlm;
use hearth::mcp::{McpClientPool, StaticTokenResolver};
use hearth::memory::{HashingEmbedder, InMemoryVectorIndex, VectorIndex};
use hearth::persistence::SqliteDatabase;
use hearth::skills::{Skill, SkillRegistry};
use hearth::tools::{Tool, ToolCallContext, ToolError, ToolOutput, ToolRegistry, ToolSpec};
use hearth::{CoreConfig, Dispatcher, ServiceFactory};

use tokio_stream::StreamExt;

/// How a stub tool behaves when called.
pub enum StubBehavior {
    /// Always succeed with this text.
    Reply(String),
    /// Fail transiently N times, then succeed with the text.
    FlakyThenReply(u32, String),
    /// Always fail with an execution error.
    AlwaysFail(String),
}

/// Registrable stub tool that counts its invocations.
pub struct StubTool {
    name: String,
    behavior: StubBehavior,
    requires_confirmation: bool,
    required_args: Vec<String>,
    pub calls: Arc<AtomicU32>,
    failures_left: AtomicU32,
}

impl StubTool {
    pub fn new(name: &str, behavior: StubBehavior) -> Self {
        let failures = match &behavior {
            StubBehavior::FlakyThenReply(n, _) => *n,
            _ => 0,
        };
        Self {
            name: name.to_string(),
            behavior,
            requires_confirmation: false,
            required_args: Vec::new(),
            calls: Arc::new(AtomicU32::new(0)),
            failures_left: AtomicU32::new(failures),
        }
    }

    pub fn reply(name: &str, text: &str) -> Self {
        Self::new(name, StubBehavior::Reply(text.to_string()))
    }

    pub fn with_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn with_required_args(mut self, args: &[&str]) -> Self {
        self.required_args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> ToolSpec {
        let properties: serde_json::Map<String, Value> = self
            .required_args
            .iter()
            .map(|a| (a.clone(), json!({"type": "string"})))
            .collect();
        ToolSpec {
            name: self.name.clone(),
            description: Some(format!("stub tool {}", self.name)),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": self.required_args,
            }),
            category: Some("test".to_string()),
            requires_confirmation: self.requires_confirmation,
            context_params: Vec::new(),
        }
    }

    async fn call(
        &self,
        _args: Value,
        _ctx: Option<&ToolCallContext>,
    ) -> Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            StubBehavior::Reply(text) => Ok(ToolOutput::text(text.clone())),
            StubBehavior::FlakyThenReply(_, text) => {
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    Err(ToolError::Transport("connection reset".to_string()))
                } else {
                    Ok(ToolOutput::text(text.clone()))
                }
            }
            StubBehavior::AlwaysFail(message) => Err(ToolError::Execution(message.clone())),
        }
    }
}

/// Everything a dispatcher test needs, wired over temp storage and mocks.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub db: Arc<SqliteDatabase>,
    pub llm: Arc<MockLlm>,
    pub index: Arc<InMemoryVectorIndex>,
    _db_file: NamedTempFile,
}

/// Installs a tracing subscriber once per test binary so library events show
/// up under `RUST_LOG=... cargo test -- --nocapture`.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

impl Harness {
    pub fn new(llm: MockLlm, registry: ToolRegistry, skills: Vec<Skill>, config: CoreConfig) -> Self {
        init_logging();
        let llm = Arc::new(llm);
        let db_file = NamedTempFile::new().unwrap();
        let db = Arc::new(SqliteDatabase::new(db_file.path()).unwrap());
        let index = Arc::new(InMemoryVectorIndex::new());
        let skills =
            Arc::new(SkillRegistry::from_skills(skills, &registry).expect("valid test skills"));
        let pool = Arc::new(McpClientPool::new(
            Vec::new(),
            Arc::new(StaticTokenResolver::default()),
            &config,
        ));
        let factory = Arc::new(ServiceFactory::new(
            registry,
            skills,
            pool,
            Arc::clone(&index) as Arc<dyn VectorIndex>,
            Arc::new(HashingEmbedder::new(64)),
            llm.clone(),
            config.clone(),
        ));
        let dispatcher = Dispatcher::new(factory, db.clone(), llm.clone(), config);
        Self {
            dispatcher,
            db,
            llm,
            index,
            _db_file: db_file,
        }
    }
}

/// Drains a stream to completion.
pub async fn collect(mut stream: EventStream) -> Vec<EventEnvelope> {
    let mut events = Vec::new();
    while let Some(envelope) = stream.next().await {
        events.push(envelope);
    }
    events
}

/// Event kinds in emission order.
pub fn kinds(events: &[EventEnvelope]) -> Vec<&'static str> {
    events.iter().map(|e| e.event.kind_name()).collect()
}

/// Asserts the protocol-level stream invariants: strictly increasing seq, a
/// single terminal event, and `plan` (when present) before any `step_start`.
pub fn assert_stream_invariants(events: &[EventEnvelope]) {
    assert!(!events.is_empty(), "stream must not be empty");

    let mut last_seq = 0;
    for envelope in events {
        assert!(
            envelope.seq > last_seq,
            "seq {} not after {}",
            envelope.seq,
            last_seq
        );
        last_seq = envelope.seq;
    }

    let terminal_positions: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.event.is_terminal())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(
        terminal_positions.len(),
        1,
        "expected exactly one terminal event, kinds: {:?}",
        kinds(events)
    );

    let first_plan = events.iter().position(|e| e.event.kind_name() == "plan");
    let first_step = events
        .iter()
        .position(|e| e.event.kind_name() == "step_start");
    if let (Some(plan), Some(step)) = (first_plan, first_step) {
        assert!(plan < step, "plan must precede the first step_start");
    }
}

/// Concatenated content deltas.
pub fn content_text(events: &[EventEnvelope]) -> String {
    events
        .iter()
        .filter_map(|e| match &e.event {
            agent_stream::AgentEvent::Content { delta, .. } => Some(delta.clone()),
            _ => None,
        })
        .collect()
}

/// The standard two-step plan JSON used across pipeline tests.
pub fn tool_then_completion_plan(tool: &str, args: Value) -> String {
    json!({
        "steps": [
            {"kind": "tool", "target": tool, "args": args, "rationale": "use the tool"},
            {"kind": "completion"}
        ]
    })
    .to_string()
}
