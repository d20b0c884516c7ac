//! # Hearth
//!
//! The agent execution core of a local, multi-tenant assistant platform.
//! Adapters hand a user message to the [`Dispatcher`]; it resolves the tenant
//! [`Context`](persistence::Context) and conversation, persists the turn,
//! classifies intent, and either streams a direct completion or runs the
//! agentic pipeline: plan → validate → execute → supervise, with bounded
//! retries and replans. Everything a request emits flows through one typed
//! event stream (the `agent-stream` crate).
//!
//! ## Design principles
//!
//! - **Per-request isolation**: no singleton service. The
//!   [`ServiceFactory`] builds an [`AgentService`](agent::AgentService) per
//!   request with its own registry clone (base tools ∪ the context's MCP
//!   tools, permission-filtered) and a context-scoped memory view.
//! - **Immutable templates**: the base [`ToolRegistry`](tools::ToolRegistry)
//!   and [`SkillRegistry`](skills::SkillRegistry) are built at startup and
//!   never mutated; only clones are filtered.
//! - **Classified failures**: tools wrap external errors into the
//!   [`CoreError`](error::CoreError) taxonomy; the step supervisor maps
//!   observations to `SUCCESS | RETRY | REPLAN | ABORT`, and budgets bound
//!   every loop.
//! - **Context isolation**: memory points carry the context id and every
//!   search filters on it; MCP clients are pooled per context; permissions
//!   are per context.
//!
//! ## Main modules
//!
//! - [`dispatch`]: [`Dispatcher`], [`RequestMetadata`] — the adapter-facing
//!   entry point.
//! - [`factory`]: [`ServiceFactory`] — per-request service construction.
//! - [`agent`]: planner, plan supervisor, step executor, step supervisor,
//!   [`AgentService`](agent::AgentService), [`Plan`](agent::Plan) types.
//! - [`skills`]: [`Skill`](skills::Skill) front-matter templates,
//!   [`SkillRegistry`](skills::SkillRegistry),
//!   [`SkillExecutor`](skills::SkillExecutor) worker loop.
//! - [`tools`]: [`Tool`](tools::Tool) trait, [`ToolRegistry`](tools::ToolRegistry),
//!   YAML specs, builtins.
//! - [`mcp`]: Streamable-HTTP sessions, [`McpClientPool`](mcp::McpClientPool),
//!   token resolvers, tool adapter.
//! - [`memory`]: [`Embedder`](memory::Embedder), [`VectorIndex`](memory::VectorIndex),
//!   [`MemoryStore`](memory::MemoryStore) scoped view.
//! - [`persistence`]: [`Database`](persistence::Database) trait and the
//!   SQLite implementation.
//! - [`llm`]: [`LlmGateway`](llm::LlmGateway), profile routing,
//!   [`MockLlm`](llm::MockLlm), [`OpenAiGateway`](llm::OpenAiGateway).
//! - [`error`]: the system-wide taxonomy with stable codes.
//! - [`config`]: [`CoreConfig`] and defaults.

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod llm;
pub mod mcp;
pub mod memory;
pub mod message;
pub mod persistence;
pub mod skills;
pub mod tools;

pub use config::CoreConfig;
pub use dispatch::{Dispatcher, RequestMetadata};
pub use error::CoreError;
pub use factory::ServiceFactory;
pub use message::Message;
