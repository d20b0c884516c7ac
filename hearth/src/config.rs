//! Core configuration: the recognised options and their defaults.

use std::time::Duration;

/// Options the core recognises. Adapters build one of these at startup and
/// hand it to the dispatcher; per-skill turn budgets come from skill metadata
/// and fall back to `default_skill_turns`.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Upper bound on REPLAN cycles per request.
    pub max_replans: u32,
    /// Upper bound on RETRY per step.
    pub max_retries_per_step: u32,
    /// Worker-loop budget for skills that do not declare their own.
    pub default_skill_turns: u32,
    /// How many recent messages enter the planner context.
    pub history_window_messages: usize,
    /// Freshness threshold for MCP cached liveness.
    pub mcp_health_ttl: Duration,
    /// Bound on one MCP connect attempt.
    pub mcp_connect_timeout: Duration,
    /// Bound on one MCP liveness ping.
    pub mcp_ping_timeout: Duration,
    /// Bound on one tool invocation inside a step.
    pub tool_timeout: Duration,
    /// Whole-request ceiling for the CHAT route.
    pub chat_timeout: Duration,
    /// Whole-request ceiling for the AGENTIC route.
    pub agentic_timeout: Duration,
    /// Capacity of one request's event channel.
    pub event_buffer: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_replans: 3,
            max_retries_per_step: 1,
            default_skill_turns: 5,
            history_window_messages: 20,
            mcp_health_ttl: Duration::from_secs(30),
            mcp_connect_timeout: Duration::from_secs(15),
            mcp_ping_timeout: Duration::from_secs(3),
            tool_timeout: Duration::from_secs(60),
            chat_timeout: Duration::from_secs(120),
            agentic_timeout: Duration::from_secs(600),
            event_buffer: agent_stream::sink::DEFAULT_EVENT_BUFFER,
        }
    }
}

impl CoreConfig {
    pub fn with_max_replans(mut self, n: u32) -> Self {
        self.max_replans = n;
        self
    }

    pub fn with_max_retries_per_step(mut self, n: u32) -> Self {
        self.max_retries_per_step = n;
        self
    }

    pub fn with_history_window(mut self, n: usize) -> Self {
        self.history_window_messages = n;
        self
    }

    pub fn with_mcp_health_ttl(mut self, ttl: Duration) -> Self {
        self.mcp_health_ttl = ttl;
        self
    }
}
