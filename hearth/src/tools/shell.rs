//! Run a shell command. Requires confirmation before execution.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolCallContext, ToolError, ToolOutput, ToolSpec};

/// Tool name: run a shell command.
pub const TOOL_SHELL: &str = "shell";

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_OUTPUT_CHARS: usize = 50_000;

pub struct ShellTool;

impl ShellTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        TOOL_SHELL
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_SHELL.to_string(),
            description: Some(
                "Run a shell command and return combined stdout/stderr.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Command line passed to sh -c."
                    },
                    "timeout_secs": {
                        "type": "integer",
                        "description": "Optional timeout in seconds."
                    }
                },
                "required": ["command"]
            }),
            category: Some("system".to_string()),
            requires_confirmation: true,
            context_params: vec!["working_dir".to_string()],
        }
    }

    async fn call(
        &self,
        args: Value,
        _ctx: Option<&ToolCallContext>,
    ) -> Result<ToolOutput, ToolError> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing command".to_string()))?;
        let timeout = Duration::from_secs(
            args.get("timeout_secs")
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        );

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(dir) = args.get("working_dir").and_then(|v| v.as_str()) {
            cmd.current_dir(dir);
        }

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| ToolError::Timeout(timeout))?
            .map_err(|e| ToolError::Execution(format!("spawn failed: {e}")))?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        if !output.status.success() {
            text.push_str(&format!("\n(exit status: {})", output.status));
        }

        if text.chars().count() > MAX_OUTPUT_CHARS {
            let cut: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
            return Ok(ToolOutput {
                text: cut,
                truncated: true,
            });
        }
        Ok(ToolOutput::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_command_and_captures_output() {
        let tool = ShellTool::new();
        let out = tool
            .call(json!({"command": "echo hello"}), None)
            .await
            .unwrap();
        assert_eq!(out.text.trim(), "hello");
        assert!(!out.truncated);
    }

    #[tokio::test]
    async fn reports_nonzero_exit_status() {
        let tool = ShellTool::new();
        let out = tool.call(json!({"command": "false"}), None).await.unwrap();
        assert!(out.text.contains("exit status"));
    }

    #[tokio::test]
    async fn spec_demands_confirmation() {
        let tool = ShellTool::new();
        assert!(tool.spec().requires_confirmation);
        assert!(tool.spec().context_params.contains(&"working_dir".into()));
    }
}
