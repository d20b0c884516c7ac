//! Current time tool.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolCallContext, ToolError, ToolOutput, ToolSpec};

/// Tool name: current time as an RFC 3339 timestamp.
pub const TOOL_CURRENT_TIME: &str = "current_time";

pub struct CurrentTimeTool;

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        TOOL_CURRENT_TIME
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_CURRENT_TIME.to_string(),
            description: Some("Current UTC time as an RFC 3339 timestamp.".to_string()),
            input_schema: json!({"type": "object", "properties": {}}),
            category: Some("utility".to_string()),
            requires_confirmation: false,
            context_params: Vec::new(),
        }
    }

    async fn call(
        &self,
        _args: Value,
        _ctx: Option<&ToolCallContext>,
    ) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(chrono::Utc::now().to_rfc3339()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_parseable_timestamp() {
        let out = CurrentTimeTool::new().call(json!({}), None).await.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&out.text).is_ok());
    }
}
