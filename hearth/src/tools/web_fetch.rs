//! Fetch a URL over HTTP GET and return the body text.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolCallContext, ToolError, ToolOutput, ToolSpec};

/// Tool name: fetch a page over HTTP.
pub const TOOL_WEB_FETCH: &str = "web_fetch";

/// Bodies longer than this are cut and flagged as truncated.
const MAX_BODY_CHARS: usize = 100_000;

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Custom client for configuring timeouts or proxies.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        TOOL_WEB_FETCH
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_WEB_FETCH.to_string(),
            description: Some(
                "Fetch a web page over HTTP GET and return its body as text.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "Absolute http(s) URL to fetch."
                    }
                },
                "required": ["url"]
            }),
            category: Some("web".to_string()),
            requires_confirmation: false,
            context_params: Vec::new(),
        }
    }

    async fn call(
        &self,
        args: Value,
        _ctx: Option<&ToolCallContext>,
    ) -> Result<ToolOutput, ToolError> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing url".to_string()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidInput(format!(
                "url must be http(s): {url}"
            )));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ToolError::Transport(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(ToolError::Execution(format!("{url} returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        if body.chars().count() > MAX_BODY_CHARS {
            let cut: String = body.chars().take(MAX_BODY_CHARS).collect();
            return Ok(ToolOutput {
                text: cut,
                truncated: true,
            });
        }
        Ok(ToolOutput::text(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_url() {
        let tool = WebFetchTool::new();
        let err = tool
            .call(json!({"url": "file:///etc/passwd"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn rejects_missing_url() {
        let tool = WebFetchTool::new();
        let err = tool.call(json!({}), None).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
