//! MCP session over Streamable HTTP: POST JSON-RPC to a URL, parse the
//! response.
//!
//! Implements the Streamable HTTP transport: POST a single JSON-RPC message
//! with `Accept: application/json, text/event-stream`, optional
//! `MCP-Session-Id` and `MCP-Protocol-Version` headers, and a bearer token.
//! Responses may come back as one JSON object or as an SSE body whose data
//! lines carry the JSON-RPC message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::McpError;

/// MCP protocol version sent in the handshake and on every request.
const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// JSON-RPC error object in a response body.
#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC response body (id + result or error).
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    id: Option<Value>,
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

/// Parses a JSON-RPC response from an HTTP body. Supports both
/// `application/json` (single object) and `text/event-stream` (data lines).
/// Returns the first message that carries a result or error.
fn parse_json_rpc_from_body(
    body: &str,
    content_type: Option<&reqwest::header::HeaderValue>,
) -> Result<JsonRpcResponse, McpError> {
    let is_sse = content_type
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("text/event-stream"))
        .unwrap_or(false);

    if !is_sse {
        return serde_json::from_str(body)
            .map_err(|e| McpError::Transport(format!("response json: {e}")));
    }

    let mut data_buffer = String::new();
    let try_parse = |buffer: &str| -> Option<JsonRpcResponse> {
        serde_json::from_str::<JsonRpcResponse>(buffer)
            .ok()
            .filter(|r| r.result.is_some() || r.error.is_some())
    };

    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data: ") {
            if data_buffer.is_empty() {
                data_buffer = data.to_string();
            } else {
                data_buffer.push('\n');
                data_buffer.push_str(data);
            }
            if let Some(r) = try_parse(&data_buffer) {
                return Ok(r);
            }
        } else if line.trim().is_empty() && !data_buffer.is_empty() {
            if let Some(r) = try_parse(&data_buffer) {
                return Ok(r);
            }
            data_buffer.clear();
        }
    }
    if let Some(r) = try_parse(&data_buffer) {
        return Ok(r);
    }
    Err(McpError::Transport(
        "SSE stream: no JSON-RPC response found".into(),
    ))
}

/// One authenticated MCP session against a Streamable HTTP endpoint.
///
/// Safe to use concurrently: requests are independent POSTs; only the session
/// id header is shared state.
pub struct McpHttpSession {
    client: Client,
    url: String,
    bearer: Option<String>,
    /// Session id from the server's `MCP-Session-Id` header; echoed on
    /// subsequent requests.
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl McpHttpSession {
    /// Connects and completes the initialize handshake.
    pub async fn connect(
        url: impl Into<String>,
        bearer: Option<String>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let session = Self {
            client,
            url: url.into(),
            bearer,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
        };
        session.initialize().await?;
        Ok(session)
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": {
                "name": "hearth-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = self
            .request("initialize", params)
            .await
            .map_err(|e| McpError::Initialize(e.to_string()))?;
        if result.is_null() {
            return Err(McpError::Initialize("empty initialize result".into()));
        }
        self.notify("notifications/initialized", json!({})).await?;
        Ok(())
    }

    fn apply_headers(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req = req
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION);
        if let Some(ref bearer) = self.bearer {
            req = req.bearer_auth(bearer);
        }
        let session_id = self.session_id.lock().map(|g| g.clone()).unwrap_or(None);
        if let Some(id) = session_id {
            req = req.header("MCP-Session-Id", id);
        }
        req
    }

    /// Sends one JSON-RPC request and returns its result.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .apply_headers(self.client.post(&self.url).json(&body))
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        if let Some(session) = response
            .headers()
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut guard) = self.session_id.lock() {
                *guard = Some(session.to_string());
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Transport(format!(
                "{method} returned HTTP {status}"
            )));
        }

        let content_type = response.headers().get(reqwest::header::CONTENT_TYPE).cloned();
        let text = response
            .text()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let parsed = parse_json_rpc_from_body(&text, content_type.as_ref())?;
        if let Some(err) = parsed.error {
            return Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    /// Sends one JSON-RPC notification (no response expected).
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.apply_headers(self.client.post(&self.url).json(&body))
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        Ok(())
    }

    /// Liveness probe, bounded by `timeout`.
    pub async fn ping(&self, timeout: Duration) -> Result<(), McpError> {
        tokio::time::timeout(timeout, self.request("ping", json!({})))
            .await
            .map_err(|_| McpError::Timeout(timeout))??;
        Ok(())
    }

    /// `tools/list`, mapped to our tool specs (unprefixed remote names).
    pub async fn list_tools(&self) -> Result<Vec<crate::tools::ToolSpec>, McpError> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(tools
            .into_iter()
            .filter_map(|t| {
                let name = t.get("name")?.as_str()?.to_string();
                Some(crate::tools::ToolSpec {
                    name,
                    description: t
                        .get("description")
                        .and_then(|d| d.as_str())
                        .map(String::from),
                    input_schema: t
                        .get("inputSchema")
                        .cloned()
                        .unwrap_or_else(|| json!({"type": "object"})),
                    category: Some("mcp".to_string()),
                    requires_confirmation: false,
                    context_params: Vec::new(),
                })
            })
            .collect())
    }

    /// `tools/call`; concatenates text content blocks.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<String, McpError> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": args}))
            .await?;

        let text: String = result
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if result
            .get("isError")
            .and_then(|e| e.as_bool())
            .unwrap_or(false)
        {
            return Err(McpError::ToolCall(text));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_body() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#;
        let parsed = parse_json_rpc_from_body(body, None).unwrap();
        assert_eq!(parsed.result.unwrap()["ok"], true);
    }

    #[test]
    fn parses_sse_body_with_data_lines() {
        let ct = reqwest::header::HeaderValue::from_static("text/event-stream");
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"n\":3}}\n\n";
        let parsed = parse_json_rpc_from_body(body, Some(&ct)).unwrap();
        assert_eq!(parsed.result.unwrap()["n"], 3);
    }

    #[test]
    fn surfaces_rpc_error_objects() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}"#;
        let parsed = parse_json_rpc_from_body(body, None).unwrap();
        let err = parsed.error.unwrap();
        assert_eq!(err.code, -32601);
        assert!(err.message.contains("no such method"));
    }

    #[test]
    fn sse_without_response_is_a_transport_error() {
        let ct = reqwest::header::HeaderValue::from_static("text/event-stream");
        let err = parse_json_rpc_from_body("data: {\"jsonrpc\":\"2.0\"}\n\n", Some(&ct)).unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
    }
}
