//! MCP client pool: connection lifecycle, caching, single-flight, and
//! registry integration, against a local JSON-RPC server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use hearth::mcp::{
    register_mcp_tools, ClientStatus, McpClientPool, McpProviderConfig, StaticTokenResolver,
};
use hearth::tools::ToolRegistry;
use hearth::CoreConfig;

async fn read_http_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = stream.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let header_end = pos + 4;
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
            let content_length = headers
                .lines()
                .find_map(|line| {
                    let lower = line.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                })
                .unwrap_or(0);
            let mut body = buf[header_end..].to_vec();
            while body.len() < content_length {
                let m = stream.read(&mut tmp).await.unwrap();
                if m == 0 {
                    break;
                }
                body.extend_from_slice(&tmp[..m]);
            }
            return String::from_utf8_lossy(&body[..content_length]).to_string();
        }
    }
    String::new()
}

async fn write_http_response(stream: &mut TcpStream, status: &str, body: &str) {
    let resp = format!(
        "HTTP/1.1 {}\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(resp.as_bytes()).await.unwrap();
}

/// Spawns a minimal MCP server; returns its address and the initialize
/// counter.
async fn spawn_mcp_server() -> (std::net::SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let initializes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&initializes);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let body = read_http_request(&mut stream).await;
                let request: serde_json::Value =
                    serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
                let id = request.get("id").cloned().unwrap_or(json!(null));
                let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
                match method {
                    "initialize" => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let body = json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {"protocolVersion": "2025-03-26"}
                        })
                        .to_string();
                        write_http_response(&mut stream, "200 OK", &body).await;
                    }
                    "notifications/initialized" => {
                        write_http_response(&mut stream, "202 Accepted", "{}").await;
                    }
                    "tools/list" => {
                        let body = json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {"tools": [
                                {"name": "echo", "description": "echo back", "inputSchema": {"type": "object"}}
                            ]}
                        })
                        .to_string();
                        write_http_response(&mut stream, "200 OK", &body).await;
                    }
                    "tools/call" => {
                        let body = json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {"content": [{"type": "text", "text": "echo-ok"}]}
                        })
                        .to_string();
                        write_http_response(&mut stream, "200 OK", &body).await;
                    }
                    "ping" => {
                        let body = json!({"jsonrpc": "2.0", "id": id, "result": {}}).to_string();
                        write_http_response(&mut stream, "200 OK", &body).await;
                    }
                    _ => {
                        let body = json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": {"code": -32601, "message": "unknown method"}
                        })
                        .to_string();
                        write_http_response(&mut stream, "200 OK", &body).await;
                    }
                }
            });
        }
    });

    (addr, initializes)
}

fn pool_for(addr: std::net::SocketAddr) -> McpClientPool {
    let providers = vec![McpProviderConfig {
        name: "remote".to_string(),
        url: format!("http://{addr}"),
        static_token: Some("static-secret".to_string()),
    }];
    McpClientPool::new(
        providers,
        Arc::new(StaticTokenResolver::default()),
        &CoreConfig::default(),
    )
}

/// **Scenario**: the first `get_clients` connects; a second within the health
/// TTL reuses the cached client without reconnecting.
#[tokio::test]
async fn connects_once_and_reuses_within_ttl() {
    let (addr, initializes) = spawn_mcp_server().await;
    let pool = pool_for(addr);
    let context = Uuid::new_v4();

    let first = pool.get_clients(context).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].status(), ClientStatus::Connected);
    assert_eq!(initializes.load(Ordering::SeqCst), 1);

    let second = pool.get_clients(context).await;
    assert_eq!(second.len(), 1);
    assert_eq!(initializes.load(Ordering::SeqCst), 1, "cached, no reconnect");
}

/// **Scenario**: two concurrent `get_clients` on a cold cache produce one
/// connection attempt (single-flight per context).
#[tokio::test]
async fn concurrent_cold_requests_connect_once() {
    let (addr, initializes) = spawn_mcp_server().await;
    let pool = Arc::new(pool_for(addr));
    let context = Uuid::new_v4();

    let (a, b) = tokio::join!(pool.get_clients(context), pool.get_clients(context));
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(initializes.load(Ordering::SeqCst), 1);
}

/// **Scenario**: disconnect evicts the cache; the next request builds a fresh
/// client set.
#[tokio::test]
async fn disconnect_then_reconnect_builds_fresh_set() {
    let (addr, initializes) = spawn_mcp_server().await;
    let pool = pool_for(addr);
    let context = Uuid::new_v4();

    let first = pool.get_clients(context).await;
    assert_eq!(first.len(), 1);
    pool.disconnect_context(context).await;
    assert_eq!(first[0].status(), ClientStatus::Disconnected);

    let second = pool.get_clients(context).await;
    assert_eq!(second.len(), 1);
    assert_eq!(initializes.load(Ordering::SeqCst), 2);
}

/// **Scenario**: an unreachable provider yields an empty client set, not an
/// error; the request proceeds with native tools only.
#[tokio::test]
async fn unreachable_provider_yields_empty_set() {
    // Reserve a port and close it so connections are refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let pool = pool_for(addr);
    let clients = pool.get_clients(Uuid::new_v4()).await;
    assert!(clients.is_empty());
}

/// **Scenario**: remote tools register under provider-prefixed names and
/// dispatch through the shared client.
#[tokio::test]
async fn remote_tools_register_prefixed_and_dispatch() {
    let (addr, _initializes) = spawn_mcp_server().await;
    let pool = pool_for(addr);
    let clients = pool.get_clients(Uuid::new_v4()).await;

    let mut registry = ToolRegistry::new();
    let added = register_mcp_tools(&mut registry, &clients);
    assert_eq!(added, 1);
    assert!(registry.contains("mcp_remote_echo"));

    let output = registry
        .call("mcp_remote_echo", json!({"text": "hi"}), None)
        .await
        .unwrap();
    assert_eq!(output.text, "echo-ok");
}

/// **Scenario**: the health snapshot reports per-context client state.
#[tokio::test]
async fn health_snapshot_reports_connected_clients() {
    let (addr, _initializes) = spawn_mcp_server().await;
    let pool = pool_for(addr);
    let context = Uuid::new_v4();
    pool.get_clients(context).await;

    let health = pool.health_status();
    assert_eq!(health.len(), 1);
    assert_eq!(health[0].context_id, context);
    assert_eq!(health[0].clients.len(), 1);
    assert_eq!(health[0].clients[0].status, ClientStatus::Connected);
    assert_eq!(health[0].clients[0].tool_count, 1);

    pool.shutdown().await;
    assert!(pool.health_status().is_empty());
}
