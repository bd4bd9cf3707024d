//! Tests against a fake MCP server speaking JSON-RPC over HTTP.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use mcp_hub::config::ServerConfig;
use mcp_hub::http::{router, AppState};
use mcp_hub::mcp::{ConnectionManager, ConnectionStatus, ManagerOptions, TransportKind};
use mcp_hub::tools::{LocalToolRegistry, ToolService};
use mcp_hub::Error;

type Seen = Arc<Mutex<Vec<Value>>>;

async fn handle(seen: Seen, message: Value) -> (StatusCode, Json<Value>) {
    seen.lock().unwrap().push(message.clone());
    let id = message.get("id").cloned().unwrap_or(Value::Null);
    let result = match message["method"].as_str().unwrap_or_default() {
        "initialize" => json!({"protocolVersion": "2024-11-05", "serverInfo": {"name": "web", "version": "1"}}),
        "tools/list" => json!({"tools": [{"name": "fetch", "description": "Fetch a URL", "inputSchema": {"type": "object"}}]}),
        "tools/call" => {
            let url = message["params"]["arguments"]["url"].as_str().unwrap_or("?");
            json!({"content": [{"type": "text", "text": format!("fetched {}", url)}]})
        }
        _ => return (StatusCode::ACCEPTED, Json(json!({}))),
    };
    (StatusCode::OK, Json(json!({"jsonrpc": "2.0", "id": id, "result": result})))
}

/// Serve a fake MCP server at `http://<addr>/mcp/messages`. Returns its base URL.
async fn spawn_fake_server(seen: Seen) -> String {
    let app = Router::new().route(
        "/mcp/messages",
        post(move |Json(message): Json<Value>| handle(seen.clone(), message)),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/mcp", addr)
}

async fn spawn_failing_server() -> String {
    let app = Router::new().route(
        "/messages",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_connect_list_and_call_over_http() {
    let seen: Seen = Arc::default();
    let url = spawn_fake_server(seen.clone()).await;
    let manager = ConnectionManager::new(ManagerOptions::default());

    manager.connect("web", ServerConfig::network(&url)).await.unwrap();
    assert_eq!(manager.connection_status("web").await, Some(ConnectionStatus::Connected));
    let summary = manager.summary("web").await.unwrap();
    assert_eq!(summary.transport, Some(TransportKind::StreamableHttp));
    assert_eq!(summary.tool_count, 1);

    let tools = manager.aggregated_tools(None, false).await;
    assert_eq!(tools[0].name(), "fetch");
    assert_eq!(tools[0].server_id.as_deref(), Some("web"));

    let mut args = Map::new();
    args.insert("url".to_string(), json!("https://example.com"));
    let result = manager.execute_tool("web", "fetch", args).await.unwrap();
    assert_eq!(result["content"][0]["text"], "fetched https://example.com");

    let methods: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|m| m["method"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        methods,
        ["initialize", "notifications/initialized", "tools/list", "tools/call"]
    );

    manager.disconnect("web").await;
    let err = manager.execute_tool("web", "fetch", Map::new()).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected { .. }));
}

#[tokio::test]
async fn test_http_error_status_fails_handshake() {
    let url = spawn_failing_server().await;
    let manager = ConnectionManager::new(ManagerOptions::default());

    let err = manager.connect("broken", ServerConfig::network(&url)).await.unwrap_err();
    assert!(matches!(err, Error::Handshake(ref msg) if msg.contains("HTTP error 500")));
    assert_eq!(manager.connection_status("broken").await, Some(ConnectionStatus::Disconnected));
    assert_eq!(manager.metrics().snapshot().connect_failures, 1);
}

#[tokio::test]
async fn test_admin_api_connects_and_routes_remote_tools() {
    let seen: Seen = Arc::default();
    let url = spawn_fake_server(seen).await;

    let manager = Arc::new(ConnectionManager::new(ManagerOptions::default()));
    let service = Arc::new(ToolService::new(LocalToolRegistry::new(), manager.clone()));
    let app = router(AppState::new(service));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/mcp/servers/connect")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"server_id": "web", "server_config": {"url": url}}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "connected (1 tools)");

    let request = Request::builder()
        .method("POST")
        .uri("/v1/tools/call")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": "fetch", "arguments": {"url": "https://rust-lang.org"}}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["source"], json!({"kind": "remote", "server_id": "web"}));
    assert_eq!(body["text"], "fetched https://rust-lang.org");

    let request = Request::builder()
        .uri("/v1/mcp/servers/web/status")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "connected");
    assert_eq!(body["config"]["url"], url);

    manager.shutdown().await;
}
