//! HTTP admin API over the connection manager and tool service.
//!
//! Routes:
//!
//! - `GET /health`, `GET /metrics`
//! - `GET /v1/mcp/servers`, `POST /v1/mcp/servers/connect`
//! - `POST /v1/mcp/servers/{id}/disconnect`, `DELETE /v1/mcp/servers/{id}`
//! - `GET /v1/mcp/servers/{id}/status`, `GET /v1/mcp/servers/{id}/tools`
//! - `GET /v1/mcp/tools`
//! - `GET /v1/tools`, `POST /v1/tools/call`

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::server::ServerConfig;
use crate::error::{Error, Result};
use crate::mcp::manager::ConnectionManager;
use crate::tools::ToolService;

/// HTTP server state.
#[derive(Clone)]
pub struct AppState {
    tools: Arc<ToolService>,
    cors_origins: Vec<HeaderValue>,
}

impl AppState {
    /// State with no cross-origin access.
    pub fn new(tools: Arc<ToolService>) -> Self {
        Self {
            tools,
            cors_origins: Vec::new(),
        }
    }

    /// Allow browsers on exactly these origins to call the API.
    /// Entries that are not valid header values are dropped.
    pub fn with_cors_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.cors_origins = origins
            .into_iter()
            .filter_map(|origin| {
                let origin = origin.as_ref();
                match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin '{}'", origin);
                        None
                    }
                }
            })
            .collect();
        self
    }

    fn manager(&self) -> &ConnectionManager {
        self.tools.manager()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the admin router.
///
/// The API can spawn processes, so no CORS headers are sent unless
/// origins were configured.
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/v1/mcp/servers", get(list_servers))
        .route("/v1/mcp/servers/connect", post(connect_server))
        .route("/v1/mcp/servers/{id}/disconnect", post(disconnect_server))
        .route("/v1/mcp/servers/{id}", delete(remove_server))
        .route("/v1/mcp/servers/{id}/status", get(server_status))
        .route("/v1/mcp/servers/{id}/tools", get(server_tools))
        .route("/v1/mcp/tools", get(aggregated_tools))
        .route("/v1/tools", get(available_tools))
        .route("/v1/tools/call", post(call_tool));

    let routes = if state.cors_origins.is_empty() {
        routes
    } else {
        routes.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(state.cors_origins.clone()))
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE]),
        )
    };

    routes.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serve the admin API until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Admin API listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::HttpServer(e.to_string()))
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let manager = state.manager();
    let registered = manager.list_servers().await.len();
    let connected = manager.connected_count().await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        manager.metrics().to_prometheus(registered, connected),
    )
}

async fn list_servers(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "servers": state.manager().summaries().await }))
}

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    server_id: String,
    server_config: Value,
}

async fn connect_server(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<Value>> {
    let config: ServerConfig = serde_json::from_value(req.server_config)
        .map_err(|e| Error::Config(e.to_string()))?;
    let manager = state.manager();

    manager.connect(&req.server_id, config).await.map_err(|e| {
        if e.is_client_error() {
            e
        } else {
            Error::Internal(format!("Connection failed: {}", e))
        }
    })?;

    let status = match manager.summary(&req.server_id).await {
        Some(s) if s.tools_error.is_some() => "connected (tools unavailable)".to_string(),
        Some(s) if s.tool_count > 0 => format!("connected ({} tools)", s.tool_count),
        _ => "connected".to_string(),
    };
    Ok(Json(json!({ "success": true, "status": status })))
}

async fn disconnect_server(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let manager = state.manager();
    if !manager.has_server(&id).await {
        return Err(Error::UnknownServer(id));
    }
    manager.disconnect(&id).await;
    Ok(Json(json!({ "success": true, "status": "disconnected" })))
}

async fn remove_server(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    if !state.manager().remove(&id).await {
        return Err(Error::UnknownServer(id));
    }
    Ok(Json(json!({ "success": true })))
}

async fn server_status(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let summary = state
        .manager()
        .summary(&id)
        .await
        .ok_or_else(|| Error::UnknownServer(id.clone()))?;
    Ok(Json(json!({
        "server_id": id,
        "status": summary.status,
        "config": summary.config,
        "error": summary.error,
        "tool_count": summary.tool_count,
        "tools_error": summary.tools_error,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct ToolsQuery {
    server_ids: Option<String>,
    #[serde(default)]
    force_refresh: bool,
}

async fn server_tools(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ToolsQuery>,
) -> Result<Json<Value>> {
    let tools = state.manager().list_tools(&id, query.force_refresh).await?;
    Ok(Json(json!({ "tools": tools })))
}

async fn aggregated_tools(State(state): State<AppState>, Query(query): Query<ToolsQuery>) -> Json<Value> {
    let ids: Option<Vec<String>> = query.server_ids.map(|ids| {
        ids.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    });
    let tools = state
        .manager()
        .aggregated_tools(ids.as_deref(), query.force_refresh)
        .await;
    Json(json!({ "tools": tools }))
}

async fn available_tools(State(state): State<AppState>, Query(query): Query<ToolsQuery>) -> Json<Value> {
    Json(json!({ "tools": state.tools.available_tools(query.force_refresh).await }))
}

#[derive(Debug, Deserialize)]
struct CallToolRequest {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

async fn call_tool(State(state): State<AppState>, Json(req): Json<CallToolRequest>) -> Result<Json<Value>> {
    let outcome = state.tools.execute(&req.name, req.arguments).await?;
    Ok(Json(json!({
        "tool": outcome.tool,
        "source": outcome.source,
        "is_error": outcome.is_error,
        "text": outcome.text(),
        "value": outcome.value,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::manager::ManagerOptions;
    use crate::tools::{register_builtin_tools, LocalToolRegistry};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app_with(manager: ConnectionManager) -> Router {
        let mut local = LocalToolRegistry::new();
        register_builtin_tools(&mut local, &std::env::temp_dir());
        let tools = Arc::new(ToolService::new(local, Arc::new(manager)));
        router(AppState::new(tools))
    }

    fn app() -> Router {
        app_with(ConnectionManager::default())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method("OPTIONS")
            .uri("/v1/mcp/servers/connect")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_cors_headers_by_default() {
        let response = app().oneshot(preflight("https://evil.example")).await.unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());

        let request = Request::builder()
            .uri("/v1/mcp/servers")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_cors_only_for_configured_origins() {
        let mut local = LocalToolRegistry::new();
        register_builtin_tools(&mut local, &std::env::temp_dir());
        let tools = Arc::new(ToolService::new(local, Arc::new(ConnectionManager::default())));
        let app = router(
            AppState::new(tools).with_cors_origins(["http://localhost:3000", "bad\nvalue"]),
        );

        let response = app.clone().oneshot(preflight("http://localhost:3000")).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("http://localhost:3000"))
        );

        let response = app.oneshot(preflight("https://evil.example")).await.unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_metrics_is_prometheus_text() {
        let response = app().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("mcp_hub_registered_servers 0"));
    }

    #[tokio::test]
    async fn test_list_servers() {
        let manager = ConnectionManager::with_servers(
            ManagerOptions::default(),
            [("fs".to_string(), ServerConfig::process("mcp-fs", ["/data"]))],
        );
        let (status, body) = send(app_with(manager), get("/v1/mcp/servers")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["servers"][0]["id"], "fs");
        assert_eq!(body["servers"][0]["status"], "disconnected");
        assert_eq!(body["servers"][0]["config"]["command"], "mcp-fs");
    }

    #[tokio::test]
    async fn test_unknown_server_routes_return_404() {
        for request in [
            post_json("/v1/mcp/servers/ghost/disconnect", json!({})),
            get("/v1/mcp/servers/ghost/status"),
            get("/v1/mcp/servers/ghost/tools"),
            Request::builder()
                .method("DELETE")
                .uri("/v1/mcp/servers/ghost")
                .body(Body::empty())
                .unwrap(),
        ] {
            let (status, body) = send(app(), request).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert!(body["error"].as_str().unwrap().contains("ghost"));
        }
    }

    #[tokio::test]
    async fn test_tools_of_disconnected_server_is_400() {
        let manager = ConnectionManager::with_servers(
            ManagerOptions::default(),
            [("fs".to_string(), ServerConfig::process("mcp-fs", Vec::<String>::new()))],
        );
        let (status, _) = send(app_with(manager), get("/v1/mcp/servers/fs/tools")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_connect_with_invalid_config_is_400() {
        let (status, body) = send(
            app(),
            post_json(
                "/v1/mcp/servers/connect",
                json!({"server_id": "web", "server_config": {"args": ["x"]}}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Configuration error"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_500() {
        let (status, body) = send(
            app(),
            post_json(
                "/v1/mcp/servers/connect",
                json!({"server_id": "ghost", "server_config": {"command": "no-such-mcp-server-xyz"}}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("Connection failed"));
    }

    #[tokio::test]
    async fn test_aggregated_tools_empty_when_nothing_connected() {
        let (status, body) = send(app(), get("/v1/mcp/tools?server_ids=a,b&force_refresh=true")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tools"], json!([]));
    }

    #[tokio::test]
    async fn test_available_tools_lists_builtins() {
        let (status, body) = send(app(), get("/v1/tools")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tools"].as_array().unwrap().len(), 6);
        assert_eq!(body["tools"][0]["type"], "function");
    }

    #[tokio::test]
    async fn test_call_tool() {
        let (status, body) = send(
            app(),
            post_json("/v1/tools/call", json!({"name": "calculate", "arguments": {"expression": "6 * 7"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["value"], json!(42.0));
        assert_eq!(body["source"]["kind"], "local");

        let (status, _) = send(app(), post_json("/v1/tools/call", json!({"name": "teleport"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            app(),
            post_json("/v1/tools/call", json!({"name": "calculate", "arguments": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
