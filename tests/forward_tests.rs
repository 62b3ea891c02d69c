//! End-to-end forwarding through a mock MCP server

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use capability_gateway::config::ForwardsConfig;
use capability_gateway::forward::{ForwardRegistry, ForwardResolver, ForwardService, McpForwardResolver};
use capability_gateway::persistence::InMemoryRepository;
use capability_gateway::types::{ForwardReference, REMOTE_TOOL_TYPE};
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;

#[derive(Default)]
struct Mock {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

async fn handle(State(mock): State<Arc<Mock>>, Json(request): Json<Value>) -> Response {
    let Some(id) = request.get("id").cloned() else {
        // notifications/initialized
        return StatusCode::ACCEPTED.into_response();
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let result = match request["method"].as_str().unwrap_or_default() {
        "initialize" => json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {"tools": {}, "resources": {}},
            "serverInfo": {"name": "mock", "version": "1.0.0"}
        }),
        "tools/list" => json!({
            "tools": [
                {
                    "name": "echo",
                    "description": "Echo text back",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "text": {"type": "string", "description": "What to echo"},
                            "times": {"type": "integer"}
                        },
                        "required": ["text"]
                    }
                },
                {"name": "slow", "inputSchema": {"type": "object"}},
                {"name": "fail", "inputSchema": {"type": "object"}}
            ]
        }),
        "tools/call" => match params["name"].as_str().unwrap_or_default() {
            "echo" => json!({
                "content": [{"type": "text", "text": params["arguments"]["text"]}],
                "isError": false
            }),
            "slow" => {
                let now = mock.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                mock.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                mock.in_flight.fetch_sub(1, Ordering::SeqCst);
                json!({"content": [{"type": "text", "text": "done"}]})
            }
            _ => {
                return Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32603, "message": "tool exploded"}
                }))
                .into_response();
            }
        },
        "resources/list" => json!({
            "resources": [
                {"uri": "mem://greeting", "name": "greeting", "mimeType": "text/plain"}
            ]
        }),
        "resources/read" => json!({
            "contents": [
                {"uri": params["uri"], "mimeType": "text/plain", "text": "hello"},
                {"uri": params["uri"], "text": "ignored"}
            ]
        }),
        other => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("Method not found: {other}")}
            }))
            .into_response();
        }
    };

    let mut response = Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response();
    response
        .headers_mut()
        .insert("mcp-session-id", HeaderValue::from_static("session-1"));
    response
}

async fn spawn_mock() -> (String, Arc<Mock>) {
    let mock = Arc::new(Mock::default());
    let app = Router::new()
        .route("/mcp", post(handle).delete(|| async { StatusCode::OK }))
        .with_state(Arc::clone(&mock));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/mcp"), mock)
}

fn service() -> ForwardService {
    let config = ForwardsConfig {
        timeout: Duration::from_secs(5),
        ..ForwardsConfig::default()
    };
    ForwardService::new(
        Arc::new(ForwardRegistry::new(&config)),
        Arc::new(InMemoryRepository::new()),
    )
}

#[tokio::test]
async fn test_forwarded_tool_and_resource_round_trip() {
    let (url, _mock) = spawn_mock().await;
    let service = service();

    let mut forward = ForwardReference::new("mock", url).with_namespace("ext");
    forward.labels.insert("team".into(), "alpha".into());
    service.add_forward(forward).unwrap();

    let tools = service.list_tools(None).await.unwrap();
    assert_eq!(tools.len(), 3);
    let echo = tools.iter().find(|t| t.name == "echo").unwrap();
    assert_eq!(echo.tool_type, REMOTE_TOOL_TYPE);
    assert_eq!(echo.namespace.as_deref(), Some("ext"));
    assert_eq!(echo.description, "Echo text back");
    // Only string-typed properties are carried over
    assert_eq!(
        echo.input_schema.properties.keys().collect::<Vec<_>>(),
        vec!["text"]
    );

    let mut args = Map::new();
    args.insert("text".into(), json!("hi there"));
    let result = service.call_tool("echo", args).await.unwrap();
    assert!(!result.is_error);
    assert_eq!(result.joined_text(), "hi there");

    let contents = service.read_resource("mem://greeting").await.unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].as_text(), "hello");

    assert_eq!(service.list_resources(Some("team=alpha")).await.unwrap().len(), 1);
    assert!(service.list_tools(Some("team=beta")).await.unwrap().is_empty());

    service.remove_forward("mock", Some("ext")).unwrap();
    assert!(service.list_tools(None).await.unwrap().is_empty());
    assert!(service.list_resources(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_tool_error_becomes_error_result() {
    let (url, _mock) = spawn_mock().await;
    let service = service();
    service.add_forward(ForwardReference::new("mock", url)).unwrap();

    let result = service.call_tool("fail", Map::new()).await.unwrap();
    assert!(result.is_error);
    assert!(result.joined_text().contains("tool exploded"));
}

#[tokio::test]
async fn test_dead_forward_is_skipped_in_listings() {
    let (url, _mock) = spawn_mock().await;
    let service = service();
    service.add_forward(ForwardReference::new("live", url)).unwrap();
    service
        .add_forward(ForwardReference::new("dead", "http://127.0.0.1:1/mcp"))
        .unwrap();

    assert_eq!(service.list_tools(None).await.unwrap().len(), 3);
    assert_eq!(service.list_resources(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_calls_through_one_resolver_are_serialized() {
    let (url, mock) = spawn_mock().await;
    let resolver = McpForwardResolver::new(
        ForwardReference::new("mock", url),
        Duration::from_secs(5),
    );
    let slow = resolver
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.name == "slow")
        .unwrap();

    let calls = (0..3).map(|_| {
        let tool = resolver.resolve(&slow);
        let slow = slow.clone();
        async move { tool.call(Map::new(), &slow).await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| !r.is_error));
    assert_eq!(mock.max_in_flight.load(Ordering::SeqCst), 1);
}
