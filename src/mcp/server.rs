use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::api::server::{require_admin, ApiState};
use crate::error::BridgeError;
use crate::store::DEFAULT_QUERY_LIMIT;

const PROTOCOL_VERSION: &str = "2024-11-05";
const PREVIEW_CHARS: usize = 100;

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const TOOL_FAILED: i32 = -32000;

// -----------------------------------------------------------------------------
// JSON-RPC framing
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct McpRequest {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>, // None for notifications
}

#[derive(Debug, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
}

impl McpResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
            }),
        }
    }
}

// Tool arguments

#[derive(Debug, Deserialize)]
struct SearchContactsArgs {
    query: String,
}

#[derive(Debug, Deserialize)]
struct ListMessagesArgs {
    #[serde(default)]
    chat_jid: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SendMessageArgs {
    chat_jid: String,
    content: String,
}

/// Tool failure, carried back as a JSON-RPC error.
struct ToolError {
    code: i32,
    message: String,
}

impl From<BridgeError> for ToolError {
    fn from(err: BridgeError) -> Self {
        Self {
            code: TOOL_FAILED,
            message: err.to_string(),
        }
    }
}

fn arguments<T: serde::de::DeserializeOwned>(args: Option<Value>) -> Result<T, ToolError> {
    serde_json::from_value(args.unwrap_or_else(|| json!({}))).map_err(|e| ToolError {
        code: INVALID_PARAMS,
        message: format!("invalid arguments: {}", e),
    })
}

fn text(content: String) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": content
        }]
    })
}

// -----------------------------------------------------------------------------
// Router
// -----------------------------------------------------------------------------

/// `POST /mcp`, guarded by the same bearer check as the REST API.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/mcp", post(mcp_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state)
}

async fn mcp_handler(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<McpRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Unparseable MCP request: {}", rejection.body_text());
            return Json(McpResponse::error(
                Value::Null,
                PARSE_ERROR,
                rejection.body_text(),
            ))
            .into_response();
        }
    };
    debug!("Received MCP request: {}", request.method);

    let Some(id) = request.id else {
        debug!("MCP notification {}", request.method);
        return StatusCode::ACCEPTED.into_response();
    };

    let response = match request.method.as_str() {
        "initialize" => {
            info!("Initializing MCP session");
            McpResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {
                        "tools": {}
                    },
                    "serverInfo": {
                        "name": "chatbridge",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )
        }
        "tools/list" => McpResponse::success(id, json!({ "tools": tool_list() })),
        "tools/call" => {
            let result = match serde_json::from_value::<CallToolParams>(
                request.params.unwrap_or(Value::Null),
            ) {
                Ok(params) => call_tool(&state, params).await,
                Err(e) => Err(ToolError {
                    code: INVALID_PARAMS,
                    message: format!("invalid tools/call params: {}", e),
                }),
            };
            match result {
                Ok(value) => McpResponse::success(id, value),
                Err(e) => McpResponse::error(id, e.code, e.message),
            }
        }
        method => {
            warn!("Unknown MCP method: {}", method);
            McpResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
        }
    };

    Json(response).into_response()
}

fn tool_list() -> Vec<Value> {
    vec![
        json!({
            "name": "search_contacts",
            "description": "Search contacts by name or phone number",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Text to look for in names or jids" }
                },
                "required": ["query"]
            }
        }),
        json!({
            "name": "list_messages",
            "description": "List recent messages, newest first",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "chat_jid": { "type": "string", "description": "Only messages of this chat" },
                    "limit": { "type": "integer", "description": "Maximum messages to return (default 50)" }
                }
            }
        }),
        json!({
            "name": "send_message",
            "description": "Send a text message to a chat",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "chat_jid": { "type": "string", "description": "Destination chat" },
                    "content": { "type": "string", "description": "Message text" }
                },
                "required": ["chat_jid", "content"]
            }
        }),
        json!({
            "name": "get_health",
            "description": "Report bridge status and connectivity",
            "inputSchema": {
                "type": "object",
                "properties": {}
            }
        }),
    ]
}

async fn call_tool(state: &ApiState, params: CallToolParams) -> Result<Value, ToolError> {
    let manager = &state.manager;
    match params.name.as_str() {
        "search_contacts" => {
            let args: SearchContactsArgs = arguments(params.arguments)?;
            let contacts = manager.contacts(Some(args.query.as_str()));
            if contacts.is_empty() {
                return Ok(text(format!("No contacts matching '{}'", args.query)));
            }
            let lines: Vec<String> = contacts.iter().map(|c| format!("• {}", c)).collect();
            Ok(text(format!("Contacts found:\n{}", lines.join("\n"))))
        }
        "list_messages" => {
            let args: ListMessagesArgs = arguments(params.arguments)?;
            let limit = args
                .limit
                .filter(|l| *l > 0)
                .map(|l| l as usize)
                .unwrap_or(DEFAULT_QUERY_LIMIT);
            let messages = manager.messages(args.chat_jid.as_deref(), limit);
            if messages.is_empty() {
                return Ok(text("No messages found".to_string()));
            }
            let lines: Vec<String> = messages
                .iter()
                .map(|m| {
                    format!(
                        "[{}] {}: {}",
                        m.timestamp.to_rfc3339(),
                        m.sender_id,
                        preview(&m.content)
                    )
                })
                .collect();
            Ok(text(format!("Messages ({}):\n{}", messages.len(), lines.join("\n"))))
        }
        "send_message" => {
            let args: SendMessageArgs = arguments(params.arguments)?;
            let outcome = manager.send_message(&args.chat_jid, &args.content).await?;
            Ok(text(format!("Message sent. ID: {}", outcome.message_id)))
        }
        "get_health" => {
            let health = manager.health();
            Ok(text(format!(
                "Bridge status: {}\nConnected: {}\nConnection state: {}\nChecked at: {}",
                health.status,
                health.connected,
                health.state.as_str(),
                health.timestamp.to_rfc3339()
            )))
        }
        unknown => Err(ToolError {
            code: TOOL_FAILED,
            message: format!("Unknown tool: {}", unknown),
        }),
    }
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::ApiServer;
    use crate::client::mock::MockClient;
    use crate::client::MessagingClient;
    use crate::entity::DirectoryEntry;
    use crate::manager::Manager;
    use axum::body::{to_bytes, Body};
    use axum::http::{header::AUTHORIZATION, Method, Request};
    use std::time::Duration;
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    fn app(client: MockClient) -> (Router, Arc<Manager>) {
        let client: Arc<dyn MessagingClient> = Arc::new(client);
        let manager = Arc::new(Manager::new(client, Duration::from_secs(1), Duration::ZERO));
        (ApiServer::new(manager.clone(), TOKEN).router(), manager)
    }

    fn rpc(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header(AUTHORIZATION, format!("Bearer {}", TOKEN))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(router: &Router, req: Request<Body>) -> (StatusCode, McpResponse) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn tool_call(id: u64, name: &str, arguments: Value) -> Request<Body> {
        rpc(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }))
    }

    fn text_of(resp: &McpResponse) -> &str {
        resp.result.as_ref().unwrap()["content"][0]["text"]
            .as_str()
            .unwrap()
    }

    #[tokio::test]
    async fn tools_list_advertises_bridge_tools() {
        let (router, _) = app(MockClient::connected());
        let (status, resp) = call(
            &router,
            rpc(json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.id, json!(1));
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(
            names,
            ["search_contacts", "list_messages", "send_message", "get_health"]
        );
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn send_message_tool_goes_through_the_pipeline() {
        let (router, manager) = app(MockClient::connected());

        let (_, resp) = call(
            &router,
            tool_call(2, "send_message", json!({ "chat_jid": "c@s.whatsapp.net", "content": "hola" })),
        )
        .await;
        assert_eq!(text_of(&resp), "Message sent. ID: SENT-1");
        assert_eq!(manager.messages(Some("c@s.whatsapp.net"), 10).len(), 1);

        let (_, resp) = call(&router, tool_call(3, "list_messages", json!({ "limit": 0 }))).await;
        let listing = text_of(&resp);
        assert!(listing.starts_with("Messages (1):\n["));
        assert!(listing.ends_with("] self: hola"));
    }

    #[tokio::test]
    async fn send_message_tool_reports_bridge_errors() {
        let (router, manager) = app(MockClient::disconnected());

        let (_, resp) = call(
            &router,
            tool_call(4, "send_message", json!({ "chat_jid": "c", "content": "hi" })),
        )
        .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, TOOL_FAILED);
        assert_eq!(err.message, "messaging client is not connected");

        let (_, resp) = call(&router, tool_call(5, "send_message", json!({ "chat_jid": "c" }))).await;
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
        assert_eq!(manager.health().messages_count, 0);
    }

    #[tokio::test]
    async fn search_contacts_tool_lists_matches() {
        let entry = DirectoryEntry {
            full_name: Some("Marta Ruiz".into()),
            ..DirectoryEntry::new("m@s.whatsapp.net")
        };
        let (router, manager) = app(MockClient::connected().with_contacts(Ok(vec![entry])));

        let (_, resp) = call(&router, tool_call(6, "search_contacts", json!({ "query": "marta" }))).await;
        assert_eq!(text_of(&resp), "No contacts matching 'marta'");

        manager.sync_contacts().unwrap();
        for _ in 0..100 {
            if manager.health().contacts_count == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let (_, resp) = call(&router, tool_call(7, "search_contacts", json!({ "query": "marta" }))).await;
        assert_eq!(
            text_of(&resp),
            "Contacts found:\n• Marta Ruiz (m@s.whatsapp.net)"
        );
    }

    #[tokio::test]
    async fn health_tool_and_protocol_errors() {
        let (router, _) = app(MockClient::disconnected());

        let (_, resp) = call(&router, tool_call(8, "get_health", json!({}))).await;
        let report = text_of(&resp);
        assert!(report.starts_with("Bridge status: healthy\nConnected: false\n"));
        assert!(report.contains("Connection state: disconnected"));

        let (_, resp) = call(&router, tool_call(9, "make_coffee", json!({}))).await;
        assert_eq!(resp.error.unwrap().code, TOOL_FAILED);

        let (_, resp) = call(&router, rpc(json!({ "jsonrpc": "2.0", "id": 10, "method": "prompts/list" }))).await;
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);

        let (_, resp) = call(
            &router,
            rpc(json!({ "jsonrpc": "2.0", "id": 11, "method": "initialize", "params": {} })),
        )
        .await;
        assert_eq!(resp.result.unwrap()["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn notifications_are_accepted_without_body() {
        let (router, _) = app(MockClient::connected());
        let resp = router
            .clone()
            .oneshot(rpc(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn requires_bearer_token() {
        let (router, _) = app(MockClient::connected());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }).to_string()))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn long_content_is_cut_on_char_boundary() {
        let long = "ñ".repeat(150);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
