use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::contacts::SyncTrigger;
use crate::error::BridgeError;
use crate::manager::{Manager, MODE_LIVE};
use crate::store::DEFAULT_QUERY_LIMIT;

// -----------------------------------------------------------------------------
// Envelope
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Validation(msg) => ApiError::new(StatusCode::BAD_REQUEST, msg),
            BridgeError::NotConnected => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "messaging client is not connected",
            ),
            BridgeError::SendFailed(msg) => {
                error!("Send failed: {}", msg);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "failed to send message")
            }
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// -----------------------------------------------------------------------------
// Request / response payloads
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub chat_jid: Option<String>,
    // Kept as text: an unparseable limit falls back to the default.
    pub limit: Option<String>,
}

impl MessagesQuery {
    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_QUERY_LIMIT)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub chat_jid: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct ContactsQuery {
    pub search: Option<String>,
}

// -----------------------------------------------------------------------------
// Server
// -----------------------------------------------------------------------------

pub struct ApiState {
    pub manager: Arc<Manager>,
    pub admin_token: String,
}

pub struct ApiServer {
    manager: Arc<Manager>,
    admin_token: String,
}

impl ApiServer {
    pub fn new(manager: Arc<Manager>, admin_token: impl Into<String>) -> Self {
        Self {
            manager,
            admin_token: admin_token.into(),
        }
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(ApiState {
            manager: self.manager.clone(),
            admin_token: self.admin_token.clone(),
        });

        let api = Router::new()
            .route("/health", get(health_handler))
            .route("/messages", get(list_messages_handler).post(send_message_handler))
            .route("/contacts", get(list_contacts_handler))
            .route("/contacts/sync", post(sync_contacts_handler))
            .route("/chats", get(list_chats_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
            .with_state(state.clone());

        Router::new()
            .nest("/api/v1", api)
            .merge(crate::mcp::server::router(state))
            .layer(TraceLayer::new_for_http())
    }
}

pub(crate) async fn require_admin(State(state): State<Arc<ApiState>>, req: Request, next: Next) -> Response {
    let authorized = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == state.admin_token);

    if !authorized {
        warn!("Rejected unauthorized request to {}", req.uri().path());
        return ApiError::new(StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    next.run(req).await
}

async fn health_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.manager.health()))
}

async fn list_messages_handler(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<MessagesQuery>,
) -> impl IntoResponse {
    let messages = state
        .manager
        .messages(params.chat_jid.as_deref(), params.limit());
    Json(ApiResponse::success(messages))
}

async fn send_message_handler(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<SendMessageResponse> {
    let Json(req) = body.map_err(|rejection| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("invalid JSON body: {}", rejection.body_text()),
        )
    })?;

    let outcome = state.manager.send_message(&req.chat_jid, &req.content).await?;

    Ok(Json(ApiResponse::success(SendMessageResponse {
        message_id: outcome.message_id,
        timestamp: outcome.timestamp,
        mode: MODE_LIVE.to_string(),
    })))
}

async fn list_contacts_handler(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ContactsQuery>,
) -> impl IntoResponse {
    Json(ApiResponse::success(
        state.manager.contacts(params.search.as_deref()),
    ))
}

async fn sync_contacts_handler(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let message = match state.manager.sync_contacts()? {
        SyncTrigger::Started => {
            info!("Contact sync requested");
            "contact sync started"
        }
        SyncTrigger::AlreadyRunning => "contact sync already in progress",
    };

    let body = ApiResponse::success(json!({
        "message": message,
        "status": "processing",
    }));
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn list_chats_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.manager.chats()))
}
