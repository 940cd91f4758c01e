//! HTTP control surface
//!
//! Thin JSON handlers over the bridge. Command endpoints report delivery as
//! `{"delivered": bool}`; `false` means the caller should use its fallback path.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use muxdeck_protocol::{ApprovalDecision, SessionSnapshot};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::activity_log::ActivityRow;
use crate::approvals::InboxApproval;
use crate::dashboard::dashboard_ws_handler;
use crate::state::AppState;
use crate::transport::agent_ws_handler;

const DEFAULT_ACTIVITY_LIMIT: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws/agent", get(agent_ws_handler))
        .route("/ws/dashboard", get(dashboard_ws_handler))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/by-claude-id/{id}", get(session_by_claude_id))
        .route("/api/sessions/{name}", get(get_session).delete(remove_session))
        .route("/api/sessions/{name}/message", post(send_message))
        .route("/api/sessions/{name}/approval", post(respond_approval))
        .route("/api/sessions/{name}/prompt", post(queue_prompt))
        .route("/api/sessions/{name}/activity", get(session_activity))
        .route("/api/approvals", get(list_approvals))
        .with_state(state)
}

pub async fn health_handler() -> &'static str {
    "OK"
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSnapshot>> {
    Json(state.bridge.get_all_sessions())
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .bridge
        .get_session_state(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown session: {name}")))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SessionNameResponse {
    pub name: String,
}

pub async fn session_by_claude_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionNameResponse>, ApiError> {
    state
        .bridge
        .get_session_name_by_claude_id(&id)
        .map(|name| Json(SessionNameResponse { name }))
        .ok_or_else(|| ApiError::NotFound(format!("no connected session for claude id: {id}")))
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub text: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DeliveryResponse {
    pub delivered: bool,
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<TextBody>,
) -> Json<DeliveryResponse> {
    let delivered = state.bridge.send_user_message(&name, &body.text);
    Json(DeliveryResponse { delivered })
}

#[derive(Debug, Deserialize)]
pub struct ApprovalBody {
    pub request_id: String,
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn respond_approval(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<ApprovalBody>,
) -> Json<DeliveryResponse> {
    let delivered = state.bridge.respond_to_tool_approval(
        &name,
        &body.request_id,
        body.decision,
        body.message.as_deref(),
    );
    Json(DeliveryResponse { delivered })
}

#[derive(Debug, Serialize, PartialEq)]
pub struct QueuedResponse {
    pub queued: bool,
}

pub async fn queue_prompt(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<TextBody>,
) -> (StatusCode, Json<QueuedResponse>) {
    state.bridge.queue_initial_prompt(&name, &body.text);
    (StatusCode::ACCEPTED, Json(QueuedResponse { queued: true }))
}

pub async fn remove_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> StatusCode {
    state.bridge.remove_session(&name);
    state.approvals.purge_session(&name);
    info!(
        component = "http",
        event = "http.session.removed",
        session_name = %name,
        "Session removed via API"
    );
    StatusCode::NO_CONTENT
}

pub async fn list_approvals(State(state): State<AppState>) -> Json<Vec<InboxApproval>> {
    Json(state.approvals.list())
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

pub async fn session_activity(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityRow>>, ApiError> {
    let Some(store) = state.activity.as_ref() else {
        return Err(ApiError::NotFound("activity log is disabled".into()));
    };
    let rows = store
        .recent(&name, query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT))
        .await?;
    Ok(Json(rows))
}
