//! GraphQL-shaped query/mutation handlers (§6): one axum handler per
//! named operation, same field shape as the authoritative contract, just
//! reached over plain JSON POST/GET instead of a GraphQL execution engine
//! (see DESIGN.md, Open Question 4, for why no `async-graphql` dependency
//! was introduced).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::{Deserialize, Serialize};
use serde_json::json;

use sa_domain::error::Error;
use sa_domain::model::Script;
use sa_orderbook::OrderLineRequest;

use super::auth::AuthUser;
use crate::state::AppState;

/// Maps a domain `Error` to the HTTP status + JSON error body the gateway
/// uses at every handler boundary (§10.2).
pub fn error_response(err: &Error) -> Response {
    use axum::http::StatusCode;
    let status = match err {
        Error::Validation { .. } => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AuthorizationDenied => StatusCode::FORBIDDEN,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        Error::TransientDependency(_) | Error::Timeout(_) | Error::Provider { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Error::Io(_) | Error::Json(_) | Error::Http(_) | Error::Config(_) | Error::Internal(_)
        | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn synthesize(state: &AppState, text: &str) -> Option<String> {
    state.tts.synthesize(text).await.ok().flatten()
}

// ── chat ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

pub async fn chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let session_id = req
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let response = state
        .orchestrator
        .process(&req.query, &session_id, Some(user.id))
        .await;
    let error = response.metadata.get("error").and_then(|v| v.as_str()).map(String::from);
    let audio_url = synthesize(&state, &response.reply_text).await;
    Json(ChatResponse {
        answer: response.reply_text,
        query: req.query,
        error,
        audio_url,
    })
}

// ── list_products ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(q): Query<ListProductsQuery>,
) -> Response {
    match state.catalog.list_active(q.limit).await {
        Ok(products) => Json(products).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── chat_history ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatHistoryQuery {
    pub session_id: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<sa_domain::model::TranscriptRecord>,
    pub total: usize,
    pub has_more: bool,
}

pub async fn chat_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<ChatHistoryQuery>,
) -> Json<ChatHistoryResponse> {
    let messages = state
        .transcripts
        .get_by_session(&q.session_id, q.limit, q.offset, Some(&user.id));
    let total = messages.len() + q.offset;
    let has_more = messages.len() == q.limit;
    Json(ChatHistoryResponse {
        messages,
        total,
        has_more,
    })
}

// ── conversations ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ConversationsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub async fn conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<ConversationsQuery>,
) -> Json<Vec<sa_sessions::ConversationSummary>> {
    Json(state.transcripts.list_conversations(&user.id, q.limit))
}

// ── order (query) ────────────────────────────────────────────────────

pub async fn get_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Json<Option<sa_domain::model::Order>> {
    let order = state.orderbook.get_by_id(&id);
    let visible = order.filter(|o| user.role.is_admin() || o.user_id == user.id);
    Json(visible)
}

// ── process_script (mutation) ───────────────────────────────────────

pub async fn process_script(
    State(state): State<AppState>,
    Json(script): Json<Script>,
) -> Response {
    match state.script_pipeline.process_script(script).await {
        Ok(result) => {
            let audio_url = result.audio.clone();
            Json(json!({
                "ok": result.ok,
                "message": result.short_reply,
                "products": result.ranked_list,
                "best_id": result.best_id,
                "reasoning": result.reasoning,
                "next_step": result.next_step,
                "audio_url": audio_url,
            }))
            .into_response()
        }
        Err(e) => error_response(&e),
    }
}

// ── continue_conversation (mutation) ────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ContinueConversationRequest {
    pub session_id: String,
    pub user_text: String,
}

pub async fn continue_conversation(
    State(state): State<AppState>,
    Json(req): Json<ContinueConversationRequest>,
) -> Response {
    match state
        .script_pipeline
        .continue_conversation(&req.session_id, &req.user_text)
        .await
    {
        Ok(result) => Json(json!({
            "ok": result.ok,
            "message": result.message,
            "best_id": result.best_id,
            "next_step": result.next_step,
            "order_id": result.order_id,
            "order_number": result.order_number,
            "order_total": result.order_total,
            "order_status": result.order_status,
            "audio_url": result.audio,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// ── create_order (mutation) ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateOrderLine {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub lines: Vec<CreateOrderLine>,
    pub shipping_address: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateOrderRequest>,
) -> Response {
    let lines: Vec<OrderLineRequest> = req
        .lines
        .into_iter()
        .map(|l| OrderLineRequest {
            product_id: l.product_id,
            quantity: l.quantity,
        })
        .collect();
    match state.orderbook.create_order(
        &user.id,
        &lines,
        req.shipping_address,
        req.notes,
        req.session_id,
    ) {
        Ok(order) => Json(json!({ "ok": true, "order": order, "message": "order created" }))
            .into_response(),
        Err(e) => Json(json!({ "ok": false, "order": null, "message": e.to_string(), "error": e.to_string() }))
            .into_response(),
    }
}

// ── cancel_order (mutation) ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub order_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CancelOrderRequest>,
) -> Response {
    let Some(existing) = state.orderbook.get_by_id(&req.order_id) else {
        return error_response(&Error::NotFound(format!("order '{}'", req.order_id)));
    };
    if !user.role.is_admin() && existing.user_id != user.id {
        return error_response(&Error::AuthorizationDenied);
    }
    match state.orderbook.cancel(&req.order_id, req.reason) {
        Ok(order) => Json(json!({ "ok": true, "order": order, "message": "order cancelled" }))
            .into_response(),
        Err(e) => Json(json!({ "ok": false, "order": null, "message": e.to_string(), "error": e.to_string() }))
            .into_response(),
    }
}

// ── health ───────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.count(),
    }))
}
