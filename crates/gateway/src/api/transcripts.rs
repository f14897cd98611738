//! REST transcript CRUD mirroring the TranscriptStore contract (§4.2, §6).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::Deserialize;
use serde_json::json;

use super::auth::AuthUser;
use super::handlers::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BySessionQuery {
    pub session_id: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn by_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<BySessionQuery>,
) -> Json<Vec<sa_domain::model::TranscriptRecord>> {
    let requesting = if user.role.is_admin() { None } else { Some(user.id.as_str()) };
    Json(state.transcripts.get_by_session(&q.session_id, q.limit, q.offset, requesting))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

pub async fn by_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<PageQuery>,
) -> Json<Vec<sa_domain::model::TranscriptRecord>> {
    Json(state.transcripts.get_by_user(&user.id, q.limit, q.offset))
}

pub async fn by_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Json<Vec<sa_domain::model::TranscriptRecord>> {
    Json(state.transcripts.get_by_order(&order_id))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTranscriptRequest {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTranscriptRequest>,
) -> Response {
    match state.transcripts.update(&id, req.body, req.metadata) {
        Ok(record) => Json(record).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.transcripts.delete(&id) {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn archive(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.transcripts.archive(&id) {
        Ok(record) => Json(record).into_response(),
        Err(e) => error_response(&e),
    }
}
