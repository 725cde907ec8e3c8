//! REST surface for operators — approval actions, rule CRUD, email intake.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::approval::TaskManager;
use crate::classify::InboundEmail;
use crate::error::{ApprovalError, Error, GenerationError};
use crate::llm::GenerationBackend;
use crate::pipeline::ReplyPipeline;
use crate::rules::{RuleDraft, RuleStore};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ReplyPipeline>,
    pub manager: Arc<TaskManager>,
    pub rules: Arc<RuleStore>,
    pub backend: Arc<dyn GenerationBackend>,
}

/// Build the Axum router for the engine's REST surface.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/emails", post(ingest_email))
        .route("/approval_tasks", get(list_tasks))
        .route("/approval_tasks/{id}", get(get_task).put(edit_task))
        .route("/approval_tasks/{id}/approve", post(approve_task))
        .route("/approval_tasks/{id}/reject", put(reject_task))
        .route("/approval_tasks/{id}/regenerate", post(regenerate_task))
        .route("/rules", get(list_rules).post(create_rule))
        .route(
            "/rules/{id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/translate", post(translate))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "replyflow"
    }))
}

// ── Email intake ────────────────────────────────────────────────────

async fn ingest_email(
    State(state): State<AppState>,
    Json(email): Json<InboundEmail>,
) -> Response {
    match state.pipeline.process(email).await {
        Ok(outcome) => (StatusCode::OK, Json(serde_json::json!(outcome))).into_response(),
        Err(e) => engine_error_response(&state, e).await,
    }
}

// ── Approval tasks ──────────────────────────────────────────────────

async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.list().await)
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(task_id) = parse_task_id(&id) else {
        return invalid_id_response();
    };
    match state.manager.get(task_id).await {
        Some(task) => (StatusCode::OK, Json(serde_json::json!(task))).into_response(),
        None => not_found_response(),
    }
}

#[derive(Deserialize)]
struct ApproveQuery {
    approved_by: String,
}

async fn approve_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ApproveQuery>,
) -> Response {
    let Some(task_id) = parse_task_id(&id) else {
        return invalid_id_response();
    };

    match state.manager.approve(task_id, &query.approved_by).await {
        Ok(outcome) => {
            info!(task_id = %task_id, approved_by = %query.approved_by, "Task approved via API");
            (StatusCode::OK, Json(serde_json::json!(outcome))).into_response()
        }
        Err(e) => approval_error_response(&state, e).await,
    }
}

#[derive(Deserialize)]
struct RejectQuery {
    rejected_by: String,
    #[serde(default)]
    reason: Option<String>,
}

async fn reject_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RejectQuery>,
) -> Response {
    let Some(task_id) = parse_task_id(&id) else {
        return invalid_id_response();
    };

    match state
        .manager
        .reject(task_id, &query.rejected_by, query.reason)
        .await
    {
        Ok(outcome) => {
            info!(task_id = %task_id, rejected_by = %query.rejected_by, "Task rejected via API");
            (StatusCode::OK, Json(serde_json::json!(outcome))).into_response()
        }
        Err(e) => approval_error_response(&state, e).await,
    }
}

#[derive(Deserialize)]
struct EditRequest {
    draft_subject: String,
    draft_body: String,
}

async fn edit_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EditRequest>,
) -> Response {
    let Some(task_id) = parse_task_id(&id) else {
        return invalid_id_response();
    };

    match state
        .manager
        .edit(task_id, body.draft_subject, body.draft_body)
        .await
    {
        Ok(task) => (StatusCode::OK, Json(serde_json::json!(task))).into_response(),
        Err(e) => approval_error_response(&state, e).await,
    }
}

#[derive(Deserialize, Default)]
struct RegenerateRequest {
    #[serde(default)]
    instruction: Option<String>,
}

async fn regenerate_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RegenerateRequest>>,
) -> Response {
    let Some(task_id) = parse_task_id(&id) else {
        return invalid_id_response();
    };
    let instruction = body.and_then(|Json(b)| b.instruction);

    match state.manager.regenerate(task_id, instruction).await {
        Ok(task) => (StatusCode::OK, Json(serde_json::json!(task))).into_response(),
        Err(e) => engine_error_response(&state, e).await,
    }
}

// ── Rules ───────────────────────────────────────────────────────────

async fn list_rules(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.rules.list().await)
}

async fn create_rule(
    State(state): State<AppState>,
    Json(draft): Json<RuleDraft>,
) -> impl IntoResponse {
    let rule = state.rules.create(draft).await;
    (StatusCode::CREATED, Json(serde_json::json!(rule)))
}

async fn get_rule(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.rules.get(id).await {
        Some(rule) => (StatusCode::OK, Json(serde_json::json!(rule))).into_response(),
        None => not_found_response(),
    }
}

async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(draft): Json<RuleDraft>,
) -> Response {
    match state.rules.update(id, draft).await {
        Ok(rule) => (StatusCode::OK, Json(serde_json::json!(rule))).into_response(),
        Err(_) => not_found_response(),
    }
}

async fn delete_rule(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.rules.delete(id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "deleted"})),
        )
            .into_response(),
        Err(_) => not_found_response(),
    }
}

// ── Translation passthrough ─────────────────────────────────────────

#[derive(Deserialize)]
struct TranslateRequest {
    content: String,
    target_lang: String,
}

async fn translate(
    State(state): State<AppState>,
    Json(body): Json<TranslateRequest>,
) -> Response {
    match state
        .backend
        .translate(&body.content, &body.target_lang)
        .await
    {
        Ok(text) => (
            StatusCode::OK,
            Json(serde_json::json!({"translated": text})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

// ── Error mapping ───────────────────────────────────────────────────

fn parse_task_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

fn invalid_id_response() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": "Invalid task ID"})),
    )
        .into_response()
}

fn not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not found"})),
    )
        .into_response()
}

/// State-transition conflicts return 409 with the current (unchanged) task so
/// the caller can reconcile.
async fn approval_error_response(state: &AppState, err: ApprovalError) -> Response {
    match err {
        ApprovalError::TaskNotFound { .. } => not_found_response(),
        ApprovalError::InvalidStateTransition { id, .. } => {
            let current = state.manager.get(id).await;
            (
                StatusCode::CONFLICT,
                Json(serde_json::json!({
                    "error": err.to_string(),
                    "task": current,
                })),
            )
                .into_response()
        }
        ApprovalError::GenerationInFlight { .. } => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": err.to_string()})),
        )
            .into_response(),
    }
}

async fn engine_error_response(state: &AppState, err: Error) -> Response {
    match err {
        Error::Approval(e) => approval_error_response(state, e).await,
        Error::Generation(e @ GenerationError::UpstreamUnavailable { .. })
        | Error::Generation(e @ GenerationError::InvalidResponse { .. }) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": other.to_string()})),
        )
            .into_response(),
    }
}
