//! REST API Server for the financial chat assistant
//!
//! Exposes chat turns (JSON or server-sent events), history reset,
//! transcript export and the spending summary to a chat UI.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use futures::{channel::mpsc, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::ops::ControlFlow;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::assistant::{Assistant, PromptAssembly, SpendingFilter};
use crate::error::AssistantError;
use crate::state::SessionStore;
use crate::transactions::format_amount;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub chat_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub chat_id: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn error_response(err: &AssistantError) -> Response {
    let status = match err {
        AssistantError::SessionBusy(_) => StatusCode::CONFLICT,
        AssistantError::Completion(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(err.to_string()))).into_response()
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Assistant,
    pub sessions: Arc<dyn SessionStore>,
}

/// =============================
/// Helpers — Chat IDs
/// =============================

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Chat id from the client, or a fresh one for a new conversation
fn resolve_chat_id(value: Option<&str>) -> Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            Uuid::parse_str(v.trim()).unwrap_or_else(|_| stable_uuid_from_string(v.trim()))
        }
        _ => Uuid::new_v4(),
    }
}

/// Prompt assembly reads files; keep it off the async workers
async fn assemble_blocking(
    assistant: &Assistant,
    filter: SpendingFilter,
) -> Result<PromptAssembly, AssistantError> {
    let assistant = assistant.clone();
    tokio::task::spawn_blocking(move || assistant.assemble(filter))
        .await
        .map_err(|e| AssistantError::Config(format!("prompt assembly aborted: {}", e)))
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> Response {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Message must not be empty".into())),
        )
            .into_response();
    }

    let chat_id = resolve_chat_id(req.chat_id.as_deref());
    let filter = SpendingFilter {
        start_date: req.start_date,
        end_date: req.end_date,
    };

    let assembly = match assemble_blocking(&state.assistant, filter).await {
        Ok(assembly) => assembly,
        Err(e) => return error_response(&e),
    };

    let history = match state.sessions.checkout(chat_id).await {
        Ok(history) => history,
        Err(e) => return error_response(&e),
    };
    let history = state.assistant.sync_history(history, &assembly);

    info!(%chat_id, stream = req.stream, turns = history.len(), "Chat turn received");

    if req.stream {
        return stream_turn(state, chat_id, history, message);
    }

    // Detached: the history is checked back in even if the client disconnects.
    let assistant = state.assistant.clone();
    let sessions = state.sessions.clone();
    let handle = tokio::spawn(async move {
        let turn = assistant.respond(history, &message).await;
        sessions.checkin(chat_id, turn.history).await;
        turn.reply
    });

    let reply = handle.await.unwrap_or_else(|e| {
        Err(AssistantError::Completion(format!("chat turn aborted: {}", e)))
    });

    match reply {
        Ok(answer) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "chat_id": chat_id.to_string(),
                "answer": answer,
                "warnings": assembly.warnings,
            }))),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

fn stream_turn(
    state: ApiState,
    chat_id: Uuid,
    history: crate::memory::ConversationHistory,
    message: String,
) -> Response {
    let (tx, rx) = mpsc::unbounded::<Event>();

    tokio::spawn(async move {
        let turn = state
            .assistant
            .respond_streaming(history, &message, |chunk| {
                let event = Event::default().data(serde_json::json!({ "delta": chunk }).to_string());
                match tx.unbounded_send(event) {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(_) => ControlFlow::Break(()),
                }
            })
            .await;

        state.sessions.checkin(chat_id, turn.history).await;

        let last = match turn.reply {
            Ok(_) => serde_json::json!({
                "done": true,
                "interrupted": turn.interrupted,
                "chat_id": chat_id.to_string(),
            }),
            Err(e) => {
                warn!(%chat_id, "Streaming turn failed: {}", e);
                serde_json::json!({ "error": e.to_string(), "chat_id": chat_id.to_string() })
            }
        };
        let _ = tx.unbounded_send(Event::default().data(last.to_string()));
    });

    Sse::new(rx.map(Ok::<Event, Infallible>)).into_response()
}

/// =============================
/// History Endpoints
/// =============================

async fn reset_handler(State(state): State<ApiState>, Json(req): Json<ResetRequest>) -> Response {
    let chat_id = resolve_chat_id(Some(&req.chat_id));
    let filter = SpendingFilter {
        start_date: req.start_date,
        end_date: req.end_date,
    };

    let assembly = match assemble_blocking(&state.assistant, filter).await {
        Ok(assembly) => assembly,
        Err(e) => return error_response(&e),
    };

    let history = match state.sessions.checkout(chat_id).await {
        Ok(history) => history,
        Err(e) => return error_response(&e),
    };
    let history = state.assistant.reset_history(history, &assembly);
    let len = history.len();
    state.sessions.checkin(chat_id, history).await;

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "chat_id": chat_id.to_string(),
            "messages": len,
        }))),
    )
        .into_response()
}

async fn transcript_handler(
    State(state): State<ApiState>,
    Path(chat_id): Path<String>,
) -> Response {
    let chat_id = resolve_chat_id(Some(&chat_id));

    match state.sessions.snapshot(chat_id).await {
        Some(history) => (
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"historico_conversa.txt\"",
                ),
            ],
            history.export_transcript(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("No idle conversation {}", chat_id))),
        )
            .into_response(),
    }
}

/// =============================
/// Spending Endpoint
/// =============================

async fn spending_handler(
    State(state): State<ApiState>,
    Query(filter): Query<SpendingFilter>,
) -> Response {
    let assembly = match assemble_blocking(&state.assistant, filter).await {
        Ok(assembly) => assembly,
        Err(e) => return error_response(&e),
    };

    let data = match &assembly.spending {
        Some(summary) => serde_json::json!({
            "categories": summary
                .iter()
                .map(|(category, amount)| serde_json::json!({
                    "category": category,
                    "amount": amount,
                    "formatted": format!("R${}", format_amount(amount)),
                }))
                .collect::<Vec<_>>(),
            "total": summary.total(),
            "text": summary.format(),
            "bounds": assembly.bounds,
            "range": assembly.range,
            "warnings": assembly.warnings,
        }),
        None => serde_json::json!({
            "categories": [],
            "total": 0.0,
            "text": "",
            "bounds": null,
            "range": null,
            "warnings": assembly.warnings,
        }),
    };

    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// =============================
/// Router
/// =============================

pub fn create_router(assistant: Assistant, sessions: Arc<dyn SessionStore>) -> Router {
    let state = ApiState {
        assistant,
        sessions,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/reset", post(reset_handler))
        .route("/api/chat/:chat_id/transcript", get(transcript_handler))
        .route("/api/spending", get(spending_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    assistant: Assistant,
    sessions: Arc<dyn SessionStore>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(assistant, sessions);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
