//! Router for the chat session API

use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response, sse::Event, sse::KeepAlive, sse::Sse},
    routing::{get, post, put},
};
use tokio::sync::{OwnedMutexGuard, mpsc};
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use super::public::{self, RenderEvent, SessionResponse, SseRenderer};
use crate::ai::chat::{ChatOrchestrator, SessionState, UiEvent};
use crate::ai::render::{NullRenderer, Renderer};
use crate::api::public::ApiError;
use crate::api::state::{AppState, SharedSession};

type SharedState = Arc<RwLock<AppState>>;

fn orchestrator(state: &SharedState) -> Result<Arc<ChatOrchestrator>, Response> {
    let shared_state = state
        .read()
        .map_err(|_| ApiError::from(anyhow!("Unable to read shared state")).into_response())?;
    Ok(Arc::clone(&shared_state.orchestrator))
}

fn find_session(state: &SharedState, id: Uuid) -> Result<SharedSession, Response> {
    let shared_state = state
        .read()
        .map_err(|_| ApiError::from(anyhow!("Unable to read shared state")).into_response())?;
    shared_state
        .sessions
        .get(&id)
        .cloned()
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Session {} not found", id)).into_response())
}

/// Take the session's lock for the duration of an event. Responds
/// with 404 for an unknown session and 409 if another event for the
/// same session is still being handled.
fn lock_session(state: &SharedState, id: Uuid) -> Result<OwnedMutexGuard<SessionState>, Response> {
    find_session(state, id)?.try_lock_owned().map_err(|_| {
        (
            StatusCode::CONFLICT,
            format!("Session {} is busy with another request", id),
        )
            .into_response()
    })
}

/// Start a new chat session with the default model
async fn create_session(State(state): State<SharedState>) -> Result<impl IntoResponse, Response> {
    let mut shared_state = state
        .write()
        .map_err(|_| ApiError::from(anyhow!("Unable to write shared state")).into_response())?;
    let session = shared_state.orchestrator.new_session();
    let response = SessionResponse::from(&session);
    shared_state.insert_session(session);
    tracing::debug!("Created session {}", response.session_id);

    Ok((StatusCode::CREATED, Json(response)))
}

/// Get a session's history and selected model. Waits for a reply
/// that is still streaming to finish.
async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, Response> {
    let session = find_session(&state, id)?.lock_owned().await;
    Ok(Json(SessionResponse::from(&*session)))
}

async fn delete_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, Response> {
    let mut shared_state = state
        .write()
        .map_err(|_| ApiError::from(anyhow!("Unable to write shared state")).into_response())?;
    match shared_state.sessions.remove(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err((StatusCode::NOT_FOUND, format!("Session {} not found", id)).into_response()),
    }
}

async fn select_model(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<public::SelectModelRequest>,
) -> Result<Json<SessionResponse>, Response> {
    let orchestrator = orchestrator(&state)?;
    let mut session = lock_session(&state, id)?;
    orchestrator
        .handle(&mut session, UiEvent::SelectModel(payload.model_id), &mut NullRenderer)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?;

    Ok(Json(SessionResponse::from(&*session)))
}

async fn clear_history(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, Response> {
    let orchestrator = orchestrator(&state)?;
    let mut session = lock_session(&state, id)?;
    orchestrator
        .handle(&mut session, UiEvent::ClearHistory, &mut NullRenderer)
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?;

    Ok(Json(SessionResponse::from(&*session)))
}

/// Send a message and stream the reply as it's generated
async fn send_message(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<public::ChatRequest>,
) -> Result<impl IntoResponse, Response> {
    if payload.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message is empty").into_response());
    }
    let orchestrator = orchestrator(&state)?;
    let mut session = lock_session(&state, id)?;

    let (tx, rx) = mpsc::unbounded_channel::<RenderEvent>();
    tokio::spawn(async move {
        let mut renderer = SseRenderer::new(tx);
        let result = orchestrator
            .handle(&mut session, UiEvent::Submit(payload.message), &mut renderer)
            .await;
        // Release the session before the stream closes so the client
        // can use it as soon as the reply is complete
        drop(session);
        if let Err(e) = result {
            tracing::error!("Chat handler error for session {}: {}", id, e);
            renderer.notice(&e.to_string());
        }
    });

    let sse_stream =
        UnboundedReceiverStream::new(rx).map(|event| Event::default().json_data(event));

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

/// Create the chat session router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(create_session))
        .route("/{id}", get(get_session).delete(delete_session))
        .route("/{id}/model", put(select_model))
        .route("/{id}/clear", post(clear_history))
        .route("/{id}/messages", post(send_message))
}
