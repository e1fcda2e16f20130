//! Public types for the chat API
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::ai::chat::{ChatMessage, SessionState};
use crate::ai::render::Renderer;

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub selected_model_id: String,
    pub messages: Vec<ChatMessage>,
    pub has_remote_context: bool,
}

impl From<&SessionState> for SessionResponse {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.id(),
            selected_model_id: state.selected_model_id().to_string(),
            messages: state.messages().to_vec(),
            has_remote_context: state.has_remote_context(),
        }
    }
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Deserialize)]
pub struct SelectModelRequest {
    pub model_id: String,
}

/// Sent to the client as the `data` of each server-sent event while a
/// reply is generated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderEvent {
    Partial { text: String },
    Notice { message: String },
    Complete { text: String },
}

/// Forwards render calls to an SSE response.
pub struct SseRenderer {
    tx: UnboundedSender<RenderEvent>,
}

impl SseRenderer {
    pub fn new(tx: UnboundedSender<RenderEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: RenderEvent) {
        // The client may have gone away. The turn still completes and
        // is kept in the session history.
        if self.tx.send(event).is_err() {
            tracing::debug!("Client disconnected before the reply finished");
        }
    }
}

impl Renderer for SseRenderer {
    fn partial(&mut self, text: &str) {
        self.send(RenderEvent::Partial {
            text: text.to_string(),
        });
    }

    fn complete(&mut self, text: &str) {
        self.send(RenderEvent::Complete {
            text: text.to_string(),
        });
    }

    fn notice(&mut self, message: &str) {
        self.send(RenderEvent::Notice {
            message: message.to_string(),
        });
    }
}
