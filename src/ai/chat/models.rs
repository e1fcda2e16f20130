//! The core models for keeping track of a chat with an LLM.
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gemini::ChatSession;

pub const QUOTA_NOTE: &str = "Free tier has limited requests per minute";
pub const QUOTA_POLICY_URL: &str = "https://ai.google.dev/gemini-api/docs/rate-limits";
pub const TIPS: &[&str] = &[
    "Start with the lighter models at the top of the list for better availability",
    "Longer responses may hit rate limits faster",
    "Clear history if you switch models",
];

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// What happens to the remote conversation when the selected model
/// changes mid-conversation.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ModelSwitch {
    /// Continue the same conversation under the new model
    #[default]
    Keep,
    /// Drop the conversation so the next message starts a fresh one.
    /// The visible history is left alone.
    Reset,
}

/// Messages shown to the user in chronological order.
#[derive(Default, Debug, Clone)]
pub struct Transcript(Vec<ChatMessage>);

impl Transcript {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.0
    }

    pub fn push(&mut self, msg: ChatMessage) {
        self.0.push(msg)
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.0.iter()
    }
}

/// Everything that survives between events for one user's session.
pub struct SessionState {
    id: Uuid,
    transcript: Transcript,
    selected_model_id: String,
    // Created on the first message and dropped when history is cleared
    pub(crate) chat_session: Option<ChatSession>,
    last_active: Instant,
}

impl SessionState {
    pub fn new(selected_model_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            transcript: Transcript::new(),
            selected_model_id: selected_model_id.to_string(),
            chat_session: None,
            last_active: Instant::now(),
        }
    }

    /// When the session last handled an event
    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    pub fn selected_model_id(&self) -> &str {
        &self.selected_model_id
    }

    pub(crate) fn set_selected_model_id(&mut self, model_id: &str) {
        self.selected_model_id = model_id.to_string();
    }

    pub fn chat_session(&self) -> Option<&ChatSession> {
        self.chat_session.as_ref()
    }

    pub fn has_remote_context(&self) -> bool {
        self.chat_session.is_some()
    }

    pub fn append(&mut self, role: Role, content: &str) {
        self.transcript.push(ChatMessage::new(role, content));
    }

    /// Empty the history and forget the remote conversation. Safe to
    /// call on an already empty session.
    pub fn clear(&mut self) {
        self.transcript.clear();
        self.chat_session = None;
    }
}

/// Something the user did.
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    Submit(String),
    SelectModel(String),
    ClearHistory,
}
