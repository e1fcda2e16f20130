use futures_util::StreamExt;
use thiserror::Error;

use super::models::{ModelSwitch, Role, SessionState, UiEvent};
use crate::ai::catalog::{CatalogError, ModelCatalog, ModelPreference, default_preferences};
use crate::ai::render::{CURSOR, Renderer};
use crate::ai::retry::{RetryPolicy, Retryable};
use crate::core::AppConfig;
use crate::gemini::{ChatSession, GeminiClient, GeminiError};

/// Stored as the assistant's turn whenever a reply could not be
/// generated. The actual error is only shown transiently.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't process your request. Please try again.";

pub const RATE_LIMIT_NOTICE: &str =
    "⚠️ Rate limit exceeded. Please try again later or switch to a different model.";

/// The message shown to the user when a turn fails.
pub fn failure_notice(err: &GeminiError) -> String {
    if err.is_rate_limited() {
        RATE_LIMIT_NOTICE.to_string()
    } else {
        format!("⚠️ Error: {}", err)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    #[error("Model {0} is not available. Use one of the models in the catalog.")]
    UnknownModel(String),

    #[error("Message is empty")]
    EmptyPrompt,
}

/// The result of one chat turn. A failed turn still produces a reply
/// (the fallback) so the conversation can carry on.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    /// The notice shown when the turn failed
    pub failure: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventOutcome {
    Replied(TurnOutcome),
    ModelSelected { model_id: String, context_reset: bool },
    HistoryCleared,
}

/// Drives a chat session: resolves the model, forwards prompts to the
/// remote conversation with retries, renders the streamed reply and
/// keeps the visible history.
///
/// One orchestrator is shared by every session. All per-user data
/// lives in the `SessionState` passed to `handle`.
///
/// Use `ChatBuilder` to construct a `ChatOrchestrator`.
pub struct ChatOrchestrator {
    client: GeminiClient,
    catalog: ModelCatalog,
    retry: RetryPolicy,
    model_switch: ModelSwitch,
    system_instruction: Option<String>,
}

impl ChatOrchestrator {
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn model_switch(&self) -> ModelSwitch {
        self.model_switch
    }

    /// A fresh session using the default model.
    pub fn new_session(&self) -> SessionState {
        SessionState::new(&self.catalog.default_entry().model_id)
    }

    /// A fresh session using `model_id`, which must be in the catalog.
    pub fn new_session_with_model(&self, model_id: &str) -> Result<SessionState, EventError> {
        let entry = self
            .catalog
            .get(model_id)
            .ok_or_else(|| EventError::UnknownModel(model_id.to_string()))?;
        Ok(SessionState::new(&entry.model_id))
    }

    /// Apply a single user event to `state`.
    pub async fn handle(
        &self,
        state: &mut SessionState,
        event: UiEvent,
        renderer: &mut dyn Renderer,
    ) -> Result<EventOutcome, EventError> {
        state.touch();
        match event {
            UiEvent::Submit(prompt) => {
                let outcome = self.submit(state, &prompt, renderer).await?;
                Ok(EventOutcome::Replied(outcome))
            }
            UiEvent::SelectModel(model_id) => self.select_model(state, &model_id),
            UiEvent::ClearHistory => {
                state.clear();
                tracing::debug!("Cleared history for session {}", state.id());
                Ok(EventOutcome::HistoryCleared)
            }
        }
    }

    async fn submit(
        &self,
        state: &mut SessionState,
        prompt: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<TurnOutcome, EventError> {
        if prompt.trim().is_empty() {
            return Err(EventError::EmptyPrompt);
        }
        state.append(Role::User, prompt);

        let model_id = state.selected_model_id().to_string();
        let session_id = state.id();
        let chat_session = state.chat_session.get_or_insert_with(|| {
            tracing::debug!("Starting chat with {} for session {}", model_id, session_id);
            self.client
                .start_chat(&model_id, self.system_instruction.clone())
        });

        let outcome = match self.stream_reply(chat_session, prompt, renderer).await {
            Ok(reply) => {
                renderer.complete(&reply);
                chat_session.record_exchange(prompt, &reply);
                TurnOutcome {
                    reply,
                    failure: None,
                }
            }
            Err(err) => {
                tracing::error!("Chat turn failed for session {}: {}", session_id, err);
                let notice = failure_notice(&err);
                renderer.notice(&notice);
                renderer.complete(FALLBACK_REPLY);
                TurnOutcome {
                    reply: FALLBACK_REPLY.to_string(),
                    failure: Some(notice),
                }
            }
        };

        state.append(Role::Assistant, &outcome.reply);
        Ok(outcome)
    }

    /// Send the prompt with retries and render each chunk as it
    /// arrives. Returns the complete reply.
    async fn stream_reply(
        &self,
        chat_session: &ChatSession,
        prompt: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<String, GeminiError> {
        let mut stream = self
            .retry
            .run(|| chat_session.stream_message(prompt))
            .await?;

        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            buffer.push_str(&chunk?);
            renderer.partial(&format!("{}{}", buffer, CURSOR));
        }
        Ok(buffer)
    }

    fn select_model(
        &self,
        state: &mut SessionState,
        model_id: &str,
    ) -> Result<EventOutcome, EventError> {
        let entry = self
            .catalog
            .get(model_id)
            .ok_or_else(|| EventError::UnknownModel(model_id.to_string()))?;
        let model_id = entry.model_id.clone();

        if state.selected_model_id() == model_id {
            return Ok(EventOutcome::ModelSelected {
                model_id,
                context_reset: false,
            });
        }
        state.set_selected_model_id(&model_id);

        let mut context_reset = false;
        match self.model_switch {
            ModelSwitch::Keep => {
                if let Some(chat_session) = state.chat_session.as_mut() {
                    chat_session.set_model(&model_id);
                }
            }
            ModelSwitch::Reset => {
                context_reset = state.chat_session.take().is_some();
            }
        }
        tracing::debug!(
            "Session {} switched to {} (context reset: {})",
            state.id(),
            model_id,
            context_reset
        );

        Ok(EventOutcome::ModelSelected {
            model_id,
            context_reset,
        })
    }
}

pub struct ChatBuilder {
    api_hostname: String,
    api_key: String,
    preferences: Vec<ModelPreference>,
    retry: RetryPolicy,
    model_switch: ModelSwitch,
    system_instruction: Option<String>,
}

impl ChatBuilder {
    pub fn new(api_hostname: &str, api_key: &str) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            preferences: default_preferences(),
            retry: RetryPolicy::default(),
            model_switch: ModelSwitch::default(),
            system_instruction: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.api_hostname, &config.api_key)
            .preferences(config.preferences.clone())
            .model_switch(config.model_switch)
            .system_instruction(config.system_instruction.clone())
    }

    pub fn preferences(mut self, preferences: Vec<ModelPreference>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model_switch(mut self, model_switch: ModelSwitch) -> Self {
        self.model_switch = model_switch;
        self
    }

    pub fn system_instruction(mut self, system_instruction: Option<String>) -> Self {
        self.system_instruction = system_instruction;
        self
    }

    /// Fetch the model catalog and build the orchestrator. Fails if no
    /// usable model is available.
    pub async fn bootstrap(self) -> Result<ChatOrchestrator, CatalogError> {
        let client = GeminiClient::new(&self.api_hostname, &self.api_key);
        let catalog = ModelCatalog::fetch(&client, &self.preferences).await?;
        Ok(self.finish(client, catalog))
    }

    /// Build with an already resolved catalog.
    pub fn build(self, catalog: ModelCatalog) -> ChatOrchestrator {
        let client = GeminiClient::new(&self.api_hostname, &self.api_key);
        self.finish(client, catalog)
    }

    fn finish(self, client: GeminiClient, catalog: ModelCatalog) -> ChatOrchestrator {
        ChatOrchestrator {
            client,
            catalog,
            retry: self.retry,
            model_switch: self.model_switch,
            system_instruction: self.system_instruction,
        }
    }
}
