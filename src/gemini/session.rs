use uuid::Uuid;

use super::core::{Content, GeminiClient, ResponseStream, Role};
use super::error::GeminiError;

/// A conversation with a model. The REST API is stateless so the
/// session holds the turns exchanged so far and replays them with
/// every new message.
pub struct ChatSession {
    id: Uuid,
    client: GeminiClient,
    model: String,
    system_instruction: Option<String>,
    history: Vec<Content>,
}

impl ChatSession {
    pub fn new(client: GeminiClient, model: &str, system_instruction: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            model: model.to_string(),
            system_instruction,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Continue the conversation under a different model. The history
    /// is kept as is.
    pub fn set_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Send `prompt` along with the conversation so far. The session
    /// is not modified; call `record_exchange` once the reply has been
    /// received in full so a failed attempt never leaves a dangling
    /// user turn behind.
    pub async fn stream_message(&self, prompt: &str) -> Result<ResponseStream, GeminiError> {
        let mut contents = self.history.clone();
        contents.push(Content::new(Role::User, prompt));
        self.client
            .stream_generate_content(&self.model, &contents, self.system_instruction.as_deref())
            .await
    }

    pub fn record_exchange(&mut self, prompt: &str, reply: &str) {
        self.history.push(Content::new(Role::User, prompt));
        self.history.push(Content::new(Role::Model, reply));
    }
}
