use std::time::Duration;

use async_stream::stream;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::GeminiError;
use super::session::ChatSession;

/// Chunks of generated text in the order the API streamed them.
pub type ResponseStream = BoxStream<'static, Result<String, GeminiError>>;

const API_VERSION: &str = "v1beta";
const MODELS_PAGE_SIZE: u32 = 1000;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "model")]
    Model,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

/// One turn of the conversation as the API expects it.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, text: &str) -> Self {
        Content {
            role,
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

// Object {
//     "name": String("models/gemini-1.5-flash-latest"),
//     "displayName": String("Gemini 1.5 Flash Latest"),
//     "supportedGenerationMethods": Array [
//         String("generateContent"),
//         String("countTokens"),
//     ],
//     ...
// }
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteModel {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl RemoteModel {
    /// Whether the model can be used with `streamGenerateContent`.
    /// The API only advertises `generateContent` for most models even
    /// though streaming is supported by all of them.
    pub fn supports_generation(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == "generateContent" || m == "streamGenerateContent")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelListPage {
    #[serde(default)]
    models: Vec<RemoteModel>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

/// Extract the generated text from one streamed `data:` payload.
/// Returns `None` for chunks that carry no text (e.g. a final chunk
/// with only usage metadata).
fn chunk_text(data: &str) -> Result<Option<String>, GeminiError> {
    let chunk = serde_json::from_str::<GenerateContentChunk>(data)
        .inspect_err(|e| tracing::error!("Parsing stream chunk failed for {}\nError: {}", data, e))?;

    let text: String = chunk
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(GeminiError::Blocked(reason));
        }
        return Ok(None);
    }
    Ok(Some(text))
}

/// Incremental Server-Sent Events decoder. Bytes can arrive split at
/// arbitrary points, including inside a multi-byte character, so
/// undecoded bytes and incomplete events are carried over between
/// calls to `push`.
#[derive(Default)]
struct SseDecoder {
    pending: Vec<u8>,
    buffer: String,
}

impl SseDecoder {
    /// Feed the next network chunk and return the data of every event
    /// it completed.
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, GeminiError> {
        self.pending.extend_from_slice(chunk);
        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            // Incomplete character at the end, wait for more bytes
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(e.into()),
        };
        let decoded = std::str::from_utf8(&self.pending[..valid_up_to])?;
        self.buffer.push_str(&decoded.replace('\r', ""));
        self.pending.drain(..valid_up_to);

        let mut events = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let event: String = self.buffer.drain(..end + 2).collect();
            if let Some(data) = event_data(&event) {
                events.push(data);
            }
        }
        Ok(events)
    }

    /// Flush an event left without a trailing blank line when the
    /// connection closes.
    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        event_data(&rest)
    }
}

fn event_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    let data = lines.join("\n");
    if data.trim().is_empty() || data.trim() == "[DONE]" {
        return None;
    }
    Some(data)
}

async fn check_status(response: Response) -> Result<Response, GeminiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!("Gemini API error {}: {}", status, body);
    Err(GeminiError::from_response(status, &body))
}

/// Model ids in the catalog are resource names like
/// `models/gemini-1.5-flash` but a bare name is accepted too.
pub fn model_resource(model: &str) -> String {
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

/// Thin client for the model catalog and content generation
/// endpoints. Cheap to clone, the underlying connection pool is
/// shared.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_hostname: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_hostname: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_hostname: api_hostname.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn api_hostname(&self) -> &str {
        &self.api_hostname
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_hostname, API_VERSION, path)
    }

    /// List every model available to the API key, following
    /// pagination until the last page.
    pub async fn list_models(&self) -> Result<Vec<RemoteModel>, GeminiError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", MODELS_PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }
            let response = self
                .http
                .get(self.url("models"))
                .header("x-goog-api-key", &self.api_key)
                .query(&query)
                .timeout(Duration::from_secs(30))
                .send()
                .await?;
            let page: ModelListPage = check_status(response).await?.json().await?;
            models.extend(page.models);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!("Listed {} models", models.len());
        Ok(models)
    }

    /// Start generating a response for `contents` and return the text
    /// chunks as they arrive. Fails before any chunk is produced if
    /// the request is rejected; failures after that point surface as
    /// an `Err` item in the stream.
    pub async fn stream_generate_content(
        &self,
        model: &str,
        contents: &[Content],
        system_instruction: Option<&str>,
    ) -> Result<ResponseStream, GeminiError> {
        let mut payload = json!({
            "contents": contents,
        });
        if let Some(instruction) = system_instruction {
            payload["systemInstruction"] = json!({"parts": [{"text": instruction}]});
        }
        let url = self.url(&format!("{}:streamGenerateContent", model_resource(model)));
        tracing::debug!("Streaming content from {} with {} turns", model, contents.len());

        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .query(&[("alt", "sse")])
            .timeout(Duration::from_secs(60 * 5))
            .json(&payload)
            .send()
            .await?;
        let response = check_status(response).await?;

        let mut bytes = response.bytes_stream();
        let chunks = stream! {
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = bytes.next().await {
                let events = match chunk.map_err(GeminiError::from).and_then(|c| decoder.push(&c)) {
                    Ok(events) => events,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                for data in events {
                    match chunk_text(&data) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
            if let Some(data) = decoder.finish() {
                match chunk_text(&data) {
                    Ok(Some(text)) => yield Ok(text),
                    Ok(None) => {}
                    Err(e) => yield Err(e),
                }
            }
        };

        Ok(chunks.boxed())
    }

    /// Open a new conversation with `model`. Nothing is sent until
    /// the first message.
    pub fn start_chat(&self, model: &str, system_instruction: Option<String>) -> ChatSession {
        ChatSession::new(self.clone(), model, system_instruction)
    }
}
