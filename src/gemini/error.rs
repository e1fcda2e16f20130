use http::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::ai::retry::{Retryable, is_rate_limit_signature};

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gemini API returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Invalid response payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Response stream was not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Prompt was blocked: {0}")]
    Blocked(String),
}

// {"error": {"code": 429, "message": "...", "status": "RESOURCE_EXHAUSTED"}}
#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl GeminiError {
    /// Build an API error from a non-success response body, preferring
    /// the message inside Google's error envelope when present.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| body.trim().to_string());
        GeminiError::Api { status, message }
    }
}

impl Retryable for GeminiError {
    fn is_rate_limited(&self) -> bool {
        if let GeminiError::Api { status, .. } = self {
            if *status == StatusCode::TOO_MANY_REQUESTS {
                return true;
            }
        }
        is_rate_limit_signature(&self.to_string())
    }

    fn is_retryable(&self) -> bool {
        if self.is_rate_limited() {
            return true;
        }
        match self {
            GeminiError::Api { status, .. } => !matches!(
                *status,
                StatusCode::BAD_REQUEST
                    | StatusCode::UNAUTHORIZED
                    | StatusCode::FORBIDDEN
                    | StatusCode::NOT_FOUND
            ),
            GeminiError::Blocked(_) => false,
            _ => true,
        }
    }
}
